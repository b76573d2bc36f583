//! 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "mlfq-kernel";

/// 内核版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = 8;

// ============================================================
// 进程配置
// ============================================================

/// 进程表槽位数
pub const NPROC: usize = 64;

/// 每个进程的打开文件数
pub const NOFILE: usize = 16;

// ============================================================
// 内存配置
// ============================================================

/// 页大小
pub const PAGE_SIZE: usize = 4096;

// ============================================================
// 调度器配置
// ============================================================

/// 各级队列时间片 (tick)
pub const TIME_SLICES: [u64; 4] = [10, 20, 40, 80];

/// 老化阈值 (tick)
pub const AGING_THRESHOLD: u64 = 250;

/// 分派策略
pub const SCHED_DISPATCH: &str = "priority";
