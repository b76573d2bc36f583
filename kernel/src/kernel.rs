//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内核实例
//!
//! 进程表、CPU 表、时钟和协作者接口都挂在一个显式的 [`Kernel`] 上，
//! 不使用全局静态变量。真实平台在启动时构造一份并让每个 CPU 进入
//! [`Kernel::scheduler`]；单元测试则每个用例构造自己的实例。
//!
//! 锁顺序：`tickslock` -> `ptable`。

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::info;
use spin::Once;

use crate::arch::Arch;
use crate::config::{
    AGING_THRESHOLD, KERNEL_NAME, KERNEL_VERSION, NPROC, SCHED_DISPATCH, TIME_SLICES,
};
use crate::cpu::{CpuId, Cpus};
use crate::fs::FileSystem;
use crate::mm::PageAllocator;
use crate::process::{Pid, ProcInfo, ProcTable};
use crate::sched::mlfq::{MlfqPolicy, NLEVELS};
use crate::sync::{SpinLock, SpinLockGuard};

/// 分派策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// 从上次位置顺序扫描，忽略级别
    Flat,
    /// 级别号最小的优先，同级按进入时间，再按扫描顺序
    Priority,
}

impl DispatchPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "flat" => Some(DispatchPolicy::Flat),
            "priority" => Some(DispatchPolicy::Priority),
            _ => None,
        }
    }
}

/// 运行时配置，默认值来自 Kernel.toml
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// 每个逻辑 CPU 的硬件编号
    pub harts: Vec<u32>,
    pub nproc: usize,
    pub time_slices: [u64; NLEVELS],
    pub aging_threshold: u64,
    pub dispatch: DispatchPolicy,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            harts: alloc::vec![0],
            nproc: NPROC,
            time_slices: TIME_SLICES,
            aging_threshold: AGING_THRESHOLD,
            dispatch: DispatchPolicy::from_name(SCHED_DISPATCH)
                .unwrap_or(DispatchPolicy::Priority),
        }
    }
}

impl KernelConfig {
    /// 硬件编号为 0..n 的 n 个 CPU
    pub fn with_cpus(mut self, n: u32) -> Self {
        self.harts = (0..n).collect();
        self
    }

    pub fn with_nproc(mut self, nproc: usize) -> Self {
        self.nproc = nproc;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchPolicy) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_aging_threshold(mut self, ticks: u64) -> Self {
        self.aging_threshold = ticks;
        self
    }
}

pub struct Kernel {
    pub(crate) cpus: Cpus,
    pub(crate) ptable: SpinLock<ProcTable>,
    /// 全局 tick 计数 (tickslock)
    pub(crate) ticks: SpinLock<u64>,
    pub(crate) policy: MlfqPolicy,
    pub(crate) dispatch: DispatchPolicy,
    pub(crate) pages: Box<dyn PageAllocator>,
    pub(crate) fs: Box<dyn FileSystem>,
    /// init 进程的槽位
    pub(crate) initproc: Once<usize>,
    pub(crate) fs_ready: Once<()>,
}

impl Kernel {
    pub fn new(
        config: KernelConfig,
        arch: Box<dyn Arch>,
        pages: Box<dyn PageAllocator>,
        fs: Box<dyn FileSystem>,
    ) -> Self {
        assert!(config.nproc > 0, "kernel: nproc must be positive");
        info!(
            "{} v{}: {} cpus, {} slots, {:?} dispatch",
            KERNEL_NAME,
            KERNEL_VERSION,
            config.harts.len(),
            config.nproc,
            config.dispatch
        );

        Self {
            cpus: Cpus::new(arch, &config.harts),
            ptable: SpinLock::new("ptable", ProcTable::new(config.nproc)),
            ticks: SpinLock::new("time", 0),
            policy: MlfqPolicy::new(config.time_slices, config.aging_threshold),
            dispatch: config.dispatch,
            pages,
            fs,
            initproc: Once::new(),
            fs_ready: Once::new(),
        }
    }

    pub fn cpus(&self) -> &Cpus {
        &self.cpus
    }

    pub fn policy(&self) -> &MlfqPolicy {
        &self.policy
    }

    pub fn dispatch_policy(&self) -> DispatchPolicy {
        self.dispatch
    }

    /// 锁住进程表
    #[track_caller]
    pub fn lock_table(&self) -> SpinLockGuard<'_, ProcTable> {
        self.ptable.lock(&self.cpus)
    }

    /// 当前 CPU 的逻辑编号
    pub fn cpuid(&self) -> CpuId {
        self.cpus.push_off();
        let id = self.cpus.cpuid();
        self.cpus.pop_off();
        id
    }

    /// 当前进程的槽位
    ///
    /// 读取期间关中断，避免读到一半被迁移到别的 CPU。
    pub fn myproc(&self) -> Option<usize> {
        self.cpus.push_off();
        let slot = self.cpus.mycpu().proc();
        self.cpus.pop_off();
        slot
    }

    /// 当前进程的槽位，没有当前进程时是内核的编程错误
    pub(crate) fn current(&self, what: &str) -> usize {
        self.myproc()
            .unwrap_or_else(|| panic!("{}: no current process", what))
    }

    pub fn getpid(&self) -> Option<Pid> {
        let slot = self.myproc()?;
        Some(self.ptable.lock(&self.cpus).get(slot).pid())
    }

    /// init 进程的 PID
    pub fn init_pid(&self) -> Option<Pid> {
        let slot = *self.initproc.get()?;
        Some(self.ptable.lock(&self.cpus).get(slot).pid())
    }

    /// 开机以来的 tick 数
    pub fn uptime(&self) -> u64 {
        *self.ticks.lock(&self.cpus)
    }

    pub fn snapshot(&self) -> Vec<ProcInfo> {
        self.ptable.lock(&self.cpus).snapshot()
    }

    /// 打印进程列表 (^P)
    pub fn procdump(&self) -> Vec<ProcInfo> {
        let infos = self.snapshot();
        for p in &infos {
            info!(
                "{} {} {} level {} burst {} total {} wait {} io {}",
                p.pid,
                p.state.as_str(),
                p.name,
                p.level,
                p.burst,
                p.total,
                p.cpu_wait,
                p.io_wait
            );
        }
        infos
    }
}
