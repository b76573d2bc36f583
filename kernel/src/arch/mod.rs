//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 架构相关接口
//!
//! 调度核心不直接操作 CSR / EFLAGS，而是通过 [`Arch`] 访问：
//! - 当前 CPU 的硬件编号（hart id / APIC id）
//! - 本 CPU 的中断开关
//!
//! 真实平台在启动代码里提供实现；单元测试使用线程局部变量模拟每个核。

/// 平台提供的最小 CPU 操作集合
///
/// 所有方法只作用于**调用者所在的 CPU**。
pub trait Arch: Send + Sync {
    /// 读取当前 CPU 的硬件编号
    ///
    /// 硬件编号不保证连续，[`crate::cpu::Cpus`] 负责映射到逻辑编号。
    fn hart_id(&self) -> u32;

    /// 本 CPU 的中断当前是否开启
    fn intr_get(&self) -> bool;

    /// 开中断 (sti / csrs sstatus.SIE)
    fn intr_on(&self);

    /// 关中断 (cli / csrc sstatus.SIE)
    fn intr_off(&self);
}
