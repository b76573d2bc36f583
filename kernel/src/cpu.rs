//! 每 CPU 状态
//!
//! 每个 CPU 拥有一份 [`Cpu`]，只会被该 CPU 在关中断的情况下修改：
//! - `ncli` / `intena`: push_off / pop_off 的嵌套深度和最外层之前的中断状态
//! - `proc`: 当前在该 CPU 上运行的进程槽位
//! - `sched_index`: 上一次分派的位置，用于轮转扫描
//!
//! 字段用原子类型只是为了在不写 `unsafe` 的前提下满足 `Sync`，
//! 语义上仍然是 CPU 私有的数据。

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use crate::arch::Arch;
use crate::config::MAX_CPUS;

/// 逻辑 CPU 编号 (0..ncpu)
pub type CpuId = usize;

const NO_PROC: usize = usize::MAX;

pub struct Cpu {
    /// 硬件编号
    hart: u32,
    /// push_off 嵌套深度
    ncli: AtomicI32,
    /// 最外层 push_off 之前中断是否开启
    intena: AtomicBool,
    /// 当前运行的进程槽位
    proc: AtomicUsize,
    /// 上一次分派的进程槽位
    sched_index: AtomicUsize,
}

impl Cpu {
    fn new(hart: u32) -> Self {
        Self {
            hart,
            ncli: AtomicI32::new(0),
            intena: AtomicBool::new(false),
            proc: AtomicUsize::new(NO_PROC),
            sched_index: AtomicUsize::new(0),
        }
    }

    pub fn hart_id(&self) -> u32 {
        self.hart
    }

    /// 当前 push_off 嵌套深度
    pub fn ncli(&self) -> i32 {
        self.ncli.load(Ordering::Relaxed)
    }

    pub fn intena(&self) -> bool {
        self.intena.load(Ordering::Relaxed)
    }

    /// 当前在该 CPU 上运行的进程槽位
    pub fn proc(&self) -> Option<usize> {
        match self.proc.load(Ordering::Relaxed) {
            NO_PROC => None,
            slot => Some(slot),
        }
    }

    pub(crate) fn set_proc(&self, slot: Option<usize>) {
        self.proc.store(slot.unwrap_or(NO_PROC), Ordering::Relaxed);
    }

    pub(crate) fn sched_index(&self) -> usize {
        self.sched_index.load(Ordering::Relaxed)
    }

    pub(crate) fn set_sched_index(&self, slot: usize) {
        self.sched_index.store(slot, Ordering::Relaxed);
    }
}

/// 全部 CPU 的状态表
pub struct Cpus {
    arch: Box<dyn Arch>,
    cpus: Vec<Cpu>,
}

impl Cpus {
    /// 按硬件编号列表创建 CPU 表，列表下标即逻辑编号
    pub fn new(arch: Box<dyn Arch>, harts: &[u32]) -> Self {
        assert!(
            !harts.is_empty() && harts.len() <= MAX_CPUS,
            "cpus: {} cpus configured, limit is {}",
            harts.len(),
            MAX_CPUS
        );
        for (i, hart) in harts.iter().enumerate() {
            assert!(!harts[..i].contains(hart), "cpus: duplicate hart id {}", hart);
        }

        Self {
            arch,
            cpus: harts.iter().map(|&hart| Cpu::new(hart)).collect(),
        }
    }

    pub fn arch(&self) -> &dyn Arch {
        &*self.arch
    }

    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    pub fn cpu(&self, id: CpuId) -> &Cpu {
        &self.cpus[id]
    }

    /// 当前 CPU 的逻辑编号
    ///
    /// 必须在关中断时调用，否则读到编号后可能被迁移到别的核上。
    pub fn cpuid(&self) -> CpuId {
        if self.arch.intr_get() {
            panic!("mycpu called with interrupts enabled");
        }

        let hart = self.arch.hart_id();
        self.cpus
            .iter()
            .position(|c| c.hart == hart)
            .unwrap_or_else(|| panic!("unknown hart id {}", hart))
    }

    /// 当前 CPU，约束同 [`Cpus::cpuid`]
    pub fn mycpu(&self) -> &Cpu {
        &self.cpus[self.cpuid()]
    }

    /// 关中断并增加嵌套深度
    ///
    /// push_off / pop_off 必须成对使用：两次 push_off 需要两次 pop_off 才能恢复。
    /// 如果最外层 push_off 之前中断本来就是关闭的，pop_off 之后依然关闭。
    pub fn push_off(&self) {
        let old = self.arch.intr_get();
        self.arch.intr_off();

        let c = self.mycpu();
        if c.ncli.load(Ordering::Relaxed) == 0 {
            c.intena.store(old, Ordering::Relaxed);
        }
        c.ncli.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pop_off(&self) {
        if self.arch.intr_get() {
            panic!("pop_off - interruptible");
        }

        let c = self.mycpu();
        let depth = c.ncli.fetch_sub(1, Ordering::Relaxed) - 1;
        if depth < 0 {
            panic!("pop_off");
        }
        if depth == 0 && c.intena.load(Ordering::Relaxed) {
            self.arch.intr_on();
        }
    }
}
