//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程描述符
//!
//! 生命周期：
//! ```text
//! Unused -> Embryo -> Runnable -> Running -> {Runnable <-> Sleeping}* -> Zombie -> Unused
//! ```
//! 所有字段只在持有进程表锁时修改。

use alloc::boxed::Box;
use alloc::string::String;

use bitflags::bitflags;

use crate::config::NOFILE;
use crate::fs::{FileRef, InodeRef};
use crate::mm::{AddressSpace, KernelStack};
use crate::sched::Context;
use crate::trap::TrapFrame;

/// 进程标识符，单调递增，不复用
pub type Pid = u32;

/// 进程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProcState {
    /// 空槽位
    Unused = 0,
    /// 槽位已占用，还在初始化
    Embryo = 1,
    /// 在某个 channel 上睡眠
    Sleeping = 2,
    /// 可运行，等待分派
    Runnable = 3,
    /// 正在某个 CPU 上运行
    Running = 4,
    /// 已退出，等待父进程回收
    Zombie = 5,
}

impl ProcState {
    /// procdump 使用的定长名字
    pub fn as_str(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Embryo => "embryo",
            ProcState::Sleeping => "sleep ",
            ProcState::Runnable => "runble",
            ProcState::Running => "run   ",
            ProcState::Zombie => "zombie",
        }
    }

    /// 参与 MLFQ 记账的状态
    pub fn is_live(self) -> bool {
        matches!(
            self,
            ProcState::Runnable | ProcState::Running | ProcState::Sleeping
        )
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProcFlags: u32 {
        /// 已被 kill，下次跨越用户/内核边界时退出
        const KILLED          = 1 << 0;
        /// 最近一次记账时用完了本级时间片
        const SLICE_EXHAUSTED = 1 << 1;
        /// 在返回用户态前被时钟中断抢占
        const PREEMPTED       = 1 << 2;
    }
}

/// 睡眠 channel
///
/// 只用于相等比较，不拥有也不解引用它指向的对象。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel(usize);

impl Channel {
    /// 以对象地址作为 channel
    pub fn of<T: ?Sized>(obj: &T) -> Self {
        Channel(obj as *const T as *const () as usize)
    }

    pub const fn from_raw(token: usize) -> Self {
        Channel(token)
    }
}

/// MLFQ 调度字段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedInfo {
    /// 队列级别，0 最高
    pub level: usize,
    /// 本级时间片内已用的 tick
    pub burst: u64,
    /// 累计 CPU 时间
    pub total: u64,
    /// 可运行但未被调度的 tick
    pub cpu_wait: u64,
    /// 睡眠的 tick
    pub io_wait: u64,
    /// 生命周期 CPU 预算，用完即被 kill
    pub budget: Option<u64>,
    /// 进入当前级别的 tick
    pub queue_enter: u64,
}

impl SchedInfo {
    pub fn new(now: u64) -> Self {
        Self {
            queue_enter: now,
            ..Self::default()
        }
    }

    /// 换级时清零计数器并记录进入时间
    pub fn enter_level(&mut self, level: usize, now: u64) {
        self.level = level;
        self.queue_enter = now;
        self.burst = 0;
        self.cpu_wait = 0;
        self.io_wait = 0;
    }
}

/// 延迟释放的内存
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingDealloc {
    /// 待释放的字节数
    pub size: usize,
    /// 延迟的 tick 数
    pub delay: u64,
    /// 记录的起始 tick
    pub start: u64,
}

impl PendingDealloc {
    pub fn is_pending(&self) -> bool {
        self.size > 0
    }

    pub fn deadline(&self) -> u64 {
        self.start + self.delay
    }
}

pub struct Proc {
    pub(crate) pid: Pid,
    pub(crate) state: ProcState,
    pub(crate) name: String,
    /// 用户地址空间大小（对外报告的值）
    pub(crate) sz: usize,
    pub(crate) vm: Option<Box<dyn AddressSpace>>,
    pub(crate) kstack: Option<KernelStack>,
    /// 保存的执行上下文；运行期间由调度器暂时取出
    pub(crate) context: Option<Box<dyn Context>>,
    pub(crate) tf: TrapFrame,
    /// 父进程槽位（不拥有）
    pub(crate) parent: Option<usize>,
    pub(crate) chan: Option<Channel>,
    pub(crate) flags: ProcFlags,
    pub(crate) sched: SchedInfo,
    pub(crate) dealloc: PendingDealloc,
    pub(crate) ofile: [Option<FileRef>; NOFILE],
    pub(crate) cwd: Option<InodeRef>,
    /// 是否已经经过第一次调度
    pub(crate) started: bool,
    /// 进行中的 tick 睡眠的截止时间
    pub(crate) wake_tick: Option<u64>,
}

impl Default for Proc {
    fn default() -> Self {
        Self {
            pid: 0,
            state: ProcState::Unused,
            name: String::new(),
            sz: 0,
            vm: None,
            kstack: None,
            context: None,
            tf: TrapFrame::default(),
            parent: None,
            chan: None,
            flags: ProcFlags::empty(),
            sched: SchedInfo::default(),
            dealloc: PendingDealloc::default(),
            ofile: [None; NOFILE],
            cwd: None,
            started: false,
            wake_tick: None,
        }
    }
}

/// 回收槽位时需要交还的资源
pub(crate) struct Remains {
    pub kstack: Option<KernelStack>,
    pub vm: Option<Box<dyn AddressSpace>>,
    pub context: Option<Box<dyn Context>>,
}

impl Proc {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.sz
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn chan(&self) -> Option<Channel> {
        self.chan
    }

    pub fn flags(&self) -> ProcFlags {
        self.flags
    }

    pub fn killed(&self) -> bool {
        self.flags.contains(ProcFlags::KILLED)
    }

    pub fn sched(&self) -> &SchedInfo {
        &self.sched
    }

    pub fn dealloc(&self) -> &PendingDealloc {
        &self.dealloc
    }

    pub fn trap_frame(&self) -> &TrapFrame {
        &self.tf
    }

    /// 把槽位恢复成 Unused，返回需要释放的资源
    pub(crate) fn reset(&mut self) -> Remains {
        let old = core::mem::take(self);
        Remains {
            kstack: old.kstack,
            vm: old.vm,
            context: old.context,
        }
    }
}

/// procdump 的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcInfo {
    pub pid: Pid,
    pub state: ProcState,
    pub name: String,
    pub size: usize,
    pub level: usize,
    pub burst: u64,
    pub total: u64,
    pub cpu_wait: u64,
    pub io_wait: u64,
    pub budget: Option<u64>,
    pub pending_dealloc: usize,
}

impl From<&Proc> for ProcInfo {
    fn from(p: &Proc) -> Self {
        Self {
            pid: p.pid,
            state: p.state,
            name: p.name.clone(),
            size: p.sz,
            level: p.sched.level,
            burst: p.sched.burst,
            total: p.sched.total,
            cpu_wait: p.sched.cpu_wait,
            io_wait: p.sched.io_wait,
            budget: p.sched.budget,
            pending_dealloc: p.dealloc.size,
        }
    }
}
