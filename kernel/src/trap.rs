//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 陷入处理
//!
//! 平台的陷入入口保存好寄存器后调用 [`Kernel::trap`]（中断、异常）或
//! [`Kernel::syscall`]（见 [`crate::syscall`]），并把返回的切换标签交回调度器。
//!
//! 时钟中断只由 0 号 CPU 推进 tick：
//! - tick 加一
//! - 对进程表做 MLFQ 记账和延迟释放回收
//! - 唤醒在 tick 上睡眠的进程

use log::{trace, warn};

use crate::kernel::Kernel;
use crate::process::{ProcFlags, ProcState};
use crate::sched::Switch;

/// 陷入时保存的用户态寄存器
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    /// 系统调用号
    pub num: usize,
    /// 系统调用参数
    pub args: [isize; 6],
    /// 返回值寄存器
    pub ret: isize,
    /// 陷入前是否处于用户态
    pub from_user: bool,
    /// 系统调用阻塞了，返回用户态前需要重新执行
    pub restart: bool,
}

impl TrapFrame {
    /// 用户态的空 trap frame
    pub fn user() -> Self {
        Self {
            from_user: true,
            ..Self::default()
        }
    }

    /// 构造一次系统调用
    pub fn syscall(num: usize, args: &[isize]) -> Self {
        let mut tf = Self::user();
        tf.num = num;
        let n = args.len().min(tf.args.len());
        tf.args[..n].copy_from_slice(&args[..n]);
        tf
    }

    pub fn arg(&self, i: usize) -> isize {
        self.args[i]
    }
}

/// 陷入原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapKind {
    /// 时钟中断
    Timer,
    /// 外部设备中断
    Device(u32),
    /// 伪中断
    Spurious,
    /// 异常（缺页、非法指令等）
    Fault { code: u32, addr: usize },
}

impl Kernel {
    /// 中断和异常的统一入口
    pub fn trap(&self, tf: &mut TrapFrame, kind: TrapKind) -> Switch<'_> {
        match kind {
            TrapKind::Timer => {
                if self.cpuid() == 0 {
                    self.clock_tick();
                }
            }
            TrapKind::Device(irq) => {
                trace!("cpu{}: device irq {}", self.cpuid(), irq);
            }
            TrapKind::Spurious => {
                warn!("cpu{}: spurious interrupt", self.cpuid());
            }
            TrapKind::Fault { code, addr } => match self.myproc() {
                Some(slot) if tf.from_user => {
                    let mut table = self.ptable.lock(&self.cpus);
                    let p = table.get_mut(slot);
                    warn!(
                        "pid {} {}: trap {} on cpu {} addr {:#x} -- kill proc",
                        p.pid,
                        p.name,
                        code,
                        self.cpus.cpuid(),
                        addr
                    );
                    p.flags.insert(ProcFlags::KILLED);
                }
                // 内核态的异常只能是内核自己的错误
                _ => panic!(
                    "unexpected trap {} from cpu {} (addr {:#x})",
                    code,
                    self.cpuid(),
                    addr
                ),
            },
        }

        let Some(slot) = self.myproc() else {
            return Switch::Continue;
        };
        let (killed, state) = {
            let table = self.ptable.lock(&self.cpus);
            let p = table.get(slot);
            (p.killed(), p.state)
        };

        // 被 kill 的进程在返回用户态之前退出；仍在内核里的继续跑到系统调用返回处
        if killed && tf.from_user {
            return self.exit();
        }
        if state == ProcState::Running && kind == TrapKind::Timer {
            return self.preempt(slot);
        }
        Switch::Continue
    }

    /// 时钟中断抢占，恢复时还停在返回用户态的边界上
    fn preempt(&self, slot: usize) -> Switch<'_> {
        let mut table = self.ptable.lock(&self.cpus);
        let p = table.get_mut(slot);
        p.state = ProcState::Runnable;
        p.flags.insert(ProcFlags::PREEMPTED);
        Switch::Sched(table)
    }

    /// 时钟 tick，返回新的 tick 数
    ///
    /// 只应由 0 号 CPU 的时钟中断调用。
    pub fn clock_tick(&self) -> u64 {
        let mut ticks = self.ticks.lock(&self.cpus);
        *ticks += 1;
        let now = *ticks;
        #[cfg(feature = "debug_log")]
        trace!("tick {}", now);

        let mut table = self.ptable.lock(&self.cpus);
        table.account(&self.policy, now);
        table.wakeup1(self.ticks_chan());
        now
    }
}
