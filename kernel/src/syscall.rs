//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 系统调用分发
//!
//! 调用号和参数从 trap frame 读取，结果写回 `tf.ret`：
//! 成功时为非负值，失败时为负的 errno。
//!
//! 阻塞的调用（wait / sleep）置位 `tf.restart` 并返回切换标签，
//! 进程被唤醒后由执行体重新发起同一个调用。

use log::warn;

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::sched::{Blocking, Context, Switch};
use crate::trap::TrapFrame;

/// 系统调用号
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sysno {
    Fork = 1,
    Exit = 2,
    Wait = 3,
    Kill = 6,
    Getpid = 11,
    Sbrk = 12,
    Sleep = 13,
    Uptime = 14,
    SetProcInfo = 22,
    Resize = 23,
}

impl TryFrom<usize> for Sysno {
    type Error = Errno;

    fn try_from(num: usize) -> Result<Self, Self::Error> {
        Ok(match num {
            1 => Sysno::Fork,
            2 => Sysno::Exit,
            3 => Sysno::Wait,
            6 => Sysno::Kill,
            11 => Sysno::Getpid,
            12 => Sysno::Sbrk,
            13 => Sysno::Sleep,
            14 => Sysno::Uptime,
            22 => Sysno::SetProcInfo,
            23 => Sysno::Resize,
            _ => return Err(Errno::FunctionNotImplemented),
        })
    }
}

fn ret(r: Result<isize, Errno>) -> isize {
    r.unwrap_or_else(Errno::as_isize)
}

impl Kernel {
    /// 系统调用入口
    ///
    /// `ctx` 是当前进程的执行体，fork 用它复制子进程。
    pub fn syscall(&self, ctx: &dyn Context, tf: &mut TrapFrame) -> Switch<'_> {
        let cur = self.current("syscall");
        if self.killed() {
            return self.exit();
        }

        tf.restart = false;
        let value = match Sysno::try_from(tf.num) {
            Ok(Sysno::Fork) => ret(self.fork(ctx, tf).map(|pid| pid as isize)),
            Ok(Sysno::Exit) => return self.exit(),
            Ok(Sysno::Wait) => match self.wait() {
                Blocking::Ready(r) => ret(r.map(|pid| pid as isize)),
                Blocking::Pending(switch) => {
                    tf.restart = true;
                    return switch;
                }
            },
            Ok(Sysno::Kill) => match u32::try_from(tf.arg(0)) {
                Ok(pid) => ret(self.kill(pid).map(|_| 0)),
                Err(_) => Errno::NoSuchProcess.as_isize(),
            },
            Ok(Sysno::Getpid) => ret(self.getpid().map(|pid| pid as isize).ok_or(Errno::NoSuchProcess)),
            Ok(Sysno::Sbrk) => ret(self.sbrk(tf.arg(0)).map(|old| old as isize)),
            Ok(Sysno::Sleep) => match u64::try_from(tf.arg(0)) {
                Ok(n) => match self.sleep_ticks(n) {
                    Blocking::Ready(r) => ret(r.map(|_| 0)),
                    Blocking::Pending(switch) => {
                        tf.restart = true;
                        return switch;
                    }
                },
                Err(_) => Errno::InvalidArgument.as_isize(),
            },
            Ok(Sysno::Uptime) => self.uptime() as isize,
            Ok(Sysno::SetProcInfo) => ret(
                self.set_proc_info(tf.arg(0), tf.arg(1), tf.arg(2), tf.arg(3), tf.arg(4))
                    .map(|_| 0),
            ),
            Ok(Sysno::Resize) => ret(self.resize(tf.arg(0), tf.arg(1)).map(|old| old as isize)),
            Err(e) => {
                let table = self.ptable.lock(&self.cpus);
                let p = table.get(cur);
                warn!("{} {}: unknown sys call {}", p.pid(), p.name(), tf.num);
                e.as_isize()
            }
        };

        tf.ret = value;
        if self.killed() {
            return self.exit();
        }
        Switch::Continue
    }
}
