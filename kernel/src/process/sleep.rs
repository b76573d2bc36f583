//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 睡眠与唤醒
//!
//! 条件变量式的协议：调用者持有保护条件的锁检查条件，条件不满足时调用
//! [`Kernel::sleep`]。sleep 先拿进程表锁再放调用者的锁，而 wakeup
//! 必须持有进程表锁，所以检查条件和进入睡眠之间的唤醒不会丢失。
//!
//! 被唤醒不代表条件成立，调用者必须在循环里重新检查。

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::process::{Channel, ProcState, ProcTable};
use crate::sched::{Blocking, Switch};
use crate::sync::SpinLockGuard;

impl Kernel {
    /// 释放 `lk` 并在 `chan` 上睡眠
    ///
    /// 返回的切换标签必须传回调度器；被唤醒后进程从 `resume` 重新进入，
    /// 自己重新获取 `lk` 并检查条件。
    ///
    /// 如果调用者持有的就是进程表锁，使用 [`Kernel::sleep_locked`]。
    pub fn sleep<T>(&self, chan: Channel, lk: SpinLockGuard<'_, T>) -> Switch<'_> {
        // 拿到 ptable 之后才能放 lk，wakeup 要持有 ptable 才能运行
        let table = self.ptable.lock(&self.cpus);
        drop(lk);
        self.sleep_locked(chan, table)
    }

    /// 调用者已经持有进程表锁时的 sleep
    pub fn sleep_locked<'k>(
        &'k self,
        chan: Channel,
        mut table: SpinLockGuard<'k, ProcTable>,
    ) -> Switch<'k> {
        let cur = self.current("sleep");
        let p = table.get_mut(cur);
        p.chan = Some(chan);
        p.state = ProcState::Sleeping;
        Switch::Sched(table)
    }

    /// 唤醒在 `chan` 上睡眠的所有进程
    pub fn wakeup(&self, chan: Channel) {
        self.ptable.lock(&self.cpus).wakeup1(chan);
    }

    /// tick 计数所在的 channel
    pub fn ticks_chan(&self) -> Channel {
        Channel::of(&self.ticks)
    }

    /// 睡眠 `n` 个 tick
    ///
    /// 第一次调用记录截止时间，重新进入时沿用同一个截止时间。
    pub fn sleep_ticks(&self, n: u64) -> Blocking<'_, Result<(), Errno>> {
        let cur = self.current("sleep_ticks");
        let ticks = self.ticks.lock(&self.cpus);
        let now = *ticks;

        let deadline = {
            let mut table = self.ptable.lock(&self.cpus);
            let p = table.get_mut(cur);
            if p.killed() {
                p.wake_tick = None;
                return Blocking::Ready(Err(Errno::InterruptedSystemCall));
            }
            *p.wake_tick.get_or_insert(now.saturating_add(n))
        };

        if now >= deadline {
            self.ptable.lock(&self.cpus).get_mut(cur).wake_tick = None;
            return Blocking::Ready(Ok(()));
        }

        Blocking::Pending(self.sleep(self.ticks_chan(), ticks))
    }
}
