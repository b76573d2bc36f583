//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程退出与回收
//!
//! - `exit`: 释放文件和当前目录，把子进程过继给 init，变成 Zombie
//! - `wait`: 回收一个 Zombie 子进程，没有时在自己的描述符上睡眠
//! - `kill`: 只做标记，目标在下次跨越用户/内核边界时自己退出

use log::debug;

use crate::config::NOFILE;
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::process::{Pid, ProcFlags, ProcState, ProcTable};
use crate::sched::{Blocking, Switch};

impl Kernel {
    /// 退出当前进程
    ///
    /// 不会回到调用者：返回的 [`Switch::Sched`] 必须一直传回调度器。
    /// 进程保持 Zombie 状态，直到父进程调用 wait。
    pub fn exit(&self) -> Switch<'_> {
        let cur = self.current("exit");
        let init = *self
            .initproc
            .get()
            .unwrap_or_else(|| panic!("exit: no init process"));
        if cur == init {
            panic!("init exiting");
        }

        // 关闭所有打开的文件
        let (ofile, cwd) = {
            let mut table = self.ptable.lock(&self.cpus);
            let p = table.get_mut(cur);
            (core::mem::replace(&mut p.ofile, [None; NOFILE]), p.cwd.take())
        };
        for f in ofile.into_iter().flatten() {
            self.fs.fileclose(f);
        }

        self.fs.begin_op();
        if let Some(ip) = cwd {
            self.fs.iput(ip);
        }
        self.fs.end_op();

        let mut table = self.ptable.lock(&self.cpus);

        // 父进程可能正在 wait 里睡眠
        if let Some(parent) = table.get(cur).parent {
            let chan = table.chan_of(parent);
            table.wakeup1(chan);
        }

        // 把子进程过继给 init
        let mut wake_init = false;
        for p in table.procs.iter_mut() {
            if p.parent == Some(cur) {
                p.parent = Some(init);
                wake_init |= p.state == ProcState::Zombie;
            }
        }
        if wake_init {
            let chan = table.chan_of(init);
            table.wakeup1(chan);
        }

        let p = table.get_mut(cur);
        p.state = ProcState::Zombie;
        debug!("exit: pid {}", p.pid);

        Switch::Sched(table)
    }

    /// 等待一个子进程退出，返回它的 PID
    ///
    /// 没有 Zombie 子进程时睡眠，返回 [`Blocking::Pending`]，
    /// 被唤醒后调用者需要重新调用 wait。
    pub fn wait(&self) -> Blocking<'_, Result<Pid, Errno>> {
        let cur = self.current("wait");
        let mut table = self.ptable.lock(&self.cpus);

        let mut havekids = false;
        for slot in 0..table.len() {
            if table.get(slot).parent != Some(cur) {
                continue;
            }
            havekids = true;
            if table.get(slot).state == ProcState::Zombie {
                let pid = self.reap(&mut table, slot);
                debug!("wait: pid {} reaped pid {}", table.get(cur).pid, pid);
                return Blocking::Ready(Ok(pid));
            }
        }

        if !havekids {
            return Blocking::Ready(Err(Errno::NoChild));
        }
        if table.get(cur).killed() {
            return Blocking::Ready(Err(Errno::InterruptedSystemCall));
        }

        let chan = table.chan_of(cur);
        Blocking::Pending(self.sleep_locked(chan, table))
    }

    /// 标记 `pid` 为 killed，睡眠中的目标会被唤醒
    pub fn kill(&self, pid: Pid) -> Result<(), Errno> {
        let mut table = self.ptable.lock(&self.cpus);
        let slot = table.find(pid).ok_or(Errno::NoSuchProcess)?;

        let p = table.get_mut(slot);
        p.flags.insert(ProcFlags::KILLED);
        if p.state == ProcState::Sleeping {
            p.state = ProcState::Runnable;
        }
        debug!("kill: pid {}", pid);
        Ok(())
    }

    /// 当前进程是否已被 kill
    pub fn killed(&self) -> bool {
        match self.myproc() {
            Some(slot) => self.ptable.lock(&self.cpus).get(slot).killed(),
            None => false,
        }
    }

    /// 释放 Zombie 的内核栈和地址空间，槽位回到 Unused
    fn reap(&self, table: &mut ProcTable, slot: usize) -> Pid {
        let pid = table.get(slot).pid;
        let remains = table.get_mut(slot).reset();
        if let Some(stack) = remains.kstack {
            stack.free(&*self.pages);
        }
        // 地址空间和上下文随 drop 释放
        drop(remains.vm);
        drop(remains.context);
        pid
    }
}
