//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程创建
//!
//! 流程:
//! 1. `allocproc` 占用一个槽位并分配内核栈
//! 2. 复制父进程的地址空间
//! 3. 复制打开文件和当前目录（只增加引用）
//! 4. 子进程的返回值置 0，标记为 Runnable
//!
//! 中途失败时已经占用的内核栈和槽位都会归还。

use alloc::boxed::Box;
use alloc::string::String;

use log::{debug, info};

use crate::config::PAGE_SIZE;
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, KernelStack};
use crate::process::{Pid, ProcState, ProcTable};
use crate::sched::Context;
use crate::trap::TrapFrame;

impl Kernel {
    /// 分配一个进程描述符
    ///
    /// 成功时槽位处于 Embryo 状态，已有 PID 和内核栈，
    /// 第一次被调度时会先经过 forkret。
    pub(crate) fn allocproc(&self) -> Result<usize, Errno> {
        let slot = self.ptable.lock(&self.cpus).alloc_slot()?;

        // 分配内核栈不需要持有进程表锁，Embryo 槽位不会被别人动
        let Some(stack) = KernelStack::alloc(&*self.pages) else {
            let mut table = self.ptable.lock(&self.cpus);
            table.get_mut(slot).reset();
            return Err(Errno::OutOfMemory);
        };

        let mut table = self.ptable.lock(&self.cpus);
        let p = table.get_mut(slot);
        p.kstack = Some(stack);
        p.tf = TrapFrame::default();
        p.started = false;
        Ok(slot)
    }

    /// 创建第一个用户进程
    ///
    /// `vm` 已经装好了 initcode，大小为一页。只能调用一次。
    pub fn userinit(
        &self,
        name: &str,
        ctx: Box<dyn Context>,
        vm: Box<dyn AddressSpace>,
    ) -> Result<Pid, Errno> {
        if self.initproc.is_completed() {
            panic!("userinit: init already exists");
        }

        let slot = self.allocproc()?;

        self.fs.begin_op();
        let cwd = self.fs.root();
        self.fs.end_op();

        let mut table = self.ptable.lock(&self.cpus);
        let p = table.get_mut(slot);
        p.vm = Some(vm);
        p.sz = PAGE_SIZE;
        p.context = Some(ctx);
        p.tf = TrapFrame::user();
        p.name = String::from(name);
        p.cwd = Some(cwd);
        self.initproc.call_once(|| slot);

        // 赋值 Runnable 之后其他 CPU 就可能运行它
        p.state = ProcState::Runnable;

        info!("userinit: pid {} ({})", p.pid, name);
        Ok(p.pid)
    }

    /// 创建当前进程的副本
    ///
    /// `ctx` 和 `tf` 是当前进程正在运行的上下文（运行期间不在描述符里）。
    /// 子进程从同一位置继续执行，返回值为 0。
    pub fn fork(&self, ctx: &dyn Context, tf: &TrapFrame) -> Result<Pid, Errno> {
        let cur = self.current("fork");
        let child = self.allocproc()?;

        let mut table = self.ptable.lock(&self.cpus);
        let (sz, vm, ofile, cwd, name) = {
            let parent = table.get(cur);
            let vm = parent
                .vm
                .as_ref()
                .map(|vm| vm.duplicate(parent.sz))
                .transpose();
            (parent.sz, vm, parent.ofile, parent.cwd, parent.name.clone())
        };

        let vm = match vm {
            Ok(vm) => vm,
            Err(e) => {
                self.unwind(&mut table, child);
                return Err(e);
            }
        };

        let ofile = ofile.map(|f| f.map(|f| self.fs.filedup(f)));
        let cwd = cwd.map(|ip| self.fs.idup(ip));

        let p = table.get_mut(child);
        p.vm = vm;
        p.sz = sz;
        p.parent = Some(cur);
        p.tf = *tf;
        p.tf.ret = 0;
        p.tf.restart = false;
        p.context = Some(ctx.duplicate());
        p.ofile = ofile;
        p.cwd = cwd;
        p.name = name;
        p.state = ProcState::Runnable;

        debug!("fork: pid {} -> pid {}", table.get(cur).pid, table.get(child).pid);
        Ok(table.get(child).pid)
    }

    /// 归还一个尚未启动的槽位
    fn unwind(&self, table: &mut ProcTable, slot: usize) {
        let remains = table.get_mut(slot).reset();
        if let Some(stack) = remains.kstack {
            stack.free(&*self.pages);
        }
    }
}
