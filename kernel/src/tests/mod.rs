//! 单元测试模块
//!
//! 在宿主机上用 std 运行，每个测试构造自己的 [`Machine`]：
//! ```bash
//! cargo test -p mlfq-kernel
//! ```
//!
//! 模拟环境：
//! - [`HostArch`]: 每个线程就是一个 CPU，hart id 和中断开关存在线程局部变量里
//! - [`Pages`] / [`Vm`] / [`Fs`]: 带计数器和故障注入的协作者
//! - [`Script`]: 按操作序列执行的进程体，每个操作对应一次内核调用

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::arch::Arch;
use crate::config::PAGE_SIZE;
use crate::errno::Errno;
use crate::fs::{FileRef, FileSystem, InodeRef};
use crate::kernel::{Kernel, KernelConfig};
use crate::mm::{AddressSpace, PageAllocator};
use crate::process::{Channel, Pid, ProcInfo};
use crate::sched::{Blocking, Context, Switch};
use crate::sync::SpinLock;
use crate::trap::{TrapFrame, TrapKind};


thread_local! {
    static HART: Cell<u32> = Cell::new(0);
    static INTR: Cell<bool> = Cell::new(false);
}

/// 当前线程扮演的 CPU
pub fn set_hart(hart: u32) {
    HART.with(|h| h.set(hart));
    INTR.with(|i| i.set(false));
}

pub struct HostArch;

impl Arch for HostArch {
    fn hart_id(&self) -> u32 {
        HART.with(|h| h.get())
    }

    fn intr_get(&self) -> bool {
        INTR.with(|i| i.get())
    }

    fn intr_on(&self) {
        INTR.with(|i| i.set(true));
    }

    fn intr_off(&self) {
        INTR.with(|i| i.set(false));
    }
}

/// 物理页分配器
#[derive(Default)]
pub struct Pages {
    next: AtomicUsize,
    live: AtomicIsize,
    fail: AtomicBool,
}

impl Pages {
    /// 尚未释放的页数
    pub fn live(&self) -> isize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl PageAllocator for Arc<Pages> {
    fn kalloc(&self) -> Option<usize> {
        if self.fail.load(Ordering::SeqCst) {
            return None;
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Some(0x8000_0000 + self.next.fetch_add(1, Ordering::SeqCst) * PAGE_SIZE)
    }

    fn kfree(&self, _pa: usize) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 所有地址空间共享的统计
#[derive(Default)]
pub struct VmStats {
    live: AtomicIsize,
    grows: AtomicUsize,
    activations: AtomicUsize,
    fail_dup: AtomicBool,
    shrinks: Mutex<Vec<(usize, usize)>>,
}

impl VmStats {
    /// 尚未释放的地址空间数
    pub fn live(&self) -> isize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn grows(&self) -> usize {
        self.grows.load(Ordering::SeqCst)
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn shrinks(&self) -> Vec<(usize, usize)> {
        self.shrinks.lock().unwrap().clone()
    }

    pub fn set_fail_dup(&self, fail: bool) {
        self.fail_dup.store(fail, Ordering::SeqCst);
    }
}

pub struct Vm {
    sz: usize,
    stats: Arc<VmStats>,
}

impl Vm {
    pub fn new(stats: &Arc<VmStats>, sz: usize) -> Box<dyn AddressSpace> {
        stats.live.fetch_add(1, Ordering::SeqCst);
        Box::new(Vm {
            sz,
            stats: stats.clone(),
        })
    }
}

impl AddressSpace for Vm {
    fn grow(&mut self, old_sz: usize, new_sz: usize) -> Result<usize, Errno> {
        assert_eq!(old_sz, self.sz, "grow from a stale size");
        self.stats.grows.fetch_add(1, Ordering::SeqCst);
        self.sz = new_sz;
        Ok(new_sz)
    }

    fn shrink(&mut self, old_sz: usize, new_sz: usize) -> usize {
        assert_eq!(old_sz, self.sz, "shrink from a stale size");
        self.stats.shrinks.lock().unwrap().push((old_sz, new_sz));
        self.sz = new_sz;
        new_sz
    }

    fn duplicate(&self, sz: usize) -> Result<Box<dyn AddressSpace>, Errno> {
        if self.stats.fail_dup.load(Ordering::SeqCst) {
            return Err(Errno::OutOfMemory);
        }
        Ok(Vm::new(&self.stats, sz))
    }

    fn activate(&self) {
        self.stats.activations.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 文件系统，只统计引用计数
#[derive(Default)]
pub struct Fs {
    inits: AtomicUsize,
    in_op: AtomicIsize,
    ops: AtomicUsize,
    inode_refs: AtomicIsize,
    file_refs: AtomicIsize,
    iput_outside_op: AtomicBool,
}

impl Fs {
    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    /// 完成的事务数
    pub fn ops(&self) -> usize {
        self.ops.load(Ordering::SeqCst)
    }

    pub fn inode_refs(&self) -> isize {
        self.inode_refs.load(Ordering::SeqCst)
    }

    pub fn file_refs(&self) -> isize {
        self.file_refs.load(Ordering::SeqCst)
    }

    pub fn iput_outside_op(&self) -> bool {
        self.iput_outside_op.load(Ordering::SeqCst)
    }

    /// 模拟一次 open
    pub fn open(&self, fd: u32) -> FileRef {
        self.file_refs.fetch_add(1, Ordering::SeqCst);
        FileRef(fd)
    }
}

impl FileSystem for Arc<Fs> {
    fn init(&self) {
        self.inits.fetch_add(1, Ordering::SeqCst);
    }

    fn begin_op(&self) {
        self.in_op.fetch_add(1, Ordering::SeqCst);
    }

    fn end_op(&self) {
        self.in_op.fetch_sub(1, Ordering::SeqCst);
        self.ops.fetch_add(1, Ordering::SeqCst);
    }

    fn root(&self) -> InodeRef {
        self.inode_refs.fetch_add(1, Ordering::SeqCst);
        InodeRef(1)
    }

    fn idup(&self, ip: InodeRef) -> InodeRef {
        self.inode_refs.fetch_add(1, Ordering::SeqCst);
        ip
    }

    fn iput(&self, _ip: InodeRef) {
        if self.in_op.load(Ordering::SeqCst) <= 0 {
            self.iput_outside_op.store(true, Ordering::SeqCst);
        }
        self.inode_refs.fetch_sub(1, Ordering::SeqCst);
    }

    fn filedup(&self, f: FileRef) -> FileRef {
        self.file_refs.fetch_add(1, Ordering::SeqCst);
        f
    }

    fn fileclose(&self, _f: FileRef) {
        self.file_refs.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 脚本中的一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// fork，子进程从 `child` 开始执行
    Fork { child: usize },
    Exit,
    /// wait，阻塞时被唤醒后重试
    Wait,
    Yield,
    /// 运行一个 tick 后被时钟中断
    Tick,
    /// 死循环，每次 resume 消耗一个 tick
    Spin,
    /// 原地不停 yield
    Park,
    /// 设置完成标志后 Park
    Halt,
    SleepTicks(u64),
    Kill(Pid),
    SetInfo { level: isize, budget: isize },
    Syscall { num: usize, a0: isize, a1: isize },
    /// 用户态异常
    Fault,
    /// 在共享标志上等待它被置位
    AwaitFlag,
    /// 置位共享标志并唤醒等待者
    RaiseFlag,
    Mark(u32),
}

/// 脚本执行留下的记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Forked(Result<Pid, Errno>),
    Waited(Result<Pid, Errno>),
    Slept(Result<(), Errno>),
    Killed(Result<(), Errno>),
    Info(Result<(), Errno>),
    Ret(isize),
    Flag,
    Mark(u32),
}

pub type EventLog = Arc<Mutex<Vec<(Pid, Event)>>>;

#[derive(Clone)]
pub struct Script {
    ops: Arc<Vec<Op>>,
    pc: usize,
    /// fork 出来的子进程第一次运行时记录系统调用的返回值
    forked_by_syscall: bool,
    log: EventLog,
    done: Arc<AtomicBool>,
    flag: Arc<SpinLock<bool>>,
}

impl Script {
    fn record(&self, pid: Pid, event: Event) {
        self.log.lock().unwrap().push((pid, event));
    }
}

impl Context for Script {
    fn resume<'k>(&mut self, k: &'k Kernel, tf: &mut TrapFrame) -> Switch<'k> {
        let pid = k.getpid().unwrap_or(0);
        if core::mem::take(&mut self.forked_by_syscall) {
            self.record(pid, Event::Ret(tf.ret));
        }

        let op = *self
            .ops
            .get(self.pc)
            .unwrap_or_else(|| panic!("pid {}: script ran off the end", pid));
        match op {
            Op::Fork { .. } => {
                let r = k.fork(&*self, tf);
                self.record(pid, Event::Forked(r));
                self.pc += 1;
                Switch::Continue
            }
            Op::Exit => k.exit(),
            Op::Wait => match k.wait() {
                Blocking::Ready(r) => {
                    self.record(pid, Event::Waited(r));
                    self.pc += 1;
                    Switch::Continue
                }
                Blocking::Pending(switch) => switch,
            },
            Op::Yield => {
                self.pc += 1;
                k.yield_cpu()
            }
            Op::Tick => {
                self.pc += 1;
                k.trap(tf, TrapKind::Timer)
            }
            Op::Spin => k.trap(tf, TrapKind::Timer),
            Op::Park => k.yield_cpu(),
            Op::Halt => {
                self.done.store(true, Ordering::SeqCst);
                k.yield_cpu()
            }
            Op::SleepTicks(n) => match k.sleep_ticks(n) {
                Blocking::Ready(r) => {
                    self.record(pid, Event::Slept(r));
                    self.pc += 1;
                    Switch::Continue
                }
                Blocking::Pending(switch) => switch,
            },
            Op::Kill(target) => {
                let r = k.kill(target);
                self.record(pid, Event::Killed(r));
                self.pc += 1;
                Switch::Continue
            }
            Op::SetInfo { level, budget } => {
                let r = k.set_proc_info(level, 0, 0, 0, budget);
                self.record(pid, Event::Info(r));
                self.pc += 1;
                Switch::Continue
            }
            Op::Syscall { num, a0, a1 } => {
                tf.num = num;
                tf.args[0] = a0;
                tf.args[1] = a1;
                match k.syscall(&*self, tf) {
                    Switch::Continue => {
                        self.record(pid, Event::Ret(tf.ret));
                        self.pc += 1;
                        Switch::Continue
                    }
                    // 阻塞的调用不前进，唤醒后重新发起
                    sched => sched,
                }
            }
            Op::Fault => k.trap(tf, TrapKind::Fault { code: 13, addr: 0xdead }),
            Op::AwaitFlag => {
                let raised = self.flag.lock(k.cpus());
                if *raised {
                    drop(raised);
                    self.record(pid, Event::Flag);
                    self.pc += 1;
                    Switch::Continue
                } else {
                    k.sleep(Channel::of(&*self.flag), raised)
                }
            }
            Op::RaiseFlag => {
                *self.flag.lock(k.cpus()) = true;
                k.wakeup(Channel::of(&*self.flag));
                self.pc += 1;
                Switch::Continue
            }
            Op::Mark(n) => {
                self.record(pid, Event::Mark(n));
                self.pc += 1;
                Switch::Continue
            }
        }
    }

    fn duplicate(&self) -> Box<dyn Context> {
        let mut child = self.clone();
        match self.ops[self.pc] {
            Op::Fork { child: target } => child.pc = target,
            Op::Syscall { .. } => {
                child.pc = self.pc + 1;
                child.forked_by_syscall = true;
            }
            op => panic!("duplicate at {:?}", op),
        }
        Box::new(child)
    }
}

/// 一台测试机器：内核加上可以检查的协作者
pub struct Machine {
    pub kernel: Kernel,
    pub pages: Arc<Pages>,
    pub vm: Arc<VmStats>,
    pub fs: Arc<Fs>,
    pub log: EventLog,
    pub done: Arc<AtomicBool>,
    pub flag: Arc<SpinLock<bool>>,
}

impl Machine {
    pub fn new(config: KernelConfig) -> Self {
        let pages = Arc::new(Pages::default());
        let fs = Arc::new(Fs::default());
        Self {
            kernel: Kernel::new(
                config,
                Box::new(HostArch),
                Box::new(pages.clone()),
                Box::new(fs.clone()),
            ),
            pages,
            vm: Arc::new(VmStats::default()),
            fs,
            log: Arc::new(Mutex::new(Vec::new())),
            done: Arc::new(AtomicBool::new(false)),
            flag: Arc::new(SpinLock::new("flag", false)),
        }
    }

    /// 创建机器并以 `ops` 作为 init 进程
    pub fn boot(config: KernelConfig, ops: Vec<Op>) -> Self {
        let m = Self::new(config);
        let init = m.script(ops);
        let pid = m
            .kernel
            .userinit("initcode", Box::new(init), Vm::new(&m.vm, PAGE_SIZE))
            .expect("userinit");
        assert_eq!(pid, 1);
        m
    }

    pub fn script(&self, ops: Vec<Op>) -> Script {
        Script {
            ops: Arc::new(ops),
            pc: 0,
            forked_by_syscall: false,
            log: self.log.clone(),
            done: self.done.clone(),
            flag: self.flag.clone(),
        }
    }

    /// 在当前线程上调度 `rounds` 轮，返回每轮运行的 PID
    pub fn run(&self, rounds: usize) -> Vec<Pid> {
        (0..rounds).filter_map(|_| self.kernel.run_once()).collect()
    }

    /// 每个 CPU 一个线程调度，直到某个脚本执行 Halt
    pub fn run_smp(&self, ncpu: u32) {
        std::thread::scope(|s| {
            for hart in 0..ncpu {
                s.spawn(move || {
                    set_hart(hart);
                    for _ in 0..5_000_000 {
                        if self.done.load(Ordering::SeqCst) {
                            break;
                        }
                        self.kernel.run_once();
                    }
                });
            }
        });
        assert!(self.done.load(Ordering::SeqCst), "machine did not halt");
    }

    /// 推进 `n` 个时钟 tick
    pub fn tick(&self, n: u64) {
        for _ in 0..n {
            self.kernel.clock_tick();
        }
    }

    pub fn events(&self) -> Vec<(Pid, Event)> {
        self.log.lock().unwrap().clone()
    }

    pub fn events_of(&self, pid: Pid) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|&(p, _)| p == pid)
            .map(|(_, e)| e)
            .collect()
    }

    pub fn proc(&self, pid: Pid) -> Option<ProcInfo> {
        self.kernel.snapshot().into_iter().find(|p| p.pid == pid)
    }
}

pub fn config() -> KernelConfig {
    KernelConfig::default().with_nproc(8)
}
