//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 自旋锁
//!
//! 与 `spin::Mutex` 不同，这里的自旋锁在持有期间关闭本 CPU 的中断：
//! 中断处理程序（比如时钟）也会获取同一把锁，如果持锁时被打断，
//! 中断处理程序会在同一个 CPU 上永远自旋下去。
//!
//! 锁的持有者是 **CPU** 而不是线程。进程在交出 CPU 时把进程表锁的
//! guard 交给调度器，由调度器在同一个 CPU 上释放。
//!
//! 以下情况属于编程错误，直接 panic：
//! - 同一个 CPU 重复获取
//! - 释放一把自己没有持有的锁

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::panic::Location;
use core::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};

use crate::cpu::{CpuId, Cpus};

const NO_CPU: usize = usize::MAX;

pub struct SpinLock<T> {
    /// 锁名，用于诊断
    name: &'static str,
    locked: AtomicBool,
    /// 持有锁的 CPU
    cpu: AtomicUsize,
    /// 获取锁的调用位置，只由持有者读写
    location: UnsafeCell<Option<&'static Location<'static>>>,
    data: UnsafeCell<T>,
}

// SAFETY: data 和 location 只在持锁期间访问
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            locked: AtomicBool::new(false),
            cpu: AtomicUsize::new(NO_CPU),
            location: UnsafeCell::new(None),
            data: UnsafeCell::new(data),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 获取锁
    ///
    /// 一直自旋直到拿到锁。持锁时间过长会让其他 CPU 空转。
    #[track_caller]
    pub fn lock<'a>(&'a self, cpus: &'a Cpus) -> SpinLockGuard<'a, T> {
        let caller = Location::caller();

        // 先关中断，避免持锁时被本 CPU 的中断处理程序抢占造成死锁
        cpus.push_off();
        if self.holding(cpus) {
            panic!("acquire {}: already held by this cpu", self.name);
        }

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        // 临界区内的访存不能被重排到拿锁之前
        fence(Ordering::SeqCst);

        self.cpu.store(cpus.cpuid(), Ordering::Relaxed);
        // SAFETY: 刚拿到锁，只有本 CPU 会访问 location
        unsafe { *self.location.get() = Some(caller) };

        SpinLockGuard {
            lock: self,
            cpus,
            _not_send: PhantomData,
        }
    }

    /// 当前 CPU 是否持有这把锁
    pub fn holding(&self, cpus: &Cpus) -> bool {
        cpus.push_off();
        let held = self.locked.load(Ordering::Relaxed)
            && self.cpu.load(Ordering::Relaxed) == cpus.cpuid();
        cpus.pop_off();
        held
    }

    /// 是否有任意 CPU 持有这把锁
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// 持有者的逻辑 CPU 编号
    pub fn holder(&self) -> Option<CpuId> {
        match self.cpu.load(Ordering::Relaxed) {
            NO_CPU => None,
            cpu => Some(cpu),
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn release(&self, cpus: &Cpus) {
        if !self.holding(cpus) {
            panic!("release {}: not held by this cpu", self.name);
        }

        // SAFETY: 仍然持有锁
        unsafe { *self.location.get() = None };
        self.cpu.store(NO_CPU, Ordering::Relaxed);

        // 临界区内的写入必须在放锁之前对其他 CPU 可见
        fence(Ordering::SeqCst);
        self.locked.store(false, Ordering::Release);

        cpus.pop_off();
    }
}

/// 自旋锁守卫，drop 时释放锁并恢复中断状态
///
/// 守卫绑定在获取它的 CPU 上，不能跨线程传递。
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    cpus: &'a Cpus,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T> SpinLockGuard<'a, T> {
    /// 守卫对应的锁
    pub fn spinlock(&self) -> &'a SpinLock<T> {
        self.lock
    }

    /// 获取这把锁的调用位置
    pub fn locked_at(&self) -> &'static Location<'static> {
        // SAFETY: 守卫存在期间本 CPU 持有锁，location 一定已写入
        unsafe { (*self.lock.location.get()).unwrap_or_else(|| panic!("{}: no owner", self.lock.name)) }
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 守卫存在期间独占访问
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 同上
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release(self.cpus);
    }
}
