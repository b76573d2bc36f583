//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 用户地址空间大小调整
//!
//! - `sbrk`: 立即扩展或收缩
//! - `resize`: 扩展立即生效；收缩只减小报告的大小，物理页在延迟到期后
//!   由时钟记账回收（见 [`crate::process::ProcTable`]）
//!
//! 物理上的地址空间大小始终是 `sz + dealloc.size`。

use log::debug;

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::mm::is_page_aligned;
use crate::process::{PendingDealloc, Proc};

/// 扩展 `n` 字节，先复用等待释放的页
fn grow(p: &mut Proc, n: usize) -> Result<(), Errno> {
    let phys = p.sz + p.dealloc.size;
    let new_sz = p.sz.checked_add(n).ok_or(Errno::OutOfMemory)?;

    if new_sz > phys {
        if let Some(vm) = p.vm.as_mut() {
            vm.grow(phys, new_sz)?;
        }
    }

    p.sz = new_sz;
    p.dealloc.size = phys.saturating_sub(new_sz);
    if !p.dealloc.is_pending() {
        p.dealloc = PendingDealloc::default();
    }
    Ok(())
}

impl Kernel {
    /// 调整当前进程的大小，返回调整前的大小
    pub fn sbrk(&self, n: isize) -> Result<usize, Errno> {
        let cur = self.current("sbrk");
        let mut table = self.ptable.lock(&self.cpus);
        let p = table.get_mut(cur);
        let old = p.sz;

        if n > 0 {
            grow(p, n as usize)?;
        } else if n < 0 {
            let m = n.unsigned_abs();
            if m > old {
                return Err(Errno::InvalidArgument);
            }
            // 等待中的延迟释放一并收回
            let phys = old + p.dealloc.size;
            let new_sz = old - m;
            p.sz = match p.vm.as_mut() {
                Some(vm) => vm.shrink(phys, new_sz),
                None => new_sz,
            };
            p.dealloc = PendingDealloc::default();
        }

        if let Some(vm) = p.vm.as_ref() {
            vm.activate();
        }
        Ok(old)
    }

    /// 延迟释放版本的 sbrk
    ///
    /// `delta` 必须是页大小的非零整数倍；收缩时 `delay` 必须为正。
    /// 连续的收缩累加待释放的大小，截止时间取较晚的一个。
    pub fn resize(&self, delta: isize, delay: isize) -> Result<usize, Errno> {
        if delta == 0 || !is_page_aligned(delta.unsigned_abs()) {
            return Err(Errno::InvalidArgument);
        }
        if delta < 0 && delay <= 0 {
            return Err(Errno::InvalidArgument);
        }

        let cur = self.current("resize");
        let mut table = self.ptable.lock(&self.cpus);
        let now = table.now();
        let p = table.get_mut(cur);
        let old = p.sz;

        if delta > 0 {
            grow(p, delta as usize)?;
            return Ok(old);
        }

        let m = delta.unsigned_abs();
        if m > old {
            return Err(Errno::InvalidArgument);
        }

        let mut deadline = now + delay as u64;
        if p.dealloc.is_pending() {
            deadline = deadline.max(p.dealloc.deadline());
        }
        p.dealloc = PendingDealloc {
            size: p.dealloc.size + m,
            delay: deadline - now,
            start: now,
        };
        p.sz = old - m;

        debug!(
            "pid {}: {} bytes pending until tick {}",
            p.pid, p.dealloc.size, deadline
        );
        Ok(old)
    }
}
