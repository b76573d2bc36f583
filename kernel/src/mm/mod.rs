//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内存管理接口
//!
//! 调度核心只关心两件事：
//! - 内核栈：每个进程一页，由 [`PageAllocator`] 提供
//! - 用户地址空间：只做大小记账，页表操作交给 [`AddressSpace`] 的实现者

use alloc::boxed::Box;

use crate::config::PAGE_SIZE;
use crate::errno::Errno;

/// 是否是页大小的整数倍
#[inline]
pub const fn is_page_aligned(sz: usize) -> bool {
    sz & (PAGE_SIZE - 1) == 0
}

/// 物理页分配器 (kalloc / kfree)
pub trait PageAllocator: Send + Sync {
    /// 分配一页，返回物理地址；内存耗尽时返回 `None`
    fn kalloc(&self) -> Option<usize>;

    fn kfree(&self, pa: usize);
}

/// 进程的内核栈
///
/// 只是一个物理页的句柄，释放必须交还给分配它的 [`PageAllocator`]。
#[derive(Debug, PartialEq, Eq)]
pub struct KernelStack {
    base: usize,
}

impl KernelStack {
    pub fn alloc(pages: &dyn PageAllocator) -> Option<Self> {
        pages.kalloc().map(|base| Self { base })
    }

    pub fn free(self, pages: &dyn PageAllocator) {
        pages.kfree(self.base);
    }
}

/// 用户地址空间
///
/// 释放整个地址空间 (freevm) 就是 drop。
pub trait AddressSpace: Send {
    /// 把地址空间从 `old_sz` 扩展到 `new_sz`，返回新的大小
    fn grow(&mut self, old_sz: usize, new_sz: usize) -> Result<usize, Errno>;

    /// 把地址空间从 `old_sz` 收缩到 `new_sz`，返回新的大小
    fn shrink(&mut self, old_sz: usize, new_sz: usize) -> usize;

    /// 复制前 `sz` 字节（fork 使用）
    fn duplicate(&self, sz: usize) -> Result<Box<dyn AddressSpace>, Errno>;

    /// 切换到这个地址空间 (switchuvm)
    fn activate(&self) {}
}
