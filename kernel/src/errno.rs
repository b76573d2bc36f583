//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 标准错误代码定义
//!
//! 数值与 include/uapi/asm-generic/errno-base.h 保持一致，
//! 只保留进程与调度核心会返回的那一部分

/// 标准错误代码
///
/// 使用方法：
/// ```rust
/// use mlfq_kernel::errno::Errno;
///
/// fn check(n: isize) -> Result<(), Errno> {
///     if n == 0 {
///         return Err(Errno::InvalidArgument);
///     }
///     Ok(())
/// }
/// assert_eq!(check(0).unwrap_err().as_neg_i32(), -22);
/// ```
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// No child process (ECHILD, 10)
    NoChild = 10,

    /// Try again (EAGAIN, 11)
    ///
    /// 进程表已满
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    ///
    /// 内核栈分配失败，或者地址空间复制/扩展失败
    OutOfMemory = 12,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// Function not implemented (ENOSYS, 38)
    FunctionNotImplemented = 38,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于系统调用返回）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 写入 trap frame 返回寄存器的值
    #[inline]
    pub const fn as_isize(self) -> isize {
        -(self as i32) as isize
    }
}

/// 常用的错误代码常量
pub mod constants {
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const ECHILD: i32 = 10;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EINVAL: i32 = 22;
    pub const ENOSYS: i32 = 38;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_values() {
        assert_eq!(Errno::NoSuchProcess.as_i32(), constants::ESRCH);
        assert_eq!(Errno::NoChild.as_i32(), constants::ECHILD);
        assert_eq!(Errno::TryAgain.as_i32(), constants::EAGAIN);
        assert_eq!(Errno::OutOfMemory.as_i32(), constants::ENOMEM);
        assert_eq!(Errno::InvalidArgument.as_i32(), constants::EINVAL);
    }

    #[test]
    fn test_errno_negative() {
        assert_eq!(Errno::NoChild.as_neg_i32(), -10);
        assert_eq!(Errno::InvalidArgument.as_isize(), -22);
        assert_eq!(Errno::FunctionNotImplemented.as_isize(), -38);
    }
}
