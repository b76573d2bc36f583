//! 文件系统协作接口
//!
//! 进程核心不实现文件系统，只持有文件和目录的不透明句柄：
//! - fork 时按引用复制（filedup / idup）
//! - exit 时关闭文件，并在事务 (begin_op / end_op) 中释放当前目录

/// 打开文件的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRef(pub u32);

/// inode 句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeRef(pub u32);

pub trait FileSystem: Send + Sync {
    /// 第一个进程第一次被调度时调用一次
    ///
    /// 日志恢复等初始化可能需要睡眠，只能在进程上下文里完成。
    fn init(&self) {}

    /// 开始一个文件系统事务
    fn begin_op(&self);

    /// 结束当前事务
    fn end_op(&self);

    /// 根目录
    fn root(&self) -> InodeRef;

    /// 增加 inode 引用
    fn idup(&self, ip: InodeRef) -> InodeRef;

    /// 释放 inode 引用，必须在事务内调用
    fn iput(&self, ip: InodeRef);

    /// 增加文件引用
    fn filedup(&self, f: FileRef) -> FileRef;

    fn fileclose(&self, f: FileRef);
}
