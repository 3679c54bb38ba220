//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 标准错误代码定义
//!
//! 和 include/uapi/asm-generic/errno.h 保持同样的数值

/// 标准错误代码
///
/// 使用方法：
/// ```rust
/// use xvos::errno::{Errno, KResult};
///
/// fn lookup(pid: u32) -> KResult<()> {
///     Err(Errno::NoSuchProcess)
/// }
/// ```
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// Operation not permitted (EPERM, 1)
    OperationNotPermitted = 1,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// I/O error (EIO, 5)
    IOError = 5,

    /// No child process (ECHILD, 10)
    NoChild = 10,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    OutOfMemory = 12,

    /// Bad address (EFAULT, 14)
    BadAddress = 14,

    /// Device or resource busy (EBUSY, 16)
    Busy = 16,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,
}

impl Errno {
    /// 系统调用风格的负数返回值
    pub fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }
}

/// 内核内部统一的结果类型
pub type KResult<T> = Result<T, Errno>;
