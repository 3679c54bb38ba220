//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 进程号 / 线程号分配器
//!
//! 对应 xv6 的 allocpid()（kernel/proc.c）。xv6 用 pid_lock 保护
//! 一个裸计数器，这里直接用原子量承担同一件事；号码单调递增、
//! 永不复用。

use core::sync::atomic::{AtomicU32, Ordering};

/// 单调递增的号码发生器
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    pub const fn new(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// 取下一个号码
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// 偷看下一个将发出的号码，不消耗
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}
