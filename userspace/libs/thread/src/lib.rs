//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 用户态自旋锁
//!
//! 对应课程 user/thread.c 里的 lock_init/lock_acquire/lock_release：
//! test-and-set 自旋到拿到为止，临界区前后各一道全序栅栏。
//! 没有排队、没有让位，纯忙等——配合 clone 出来的线程使用。

use core::sync::atomic::{fence, AtomicU32, Ordering};

/// 忙等自旋锁
pub struct Lock {
    locked: AtomicU32,
}

impl Lock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicU32::new(0),
        }
    }

    /// 自旋直到拿到锁
    pub fn acquire(&self) {
        while self.locked.swap(1, Ordering::Relaxed) != 0 {
            core::hint::spin_loop();
        }
        // 临界区的读写不得越过拿锁点
        fence(Ordering::SeqCst);
    }

    /// 放锁
    pub fn release(&self) {
        // 临界区的读写先落地再放行别人
        fence(Ordering::SeqCst);
        self.locked.store(0, Ordering::Relaxed);
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}
