//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 协作式上下文切换原语
//!
//! 对应 xv6 的 swtch.S：保存/恢复被调用者寄存器，把控制权从一个
//! 内核执行流移交给另一个。宿主模型里没有寄存器可换，一个描述符的
//! "挂起的继续点"就是一个阻塞在门闩上的宿主线程，`Context` 便是
//! 那扇门：`resume` 放行对端，`suspend` 阻塞自己直到下一次移交。
//!
//! 不变式：
//! - 一个 Context 同一时刻至多有一个线程在 `suspend` 上等待；
//! - `swtch(old, new)` 是一次原子移交——先放行 new，再挂起 old，
//!   控制权只有在对端反向 swtch 时才回来。

use std::sync::{Condvar, Mutex};

/// 一个被挂起的内核执行流的保存上下文
///
/// 语义上等价 xv6 的 struct context（ra/sp/s0-s11），但表示为一个
/// 可阻塞的移交门。描述符每次分配都换新的 Context，槽位复用时
/// 旧执行流绝不会被误唤醒。
pub struct Context {
    resumed: Mutex<bool>,
    cond: Condvar,
}

impl Context {
    pub const fn new() -> Self {
        Self {
            resumed: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// 放行在此上下文上挂起的执行流
    ///
    /// 允许先 resume 后 suspend：门保持打开，随后的 suspend 立即返回。
    pub fn resume(&self) {
        let mut resumed = match self.resumed.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *resumed = true;
        self.cond.notify_one();
    }

    /// 挂起当前执行流，直到对端 resume
    pub fn suspend(&self) {
        let mut resumed = match self.resumed.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        while !*resumed {
            resumed = match self.cond.wait(resumed) {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        *resumed = false;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// 把控制权从 `old` 移交给 `new`
///
/// 对应 xv6 的 swtch(&old, &new)。调用者必须已经按协议放掉全部
/// 槽位锁（见 sched()），否则对端拿不到锁就是死锁。
pub fn swtch(old: &Context, new: &Context) {
    new.resume();
    old.suspend();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // 测试：移交门的基本往返
    #[test]
    fn handoff_round_trip() {
        let a = Arc::new(Context::new());
        let b = Arc::new(Context::new());
        let steps = Arc::new(AtomicUsize::new(0));

        let (a2, b2, s2) = (a.clone(), b.clone(), steps.clone());
        let peer = std::thread::spawn(move || {
            a2.suspend();
            s2.fetch_add(1, Ordering::SeqCst);
            swtch(&a2, &b2);
            s2.fetch_add(1, Ordering::SeqCst);
            b2.resume();
        });

        swtch(&b, &a); // 放行对端，挂起自己
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        swtch(&b, &a);
        peer.join().unwrap();
        assert_eq!(steps.load(Ordering::SeqCst), 2);
    }

    // 测试：先 resume 后 suspend 不丢移交
    #[test]
    fn resume_before_suspend() {
        let ctx = Context::new();
        ctx.resume();
        ctx.suspend(); // 门已开，立即返回
    }
}
