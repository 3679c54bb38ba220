//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 睡眠与唤醒
//!
//! 对应 xv6 的 sleep()/wakeup()（kernel/proc.c）。频道就是一个
//! usize，按值相等匹配；谁都可以往一个频道上喊，睡在别的频道的
//! 任务充耳不闻。
//!
//! 无丢失唤醒的论证：sleep 先拿自己的槽位锁、再放条件锁。唤醒方
//! 想标我 RUNNABLE 必须拿到我的槽位锁，而那要等我把频道和
//! SLEEPING 都写完、进了 sched 才放得出去；彼时唤醒照常生效——
//! 移交门允许先 resume 后 suspend，早到的重新调度不会丢。

use crate::cpu;
use crate::process::{Kernel, ProcState};

impl Kernel {
    /// 原子地放掉 `guard`、睡到 `chan` 上，醒来后重新拿回条件锁
    ///
    /// 对应 sleep(chan, lk)。调用者用条件锁保护"要等的事"，锁序
    /// 要求条件锁排在槽位锁之前（wait 锁正是这样用的）。
    pub fn sleep<'a, T>(
        &self,
        chan: usize,
        lock: &'a spin::Mutex<T>,
        guard: spin::MutexGuard<'a, T>,
    ) -> spin::MutexGuard<'a, T> {
        let p = match self.current() {
            Some(p) => p,
            None => panic!("sleep: not a task"),
        };

        // 先拿自己的槽位锁再放条件锁，唤醒方此刻还碰不到我们的状态
        let mut inner = p.inner.lock();
        drop(guard);

        inner.chan = chan;
        inner.state = ProcState::Sleeping;
        self.sched(inner);

        // 醒了，清频道
        p.inner.lock().chan = 0;

        lock.lock()
    }

    /// 叫醒所有睡在 `chan` 上的任务
    ///
    /// 对应 wakeup(chan)：标成 RUNNABLE，什么时候真跑由调度策略定。
    /// 跳过自己——调用方不可能同时睡在那个频道上。
    pub fn wakeup(&self, chan: usize) {
        let me = cpu::current_slot();
        for p in self.procs.iter() {
            if Some(p.slot) == me {
                continue;
            }
            let mut inner = p.inner.lock();
            if inner.state == ProcState::Sleeping && inner.chan == chan {
                inner.state = ProcState::Runnable;
            }
        }
    }
}
