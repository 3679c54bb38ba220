//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! CPU 调度
//!
//! 每颗 CPU 核由一个宿主线程扮演，跑 `scheduler` 的挑选循环；
//! 每个任务的内核态计算也是一个宿主线程，平时挂在自己的
//! `Context` 门上。swtch 在两个门之间移交控制权，保证一颗核
//! 同一时刻只有一个执行流在动。
//!
//! 对应 xv6 的 scheduler() / sched() / yield() / forkret()
//! （kernel/proc.c）。

pub mod context;
pub mod policy;
pub mod rand;

use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::Ordering;
use std::thread;

use crate::config::NCPU;
use crate::cpu::{self, NO_PROC};
use crate::process::{Kernel, ProcInner, ProcState};

use context::swtch;

/// exit 结束宿主线程用的回卷载荷
///
/// 真内核的 exit 走 swtch 后执行流就没了；宿主模型里线程还在，
/// 用带这个载荷的回卷把它收掉。panic 钩子与任务线程顶层的兜底
/// 都认得它，不当成崩溃。
pub(crate) struct TaskExit;

/// 给进程全局的 panic 钩子套一层过滤，正常退场的回卷不打日志
pub(crate) fn install_exit_hook() {
    static HOOK: std::sync::Once = std::sync::Once::new();
    HOOK.call_once(|| {
        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<TaskExit>().is_none() {
                prev(info);
            }
        }));
    });
}

impl Kernel {
    /// 一颗 CPU 核的调度循环
    ///
    /// 问策略要下一个 RUNNABLE 任务，标成 RUNNING 后把控制权移交
    /// 过去，任务让位时从 swtch 回来接着挑。没人可跑就空转一拍。
    pub fn scheduler(self: &Arc<Self>, cpu_id: usize) {
        cpu::set_cpu_id(cpu_id);
        let cpu = &self.cpus[cpu_id];
        log::debug!("scheduler: cpu {} online", cpu_id);

        while !self.shutdown.load(Ordering::Acquire) {
            // 每圈开一次中断，免得饿死设备
            cpu.intr_on();

            match self.policy.select(&self.procs) {
                Some((slot, mut inner)) => {
                    inner.state = ProcState::Running;
                    inner.run_cpu = Some(cpu_id);
                    cpu.proc.store(slot, Ordering::Release);
                    let ctx = inner.ctx.clone();

                    // 状态已在锁内定好，先放锁再移交；移交门允许先
                    // resume 后 suspend，早到的唤醒不会丢
                    drop(inner);
                    cpu.push_off();
                    swtch(&cpu.context, &ctx);
                    cpu.pop_off();

                    // 任务已让位（RUNNABLE / SLEEPING / ZOMBIE 之一）
                    cpu.proc.store(NO_PROC, Ordering::Release);
                }
                None => cpu::relax(),
            }
        }
        log::debug!("scheduler: cpu {} offline", cpu_id);
    }

    /// 拉起 ncpu 个调度线程
    pub fn boot(self: &Arc<Self>, ncpu: usize) -> Vec<thread::JoinHandle<()>> {
        if ncpu == 0 || ncpu > NCPU {
            panic!("boot: bad ncpu {}", ncpu);
        }
        (0..ncpu)
            .map(|id| {
                let kernel = self.clone();
                thread::Builder::new()
                    .name(format!("cpu{}", id))
                    .spawn(move || kernel.scheduler(id))
                    .expect("boot: spawn scheduler")
            })
            .collect()
    }

    /// 请求全部调度循环退出
    ///
    /// 只对空转中的核生效；还有任务在跑的核会在任务让位后看到旗标。
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// 把控制权交还给派发本任务的 CPU
    ///
    /// 对应 sched()（kernel/proc.c）：调用者持有自己的槽位锁，且已把
    /// 状态改离 RUNNING。锁在移交前放掉——对端要用它；状态已定，
    /// 提前到达的重新调度只会撞上已开的门，不会乱序。
    pub(crate) fn sched(&self, mut inner: spin::MutexGuard<'_, ProcInner>) {
        if inner.state == ProcState::Running {
            panic!("sched running");
        }
        let ctx = inner.ctx.clone();
        let cpu_id = match inner.run_cpu.take() {
            Some(id) => id,
            None => panic!("sched: no dispatching cpu"),
        };
        drop(inner);
        swtch(&ctx, &self.cpus[cpu_id].context);
    }

    /// 主动让出 CPU，对应 yield()
    pub fn yield_cpu(&self) {
        let p = match self.current() {
            Some(p) => p,
            None => return,
        };
        let mut inner = p.inner.lock();
        inner.state = ProcState::Runnable;
        self.sched(inner);
    }

    /// 给描述符配一个任务线程，挂在它的移交门上等第一次调度
    ///
    /// 调用者持有槽位锁。线程被首次调度后走 task_entry。
    pub(crate) fn spawn_task(self: &Arc<Self>, slot: usize, inner: &mut ProcInner) {
        let kernel = self.clone();
        let ctx = inner.ctx.clone();
        thread::Builder::new()
            .name(format!("task-pid{}", inner.pid))
            .spawn(move || {
                cpu::set_current_slot(Some(slot));
                ctx.suspend();
                // exit 用回卷终结执行流，在这里落地，线程随之消亡
                let _ = std::panic::catch_unwind(core::panic::AssertUnwindSafe(|| {
                    kernel.task_entry(slot)
                }));
            })
            .expect("spawn_task");
        inner.started = true;
    }

    /// 任务第一次被调度后的落点，对应 forkret()
    ///
    /// 首个任务到达用户态前完成文件系统挂载；运行体返回视同
    /// exit(0)，运行体倒在断言上则视同 exit(-1)，不挂死调度器。
    /// 运行体内部走完 exit 的，回卷到这里直接收尾。
    fn task_entry(self: &Arc<Self>, slot: usize) {
        self.fs.ensure_init();

        let entry = self.procs[slot].inner.lock().entry.take();
        let status = match entry {
            Some(body) => {
                match std::panic::catch_unwind(core::panic::AssertUnwindSafe(|| body(self))) {
                    Ok(()) => 0,
                    Err(payload) => {
                        if payload.downcast_ref::<TaskExit>().is_some() {
                            return;
                        }
                        log::error!("task at slot {} panicked", slot);
                        -1
                    }
                }
            }
            None => 0,
        };
        self.do_exit(status);
    }
}
