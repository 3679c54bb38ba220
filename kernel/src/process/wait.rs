//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 任务终止：exit、wait、kill
//!
//! 对应 xv6 的 exit()/wait()/kill()/reparent()（kernel/proc.c）。
//! 父子链接全在 wait 锁名下，回收只发生在 wait 里：exit 把自己
//! 冻成 ZOMBIE 留给父亲收尸，孤儿先过继给 init。
//! kill 只立旗标，受害者在自己方便的地方（wait 循环、系统调用
//! 边界）观察旗标后自行退出。

use alloc::sync::Arc;

use crate::errno::{Errno, KResult};
use crate::sched::TaskExit;

use super::task::{ParentRef, Pid, Proc, ProcState};
use super::Kernel;

impl Kernel {
    /// 终止当前任务，永不返回
    ///
    /// 对应 exit(status)：关文件、放工作目录、孤儿过继给 init、
    /// 叫醒父亲，然后把自己标成 ZOMBIE 交还 CPU。描述符留在表里，
    /// 退出状态等父亲的 wait 来取。init 退出是致命错误。
    /// 交还 CPU 之后用回卷收掉宿主线程，僵尸不占线程。
    pub fn do_exit(self: &Arc<Self>, status: i32) -> ! {
        let p = match self.current() {
            Some(p) => p,
            None => panic!("exit: not a task"),
        };
        let init = self.initproc();
        let my_pid = p.inner.lock().pid;
        if init.slot == p.slot && init.pid == my_pid {
            panic!("init exiting");
        }
        let me = ParentRef {
            slot: p.slot,
            pid: my_pid,
        };

        // 关掉全部打开文件
        p.inner.lock().ofile.close_all();

        // 放掉工作目录引用，目录变更括在事务里
        self.fs.begin_op();
        p.inner.lock().cwd = None;
        self.fs.end_op();

        let mut links = self.wait_lock.lock();

        // 把孩子过继给 init，对应 reparent()；init 可能正睡在 wait 里
        for q in self.procs.iter() {
            if links.parent_of(q.slot) == Some(me) {
                links.set_parent(q.slot, Some(init));
                self.wakeup(self.procs[init.slot].chan());
            }
        }

        // 叫醒可能等在 wait 里的父亲
        if let Some(parent) = links.parent_of(p.slot) {
            self.wakeup(self.procs[parent.slot].chan());
        }

        // wait 锁在手，槽位锁在后，合序
        let mut inner = p.inner.lock();
        inner.xstate = status;
        inner.state = ProcState::Zombie;
        let cpu_id = match inner.run_cpu.take() {
            Some(id) => id,
            None => panic!("exit: no dispatching cpu"),
        };
        drop(links);
        drop(inner);

        log::debug!("exit: pid {} status {}", my_pid, status);
        // 状态已冻结、锁已放，父亲随时可以收尸。把控制权交还派发
        // 的 CPU，本执行流就此终结。
        self.cpus[cpu_id].context.resume();
        std::panic::panic_any(TaskExit);
    }

    /// 等一个孩子退出，回收它的槽位并返回其 pid
    ///
    /// 对应 wait(addr)：addr 非零时先把退出状态写到调用者地址空间
    /// 的 addr 处，写不进去就保留僵尸返回 EFAULT，父亲可换个地址
    /// 重试。没有孩子返回 ECHILD；睡等期间被 kill 返回 EINTR。
    pub fn do_wait(self: &Arc<Self>, addr: u64) -> KResult<Pid> {
        let p = self.current().ok_or(Errno::NoSuchProcess)?;
        // 自己的地址空间句柄先照下来，copyout 时不再碰自己的槽位锁
        let (my_pid, my_pt) = {
            let inner = p.inner.lock();
            (inner.pid, inner.pagetable.clone())
        };
        let me = ParentRef {
            slot: p.slot,
            pid: my_pid,
        };

        let mut links = self.wait_lock.lock();
        loop {
            let mut havekids = false;
            for q in self.procs.iter() {
                if links.parent_of(q.slot) != Some(me) {
                    continue;
                }
                havekids = true;

                let mut qinner = q.inner.lock();
                if qinner.state != ProcState::Zombie {
                    continue;
                }

                let child_pid = qinner.pid;
                if addr != 0 {
                    let pt = my_pt.as_ref().ok_or(Errno::BadAddress)?;
                    let bytes = qinner.xstate.to_le_bytes();
                    if pt.lock().copy_out(addr, &bytes).is_err() {
                        // 僵尸保留，父亲可以重试
                        return Err(Errno::BadAddress);
                    }
                }
                self.freeproc(&mut qinner);
                links.set_parent(q.slot, None);
                log::debug!("wait: pid {} reaped child {}", my_pid, child_pid);
                return Ok(child_pid);
            }

            if !havekids {
                return Err(Errno::NoChild);
            }
            if self.proc_killed(p) {
                return Err(Errno::InterruptedSystemCall);
            }

            // 睡在自己的频道上，孩子 exit 时会往这里喊
            links = self.sleep(p.chan(), &self.wait_lock, links);
        }
    }

    /// 给 pid 对应的任务立终止旗标
    ///
    /// 对应 kill(pid)：睡着的顺手标成 RUNNABLE，让它尽快跑到观察
    /// 旗标的地方。强杀不存在，受害者总是自己走 exit。
    pub fn do_kill(&self, pid: Pid) -> KResult<()> {
        for p in self.procs.iter() {
            let mut inner = p.inner.lock();
            if inner.state == ProcState::Unused || inner.pid != pid {
                continue;
            }
            inner.killed = true;
            if inner.state == ProcState::Sleeping {
                inner.state = ProcState::Runnable;
            }
            log::debug!("kill: pid {}", pid);
            return Ok(());
        }
        Err(Errno::NoSuchProcess)
    }

    pub(crate) fn proc_killed(&self, p: &Proc) -> bool {
        p.inner.lock().killed
    }

    /// 当前任务是否已被 kill（系统调用边界的协作检查点）
    pub fn current_killed(&self) -> bool {
        match self.current() {
            Some(p) => self.proc_killed(p),
            None => false,
        }
    }
}
