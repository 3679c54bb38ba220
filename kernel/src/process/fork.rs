//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 任务创建：fork 与 clone
//!
//! 对应 xv6 的 fork() 和课程加的 clone()（kernel/proc.c）。
//! 两者共用一套流程：照父快照、占槽位、搭执行环境、挂父链接、
//! 置 RUNNABLE；区别只在地址空间是复制还是共享。
//!
//! 快照在父自己的槽位锁下照，子槽位锁稍后才拿，槽位锁之间不嵌套。

use alloc::string::String;
use alloc::sync::Arc;

use crate::config::{NTHREAD_MAX, PGSIZE, TRAPFRAME};
use crate::errno::{Errno, KResult};
use crate::fs::FdTable;
use crate::mm::{AddrSpace, PteFlags};

use super::task::{ParentRef, Pid, ProcState, TaskFn, Tid, TrapFrame};
use super::Kernel;

/// 创建子任务时从父描述符照下的快照
struct ParentSnapshot {
    sz: u64,
    trapframe: TrapFrame,
    pagetable: Option<AddrSpace>,
    ofile: FdTable,
    cwd: Option<Arc<crate::fs::Inode>>,
    name: String,
    me: ParentRef,
}

impl Kernel {
    fn snapshot_current(&self) -> KResult<ParentSnapshot> {
        let p = self.current().ok_or(Errno::NoSuchProcess)?;
        let inner = p.inner.lock();
        Ok(ParentSnapshot {
            sz: inner.sz,
            trapframe: inner.trapframe.as_deref().copied().unwrap_or_default(),
            pagetable: inner.pagetable.clone(),
            ofile: inner.ofile.dup_all(),
            cwd: inner.cwd.clone(),
            name: inner.name.clone(),
            me: ParentRef {
                slot: p.slot,
                pid: inner.pid,
            },
        })
    }

    /// 把新任务挂到父名下并置 RUNNABLE
    ///
    /// 父链接在 wait 锁名下，所以先放子槽位锁、拿 wait 锁挂链接，
    /// 再回头拿子槽位锁开闸——和 xv6 fork 尾部的锁舞步一致。
    fn commit_child(self: &Arc<Self>, slot: usize, me: ParentRef) {
        {
            let mut links = self.wait_lock.lock();
            links.set_parent(slot, Some(me));
        }
        let mut inner = self.procs[slot].inner.lock();
        self.spawn_task(slot, &mut inner);
        inner.state = ProcState::Runnable;
    }

    /// 创建子进程：复制地址空间、打开文件表与工作目录
    ///
    /// 对应 fork()。子进程观察到返回值 0（trapframe 的 a0 清零），
    /// 父进程拿到子 pid。`entry` 是子进程被调度后的运行体。
    pub fn do_fork(self: &Arc<Self>, entry: TaskFn) -> KResult<Pid> {
        let snap = self.snapshot_current()?;

        let (slot, mut inner) = self.allocproc(false).ok_or(Errno::TryAgain)?;

        // 把父的数据段整个拷给子
        if let (Some(src), Some(dst)) = (&snap.pagetable, &inner.pagetable) {
            let src_vm = src.lock();
            let mut dst_vm = dst.lock();
            if src_vm.uvm_copy(&mut dst_vm, snap.sz).is_err() {
                drop(src_vm);
                drop(dst_vm);
                self.freeproc(&mut inner);
                return Err(Errno::OutOfMemory);
            }
        }
        inner.sz = snap.sz;

        if let Some(tf) = inner.trapframe.as_mut() {
            **tf = snap.trapframe;
            tf.a0 = 0; // 子进程从 fork 返回 0
        }
        inner.ofile = snap.ofile;
        inner.cwd = snap.cwd;
        inner.name = snap.name;
        inner.entry = Some(entry);
        let pid = inner.pid;
        drop(inner);

        self.commit_child(slot, snap.me);
        log::debug!("fork: pid {} -> child pid {}", snap.me.pid, pid);
        Ok(pid)
    }

    /// 创建线程：与调用者共享地址空间，用户供一页栈
    ///
    /// 对应课程里的 clone(stack)。线程号有全局天花板，占不到号就
    /// 直接拒绝，不先占槽位再反悔。线程自己的 trapframe 页映射在
    /// 共享空间的 TRAPFRAME - PGSIZE * tid 处。
    pub fn do_clone(self: &Arc<Self>, stack: u64, entry: TaskFn) -> KResult<Tid> {
        if stack == 0 || stack % PGSIZE != 0 {
            return Err(Errno::InvalidArgument);
        }
        if self.next_tid_hint() > NTHREAD_MAX {
            return Err(Errno::InvalidArgument);
        }

        let snap = self.snapshot_current()?;
        let shared = snap.pagetable.clone().ok_or(Errno::BadAddress)?;

        let (slot, mut inner) = self.allocproc(true).ok_or(Errno::TryAgain)?;
        let tid = inner.tid;

        let tf_va = TRAPFRAME - PGSIZE * tid as u64;
        if shared
            .lock()
            .map_page(tf_va, PteFlags::R | PteFlags::W)
            .is_err()
        {
            self.freeproc(&mut inner);
            return Err(Errno::OutOfMemory);
        }
        inner.pagetable = Some(shared);
        inner.sz = snap.sz;

        if let Some(tf) = inner.trapframe.as_mut() {
            **tf = snap.trapframe;
            tf.a0 = 0;
            tf.sp = stack + PGSIZE; // 一页用户栈，栈顶在高端
        }
        inner.ofile = snap.ofile;
        inner.cwd = snap.cwd;
        inner.name = snap.name;
        inner.entry = Some(entry);
        drop(inner);

        self.commit_child(slot, snap.me);
        log::debug!("clone: pid {} -> tid {}", snap.me.pid, tid);
        Ok(tid)
    }
}
