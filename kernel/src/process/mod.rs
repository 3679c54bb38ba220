//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 进程管理
//!
//! 进程表、描述符分配/回收、首个任务的搭建，以及诊断出口。
//! 生命周期操作（fork/clone/exit/wait/kill）在同目录的 fork.rs
//! 和 wait.rs 里。
//!
//! 锁序（全内核只有这一条）：wait 锁在先，槽位锁在后；
//! 槽位锁之间绝不嵌套。

pub mod fork;
pub mod pid;
pub mod task;
pub mod wait;

pub use task::{ParentLinks, ParentRef, Pid, Proc, ProcInner, ProcState, TaskFn, Tid, TrapFrame};

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::array;
use core::fmt::Write as _;
use core::sync::atomic::AtomicBool;

use crate::config::{
    BASE_TICKETS, DEFAULT_STRIDE, KERNEL_NAME, KERNEL_VERSION, MAXVA, NCPU, NPROC, PGSIZE,
    TICKET_MAX, TRAMPOLINE, TRAPFRAME,
};
use crate::cpu::{self, Cpu};
use crate::errno::{Errno, KResult};
use crate::fs::Fs;
use crate::mm::{AddrSpace, AddressSpace, PteFlags};
use crate::sched::context::Context;
use crate::sched::policy::{make_policy, PolicyKind, SchedPolicy};

use pid::IdAllocator;

/// 首个用户程序的机器码（exec("/init") 的那一小段引导码）
///
/// 对应 xv6 的 initcode（kernel/proc.c），由 user/initcode.S 汇编而来
const INITCODE: [u8; 52] = [
    0x17, 0x05, 0x00, 0x00, 0x13, 0x05, 0x45, 0x02, 0x97, 0x05, 0x00, 0x00, 0x93, 0x85, 0x35,
    0x02, 0x93, 0x08, 0x70, 0x00, 0x73, 0x00, 0x00, 0x00, 0x93, 0x08, 0x20, 0x00, 0x73, 0x00,
    0x00, 0x00, 0xef, 0xf0, 0x9f, 0xff, 0x2f, 0x69, 0x6e, 0x69, 0x74, 0x00, 0x00, 0x24, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// 一个任务的调度记账快照，诊断出口用
#[derive(Debug, Clone)]
pub struct SchedStat {
    pub pid: Pid,
    pub name: String,
    pub state: ProcState,
    pub tickets: u32,
    pub pass: u64,
    pub ticks: u64,
}

/// 内核实例
///
/// 对应 xv6 把进程表、cpus[]、wait_lock 摊在全局变量里的做法；
/// 收进一个实例后并行跑多个内核互不干扰（测试依赖这一点）。
pub struct Kernel {
    /// 进程表，槽位下标即身份
    pub(crate) procs: [Proc; NPROC],

    /// 每 CPU 状态
    pub(crate) cpus: [Cpu; NCPU],

    /// 父子关系表，锁序里排在所有槽位锁之前
    pub(crate) wait_lock: spin::Mutex<ParentLinks>,

    /// 进程号发生器
    pid_alloc: IdAllocator,

    /// 线程号发生器
    tid_alloc: IdAllocator,

    /// 启动时选定的调度策略，此后不再更换
    pub(crate) policy: Box<dyn SchedPolicy>,

    /// 文件系统协作者
    pub(crate) fs: Fs,

    /// 首个任务的弱引用，孤儿统一过继给它
    initproc: spin::Once<ParentRef>,

    /// 调度循环的退出旗标
    pub(crate) shutdown: AtomicBool,
}

impl Kernel {
    /// 建一个空内核实例
    ///
    /// 对应 xv6 的 procinit()：进程表全 UNUSED，内核栈地址静态排好。
    pub fn new(policy: PolicyKind) -> Arc<Self> {
        crate::sched::install_exit_hook();
        let kernel = Arc::new(Self {
            procs: array::from_fn(Proc::new),
            cpus: array::from_fn(Cpu::new),
            wait_lock: spin::Mutex::new(ParentLinks::new()),
            pid_alloc: IdAllocator::new(1),
            tid_alloc: IdAllocator::new(1),
            policy: make_policy(policy),
            fs: Fs::new(),
            initproc: spin::Once::new(),
            shutdown: AtomicBool::new(false),
        });
        log::info!(
            "{} {}: sched policy = {}",
            KERNEL_NAME,
            KERNEL_VERSION,
            kernel.policy.name()
        );
        kernel
    }

    /// 当前策略名（诊断用）
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// 首个任务的弱引用
    ///
    /// userinit 之前调用是协议错误。
    pub(crate) fn initproc(&self) -> ParentRef {
        match self.initproc.get() {
            Some(r) => *r,
            None => panic!("initproc: before userinit"),
        }
    }

    /// 本线程绑定的描述符，对应 myproc()
    pub(crate) fn current(&self) -> Option<&Proc> {
        cpu::current_slot().map(|slot| &self.procs[slot])
    }

    /// 下一个线程号的预读，clone 用它在占槽位之前做天花板检查
    pub(crate) fn next_tid_hint(&self) -> Tid {
        self.tid_alloc.peek()
    }

    /// 建一张新进程页表：空表加 trampoline / trapframe 两页固定映射
    ///
    /// 对应 proc_pagetable()（kernel/proc.c）
    fn proc_pagetable(&self) -> KResult<AddrSpace> {
        let mut vm = AddressSpace::new();
        vm.map_page(TRAMPOLINE, PteFlags::R | PteFlags::X)?;
        vm.map_page(TRAPFRAME, PteFlags::R | PteFlags::W)?;
        Ok(Arc::new(spin::Mutex::new(vm)))
    }

    /// 找一个 UNUSED 槽位并初始化为 USED，返回持锁的描述符
    ///
    /// 对应 allocproc()（kernel/proc.c）。线程（is_thread）另发线程号
    /// 且不建页表——地址空间由 do_clone 共享进来。表满返回 None。
    pub(crate) fn allocproc(
        &self,
        is_thread: bool,
    ) -> Option<(usize, spin::MutexGuard<'_, ProcInner>)> {
        for p in self.procs.iter() {
            let mut inner = p.inner.lock();
            if inner.state != ProcState::Unused {
                continue;
            }

            inner.pid = self.pid_alloc.next();
            inner.tid = if is_thread { self.tid_alloc.next() } else { 0 };
            inner.state = ProcState::Used;
            inner.killed = false;
            inner.xstate = 0;
            inner.chan = 0;
            inner.sz = 0;

            // 比例份额记账的缺省值
            inner.tickets = BASE_TICKETS;
            inner.stride = DEFAULT_STRIDE;
            inner.pass = 0;
            inner.ticks = 0;

            // 新的继续点，槽位复用不会串到上一代的执行流
            inner.ctx = Arc::new(Context::new());
            inner.run_cpu = None;
            inner.started = false;
            inner.entry = None;

            inner.trapframe = Some(Box::new(TrapFrame::default()));
            if !is_thread {
                match self.proc_pagetable() {
                    Ok(pt) => inner.pagetable = Some(pt),
                    Err(_) => {
                        self.freeproc(&mut inner);
                        return None;
                    }
                }
            }

            return Some((p.slot, inner));
        }
        None
    }

    /// 把描述符抹回 UNUSED，释放执行环境
    ///
    /// 对应 freeproc()（kernel/proc.c）。调用者必须持有槽位锁。
    /// 线程只解除自己那页 trapframe 的映射，共享地址空间不动；
    /// 进程拆掉整个地址空间。
    pub(crate) fn freeproc(&self, inner: &mut ProcInner) {
        inner.trapframe = None;
        if let Some(pt) = inner.pagetable.take() {
            let mut vm = pt.lock();
            if inner.tid != 0 {
                if vm.unmap_page(TRAPFRAME - PGSIZE * inner.tid as u64).is_err() {
                    panic!("freeproc: thread trapframe not mapped");
                }
            } else {
                if vm.unmap_page(TRAMPOLINE).is_err() || vm.unmap_page(TRAPFRAME).is_err() {
                    panic!("freeproc: fixed pages not mapped");
                }
                vm.uvm_free();
            }
        }
        inner.ofile.close_all();
        inner.cwd = None;
        inner.sz = 0;
        inner.pid = 0;
        inner.tid = 0;
        inner.name.clear();
        inner.chan = 0;
        inner.killed = false;
        inner.xstate = 0;
        inner.tickets = 0;
        inner.stride = 0;
        inner.pass = 0;
        inner.ticks = 0;
        inner.entry = None;
        inner.started = false;
        inner.run_cpu = None;
        inner.state = ProcState::Unused;
    }

    /// 搭建首个用户任务
    ///
    /// 对应 userinit()（kernel/proc.c）：装入 initcode、一页数据段、
    /// 起始 epc/sp、名字与工作目录，然后置 RUNNABLE 等第一次调度。
    /// `entry` 是它被调度后执行的内核态计算。
    pub fn userinit(self: &Arc<Self>, entry: TaskFn) -> Pid {
        let (slot, mut inner) = match self.allocproc(false) {
            Some(x) => x,
            None => panic!("userinit: no free proc"),
        };
        let first = ParentRef {
            slot,
            pid: inner.pid,
        };
        self.initproc.call_once(|| first);

        if let Some(pt) = &inner.pagetable {
            pt.lock().uvm_first(&INITCODE);
        }
        inner.sz = PGSIZE;
        if let Some(tf) = inner.trapframe.as_mut() {
            tf.epc = 0;
            tf.sp = PGSIZE;
        }
        inner.name = "initcode".to_string();
        inner.cwd = Some(self.fs.namei("/"));
        inner.entry = Some(entry);

        let pid = inner.pid;
        self.spawn_task(slot, &mut inner);
        inner.state = ProcState::Runnable;
        log::debug!("userinit: pid {} at slot {}", pid, slot);
        pid
    }

    /// 当前进程的数据段增长 / 收缩 n 字节
    ///
    /// 对应 growproc()（kernel/proc.c）
    pub fn grow_proc(&self, n: i64) -> KResult<()> {
        let p = self.current().ok_or(Errno::NoSuchProcess)?;
        let mut inner = p.inner.lock();
        let pt = inner.pagetable.clone().ok_or(Errno::BadAddress)?;
        let mut sz = inner.sz;
        if n > 0 {
            // 溢出与越过地址空间上界都按内存不足拒绝
            let newsz = sz
                .checked_add(n as u64)
                .filter(|&v| v <= MAXVA)
                .ok_or(Errno::OutOfMemory)?;
            sz = pt
                .lock()
                .uvm_alloc(sz, newsz, PteFlags::W)
                .map_err(|_| Errno::OutOfMemory)?;
        } else if n < 0 {
            sz = pt.lock().uvm_dealloc(sz, sz.saturating_sub(n.unsigned_abs()));
        }
        inner.sz = sz;
        Ok(())
    }

    /// 重设当前任务的票数，联动步长与 pass
    ///
    /// 对应原始实现的 set_sched_tickets：stride = BASE_TICKETS / tickets，
    /// pass 重置为一个 stride。0 票会除零、超上限都拒绝，且不动任何字段。
    pub fn set_sched_tickets(&self, tickets: u32) -> KResult<()> {
        if tickets == 0 || tickets > TICKET_MAX {
            return Err(Errno::InvalidArgument);
        }
        let p = self.current().ok_or(Errno::NoSuchProcess)?;
        let mut inner = p.inner.lock();
        inner.tickets = tickets;
        inner.stride = (BASE_TICKETS / tickets) as u64;
        inner.pass = inner.stride;
        Ok(())
    }

    /// 把内核字节写进当前任务地址空间的 dstva 处
    ///
    /// 对应 either_copyout() 走用户目的地的那条路（kernel/proc.c），
    /// 系统调用层靠它把结果交回用户态
    pub fn copy_out_user(&self, dstva: u64, src: &[u8]) -> KResult<()> {
        let p = self.current().ok_or(Errno::NoSuchProcess)?;
        let pt = p.inner.lock().pagetable.clone().ok_or(Errno::BadAddress)?;
        let mut vm = pt.lock();
        vm.copy_out(dstva, src)
    }

    /// 从当前任务地址空间的 srcva 处读字节进内核缓冲
    ///
    /// 对应 either_copyin() 走用户来源的那条路
    pub fn copy_in_user(&self, srcva: u64, dst: &mut [u8]) -> KResult<()> {
        let p = self.current().ok_or(Errno::NoSuchProcess)?;
        let pt = p.inner.lock().pagetable.clone().ok_or(Errno::BadAddress)?;
        let vm = pt.lock();
        vm.copy_in(srcva, dst)
    }

    /// pid 对应任务的当前状态（诊断/测试用）
    pub fn state_of(&self, pid: Pid) -> Option<ProcState> {
        for p in self.procs.iter() {
            let inner = p.inner.lock();
            if inner.state != ProcState::Unused && inner.pid == pid {
                return Some(inner.state);
            }
        }
        None
    }

    /// 进程表一览，每个占用槽位一行
    ///
    /// 对应 procdump()（kernel/proc.c，^P 触发）。只用 try_lock，
    /// 卡死的内核也敢转储；拿不到锁的槽位打个问号。
    pub fn proc_dump(&self) -> String {
        let mut out = String::new();
        for p in self.procs.iter() {
            match p.inner.try_lock() {
                Some(inner) => {
                    if inner.state == ProcState::Unused {
                        continue;
                    }
                    let _ = writeln!(
                        out,
                        "{} {} {} tid={}",
                        inner.pid,
                        inner.state.as_str(),
                        inner.name,
                        inner.tid
                    );
                }
                None => {
                    let _ = writeln!(out, "slot {} ?", p.slot);
                }
            }
        }
        out
    }

    /// 全表调度记账快照
    ///
    /// 对应原始实现的 print_sched_statistics
    pub fn sched_statistics(&self) -> Vec<SchedStat> {
        let mut stats = Vec::new();
        for p in self.procs.iter() {
            let inner = p.inner.lock();
            if inner.state == ProcState::Unused {
                continue;
            }
            stats.push(SchedStat {
                pid: inner.pid,
                name: inner.name.clone(),
                state: inner.state,
                tickets: inner.tickets,
                pass: inner.pass,
                ticks: inner.ticks,
            });
        }
        stats
    }

    /// 把调度记账打到日志
    pub fn print_sched_statistics(&self) {
        for s in self.sched_statistics() {
            log::info!(
                "sched: pid {} ({}) tickets {} pass {} ticks {}",
                s.pid,
                s.name,
                s.tickets,
                s.pass,
                s.ticks
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 测试：新分配描述符的缺省记账
    #[test]
    fn allocproc_defaults() {
        let kernel = Kernel::new(PolicyKind::RoundRobin);
        let (slot, inner) = kernel.allocproc(false).unwrap();
        assert_eq!(inner.pid, 1);
        assert_eq!(inner.tid, 0);
        assert_eq!(inner.state, ProcState::Used);
        assert_eq!(inner.tickets, BASE_TICKETS);
        assert_eq!(inner.stride, DEFAULT_STRIDE);
        assert_eq!(inner.pass, 0);
        assert_eq!(inner.ticks, 0);
        assert!(inner.trapframe.is_some());

        let pt = inner.pagetable.clone().unwrap();
        let vm = pt.lock();
        assert!(vm.mapped(TRAMPOLINE));
        assert!(vm.mapped(TRAPFRAME));
        drop(vm);
        drop(inner);
        assert_eq!(kernel.procs[slot].slot, slot);
    }

    // 测试：表满后分配失败；回收一个槽位即可再分配，且 pid 不复用
    #[test]
    fn table_exhaustion_and_reuse() {
        let kernel = Kernel::new(PolicyKind::RoundRobin);
        let mut slots = Vec::new();
        for _ in 0..NPROC {
            let (slot, inner) = kernel.allocproc(true).unwrap();
            slots.push(slot);
            drop(inner);
        }
        assert!(kernel.allocproc(true).is_none());

        let victim = slots[3];
        {
            let mut inner = kernel.procs[victim].inner.lock();
            kernel.freeproc(&mut inner);
            assert_eq!(inner.state, ProcState::Unused);
            assert_eq!(inner.pid, 0);
        }

        let (slot, inner) = kernel.allocproc(true).unwrap();
        assert_eq!(slot, victim);
        assert_eq!(inner.pid, NPROC as u32 + 1);
    }

    // 测试：用户态拷贝两个方向都走得通，无 U 位的页拒绝
    #[test]
    fn user_copy_roundtrip() {
        let kernel = Kernel::new(PolicyKind::RoundRobin);
        let (slot, mut inner) = kernel.allocproc(false).unwrap();
        if let Some(pt) = &inner.pagetable {
            pt.lock().uvm_alloc(0, PGSIZE, PteFlags::W).unwrap();
        }
        inner.sz = PGSIZE;
        drop(inner);
        cpu::set_current_slot(Some(slot));

        kernel.copy_out_user(4, b"data").unwrap();
        let mut buf = [0u8; 4];
        kernel.copy_in_user(4, &mut buf).unwrap();
        assert_eq!(&buf, b"data");

        // trampoline 页没有 U 位
        assert_eq!(
            kernel.copy_out_user(TRAMPOLINE, b"x"),
            Err(Errno::BadAddress)
        );
        cpu::set_current_slot(None);
    }

    // 测试：growproc 的两端极值，超界拒绝、收缩到底不翻车
    #[test]
    fn grow_proc_extremes() {
        let kernel = Kernel::new(PolicyKind::RoundRobin);
        let (slot, mut inner) = kernel.allocproc(false).unwrap();
        if let Some(pt) = &inner.pagetable {
            pt.lock().uvm_alloc(0, PGSIZE, PteFlags::W).unwrap();
        }
        inner.sz = PGSIZE;
        drop(inner);
        cpu::set_current_slot(Some(slot));

        assert_eq!(kernel.grow_proc(i64::MAX), Err(Errno::OutOfMemory));
        {
            let inner = kernel.procs[slot].inner.lock();
            assert_eq!(inner.sz, PGSIZE);
        }

        kernel.grow_proc(i64::MIN).unwrap();
        {
            let inner = kernel.procs[slot].inner.lock();
            assert_eq!(inner.sz, 0);
        }
        cpu::set_current_slot(None);
    }

    // 测试：票数重设联动步长与 pass；非法票数整体拒绝且不动字段
    #[test]
    fn tickets_update_and_rejection() {
        let kernel = Kernel::new(PolicyKind::Stride);
        let (slot, inner) = kernel.allocproc(false).unwrap();
        drop(inner);
        cpu::set_current_slot(Some(slot));

        kernel.set_sched_tickets(4).unwrap();
        {
            let inner = kernel.procs[slot].inner.lock();
            assert_eq!(inner.tickets, 4);
            assert_eq!(inner.stride, (BASE_TICKETS / 4) as u64);
            assert_eq!(inner.pass, inner.stride);
        }

        assert_eq!(kernel.set_sched_tickets(0), Err(Errno::InvalidArgument));
        assert_eq!(
            kernel.set_sched_tickets(TICKET_MAX + 1),
            Err(Errno::InvalidArgument)
        );
        {
            let inner = kernel.procs[slot].inner.lock();
            assert_eq!(inner.tickets, 4);
        }
        cpu::set_current_slot(None);
    }
}
