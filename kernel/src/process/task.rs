//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 进程描述符（进程控制块）
//!
//! 对应 xv6 的 struct proc（kernel/proc.h）。一个描述符占进程表的
//! 一个槽位；槽位锁连同生命周期状态完全决定它能否被调度、睡眠或
//! 回收。父子关系不放在这里——那是全局 wait 锁名下的字段，见
//! `ParentLinks`。

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;

use crate::config::NPROC;
use crate::fs::{FdTable, Inode};
use crate::mm::AddrSpace;
use crate::sched::context::Context;

use super::Kernel;

/// 进程标识符
pub type Pid = u32;

/// 线程标识符（0 表示进程本体）
pub type Tid = u32;

/// 任务的首次运行体：描述符第一次被调度时执行的内核态计算
///
/// 对应 xv6 里 forkret 返回用户态后跑的那段用户程序；宿主模型下
/// 用户计算就是一个闭包。闭包返回视同 exit(0)。
pub type TaskFn = Box<dyn FnOnce(&Arc<Kernel>) + Send + 'static>;

/// 描述符生命周期状态
///
/// UNUSED → USED → RUNNABLE ⇄ RUNNING，
/// RUNNING → SLEEPING → RUNNABLE，RUNNING → ZOMBIE →（回收）→ UNUSED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Used,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

impl ProcState {
    /// 诊断转储用的短名，对齐 xv6 procdump 的拼写
    pub fn as_str(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Used => "used",
            ProcState::Sleeping => "sleep ",
            ProcState::Runnable => "runble",
            ProcState::Running => "run   ",
            ProcState::Zombie => "zombie",
        }
    }
}

/// 用户态寄存器快照
///
/// 对应 xv6 的 struct trapframe（kernel/proc.h）：进入内核时保存、
/// 返回用户态时恢复的那一整套寄存器。fork/clone 原样复制并把 a0
/// 清零，让新任务观察到返回值 0。
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub kernel_satp: u64,
    pub kernel_sp: u64,
    pub kernel_trap: u64,
    pub epc: u64,
    pub kernel_hartid: u64,
    pub ra: u64,
    pub sp: u64,
    pub gp: u64,
    pub tp: u64,
    pub t0: u64,
    pub t1: u64,
    pub t2: u64,
    pub s0: u64,
    pub s1: u64,
    pub a0: u64,
    pub a1: u64,
    pub a2: u64,
    pub a3: u64,
    pub a4: u64,
    pub a5: u64,
    pub a6: u64,
    pub a7: u64,
    pub s2: u64,
    pub s3: u64,
    pub s4: u64,
    pub s5: u64,
    pub s6: u64,
    pub s7: u64,
    pub s8: u64,
    pub s9: u64,
    pub s10: u64,
    pub s11: u64,
    pub t3: u64,
    pub t4: u64,
    pub t5: u64,
    pub t6: u64,
}

/// 槽位锁保护的描述符本体
pub struct ProcInner {
    /// 生命周期状态
    pub state: ProcState,

    /// 睡眠频道：0 表示没在睡；按地址相等匹配
    pub chan: usize,

    /// 终止旗标，由 kill 置位、受害者协作观察
    pub killed: bool,

    /// 退出状态，ZOMBIE 期间有效，等父进程收割
    pub xstate: i32,

    /// 进程号（槽位存活期内全局唯一）
    pub pid: Pid,

    /// 线程号（进程为 0）
    pub tid: Tid,

    // ---- 调度记账 ----
    /// 彩票数
    pub tickets: u32,
    /// 步长调度累计的 pass 值
    pub pass: u64,
    /// 步长增量
    pub stride: u64,
    /// 获得的调度量子计数
    pub ticks: u64,

    /// 被挂起的继续点；每次分配换新，槽位复用不会误唤醒旧执行流
    pub ctx: Arc<Context>,

    /// 派发这个任务的 CPU，让位时把控制权交还给它
    pub run_cpu: Option<usize>,

    /// 首次运行体，第一次被调度时取走
    pub entry: Option<TaskFn>,

    /// 宿主线程是否已创建
    pub started: bool,

    // ---- 执行环境 ----
    /// 用户态寄存器快照
    pub trapframe: Option<Box<TrapFrame>>,

    /// 地址空间句柄：进程独占创建，线程共享
    pub pagetable: Option<AddrSpace>,

    /// 数据段大小（字节）
    pub sz: u64,

    /// 打开文件表
    pub ofile: FdTable,

    /// 当前工作目录引用
    pub cwd: Option<Arc<Inode>>,

    /// 诊断名
    pub name: String,
}

impl ProcInner {
    pub fn unused() -> Self {
        Self {
            state: ProcState::Unused,
            chan: 0,
            killed: false,
            xstate: 0,
            pid: 0,
            tid: 0,
            tickets: 0,
            pass: 0,
            stride: 0,
            ticks: 0,
            ctx: Arc::new(Context::new()),
            run_cpu: None,
            entry: None,
            started: false,
            trapframe: None,
            pagetable: None,
            sz: 0,
            ofile: FdTable::new(),
            cwd: None,
            name: String::new(),
        }
    }
}

/// 进程表的一个槽位
pub struct Proc {
    /// 槽位号（不变）
    pub slot: usize,

    /// 内核栈虚拟地址（一页栈 + 一页守护页，静态排布，不变）
    pub kstack: u64,

    /// 槽位锁：除父子链接外的全部生命周期字段都归它管
    pub inner: spin::Mutex<ProcInner>,
}

impl Proc {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            kstack: crate::config::kstack(slot),
            inner: spin::Mutex::new(ProcInner::unused()),
        }
    }

    /// 这个槽位作为睡眠频道的标识（地址相等即匹配）
    pub fn chan(&self) -> usize {
        self as *const Proc as usize
    }
}

/// 指向某个槽位上一代占用者的弱引用
///
/// 槽位会复用，裸下标会张冠李戴；配上分配时的 pid 做有效性检查
/// （回收会把 pid 清零，过期引用从此不再匹配）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef {
    pub slot: usize,
    pub pid: Pid,
}

/// 父子关系表，整张表躺在全局 wait 锁里面
///
/// 对应 xv6 里受 wait_lock 保护的 p->parent 字段；把字段搬进锁内，
/// "先拿 wait 锁再改关系"就从纪律变成了类型约束——没有
/// `MutexGuard<ParentLinks>` 根本摸不到这些链接。
pub struct ParentLinks {
    parent: [Option<ParentRef>; NPROC],
}

impl ParentLinks {
    pub fn new() -> Self {
        Self {
            parent: [None; NPROC],
        }
    }

    pub fn parent_of(&self, slot: usize) -> Option<ParentRef> {
        self.parent[slot]
    }

    pub fn set_parent(&mut self, slot: usize, parent: Option<ParentRef>) {
        self.parent[slot] = parent;
    }
}

impl Default for ParentLinks {
    fn default() -> Self {
        Self::new()
    }
}
