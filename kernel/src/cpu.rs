//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 每 CPU 状态与"当前任务"绑定
//!
//! 对应 xv6 的 struct cpu / mycpu() / myproc()（kernel/proc.c）。
//! 宿主模型下，一个调度线程就是一颗 CPU 核，线程局部变量代替了
//! tp 寄存器里的 hart 号。

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use crate::config::NPROC;
use crate::sched::context::Context;

/// "无进程"哨兵值，存进 `Cpu::proc` 表示这颗核空转
pub const NO_PROC: usize = NPROC;

/// 每 CPU 状态
///
/// 对应 xv6 的 struct cpu（kernel/proc.h）：
/// - proc: 正在这颗核上运行的槽位
/// - context: 调度器自身的保存上下文，swtch 回来的落点
/// - noff/intena: push_off/pop_off 的中断嵌套计数
pub struct Cpu {
    /// CPU 编号
    pub id: usize,

    /// 当前运行的进程槽位（NO_PROC 表示空）
    pub proc: AtomicUsize,

    /// 调度器的保存上下文
    pub context: Context,

    /// push_off 嵌套深度
    noff: AtomicI32,

    /// 最外层 push_off 之前中断是否打开
    intena: AtomicBool,

    /// 模拟的中断使能位
    intr_enabled: AtomicBool,
}

impl Cpu {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            proc: AtomicUsize::new(NO_PROC),
            context: Context::new(),
            noff: AtomicI32::new(0),
            intena: AtomicBool::new(false),
            intr_enabled: AtomicBool::new(false),
        }
    }

    /// 打开中断（调度循环每圈都要做，避免饿死设备中断）
    pub fn intr_on(&self) {
        self.intr_enabled.store(true, Ordering::Release);
    }

    /// 关闭中断并递增嵌套计数
    ///
    /// 对应 xv6 的 push_off()（kernel/spinlock.c）
    pub fn push_off(&self) {
        let old = self.intr_enabled.swap(false, Ordering::AcqRel);
        if self.noff.fetch_add(1, Ordering::AcqRel) == 0 {
            self.intena.store(old, Ordering::Release);
        }
    }

    /// 递减嵌套计数，归零时恢复中断
    ///
    /// 对应 xv6 的 pop_off()
    pub fn pop_off(&self) {
        let n = self.noff.fetch_sub(1, Ordering::AcqRel);
        if n <= 0 {
            panic!("pop_off");
        }
        if n == 1 && self.intena.load(Ordering::Acquire) {
            self.intr_enabled.store(true, Ordering::Release);
        }
    }

    /// 当前中断是否打开（诊断用）
    pub fn intr_get(&self) -> bool {
        self.intr_enabled.load(Ordering::Acquire)
    }
}

std::thread_local! {
    /// 本线程扮演的 CPU 编号（仅调度线程持有）
    static CPU_ID: Cell<Option<usize>> = const { Cell::new(None) };

    /// 本线程绑定的进程槽位（仅任务线程持有）
    static TASK_SLOT: Cell<Option<usize>> = const { Cell::new(None) };
}

/// 标记本线程为第 id 颗 CPU 的调度线程
pub(crate) fn set_cpu_id(id: usize) {
    CPU_ID.with(|c| c.set(Some(id)));
}

/// 把本线程绑定到一个进程槽位
pub(crate) fn set_current_slot(slot: Option<usize>) {
    TASK_SLOT.with(|c| c.set(slot));
}

/// 本线程绑定的进程槽位，对应 xv6 的 myproc()
pub(crate) fn current_slot() -> Option<usize> {
    TASK_SLOT.with(|c| c.get())
}

/// 空转一拍，把宿主 CPU 让给别的线程
pub(crate) fn relax() {
    core::hint::spin_loop();
    std::thread::yield_now();
}
