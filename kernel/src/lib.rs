//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! Xvos 内核：进程生命周期与 CPU 调度
//!
//! 一个教学用的类 xv6 内核的进程管理子系统，跑在宿主之上：
//! 每颗 CPU 核是一个宿主线程，每个任务的内核态计算也是一个宿主
//! 线程，swtch 在两者之间移交控制权。对外入口是 [`Kernel`]——
//! 建实例、userinit、boot，然后在任务运行体里用
//! fork/clone/exit/wait/kill/sleep/wakeup。
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xvos::{Kernel, PolicyKind};
//!
//! let kernel = Kernel::new(PolicyKind::RoundRobin);
//! kernel.userinit(Box::new(|k: &Arc<Kernel>| {
//!     let pid = k.do_fork(Box::new(|_| {})).unwrap();
//!     k.do_wait(0).unwrap();
//!     let _ = pid;
//! }));
//! let cpus = kernel.boot(1);
//! # drop(cpus);
//! ```

extern crate alloc;

pub mod config;
pub mod cpu;
pub mod errno;
pub mod fs;
pub mod mm;
pub mod process;
pub mod sched;
pub mod sync;

pub use errno::{Errno, KResult};
pub use process::{Kernel, Pid, ProcState, SchedStat, TaskFn, Tid};
pub use sched::policy::PolicyKind;
