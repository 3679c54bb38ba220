//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 可插拔的调度策略
//!
//! 原始实现用条件编译在 scheduler() 里切换三种挑选逻辑；这里改成
//! 启动时选定一个策略对象，调度循环只管问它"下一个跑谁"。
//! 策略只做挑选与记账（pass/ticks），状态迁移归调度循环。
//!
//! 挑选协议：返回 (槽位, 持锁描述符)，描述符此刻是 RUNNABLE；
//! 扫描期间不持全表锁，逐槽位加锁，所以两趟扫描之间任务可能退场，
//! 策略此时返回 None，调度循环下一圈重来即可。

use alloc::boxed::Box;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::config::DEFAULT_POLICY;
use crate::process::{Proc, ProcInner, ProcState};

use super::rand::Lfsr;

/// 启动配置里可选的策略种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// 轮转：按槽位序轮流
    RoundRobin,
    /// 彩票：按票数加权随机
    Lottery,
    /// 步长：确定性的比例份额
    Stride,
}

impl PolicyKind {
    /// 解析配置字符串
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "round_robin" | "rr" => Some(Self::RoundRobin),
            "lottery" => Some(Self::Lottery),
            "stride" => Some(Self::Stride),
            _ => None,
        }
    }
}

impl Default for PolicyKind {
    fn default() -> Self {
        match Self::parse(DEFAULT_POLICY) {
            Some(kind) => kind,
            None => Self::RoundRobin,
        }
    }
}

/// 调度策略接口
///
/// 对应 xv6 scheduler() 里被 #if LOTTERY / #elif STRIDE 括起来的
/// 那段挑选代码，每个策略一个实现。
pub(crate) trait SchedPolicy: Send + Sync {
    /// 策略名（日志与诊断）
    fn name(&self) -> &'static str;

    /// 从进程表挑下一个可运行任务，返回持锁的描述符
    fn select<'a>(&self, procs: &'a [Proc]) -> Option<(usize, spin::MutexGuard<'a, ProcInner>)>;
}

/// 按种类造一个策略对象
pub(crate) fn make_policy(kind: PolicyKind) -> Box<dyn SchedPolicy> {
    match kind {
        PolicyKind::RoundRobin => Box::new(RoundRobin {
            cursor: AtomicUsize::new(0),
        }),
        PolicyKind::Lottery => Box::new(Lottery {
            lfsr: spin::Mutex::new(Lfsr::new()),
        }),
        PolicyKind::Stride => Box::new(Stride),
    }
}

/// 轮转调度
///
/// 游标记住上次选中的下一个槽位，从那里接着找，保证同为 RUNNABLE
/// 的任务按槽位序轮流。不动 ticks——原始的轮转路径就不记账。
struct RoundRobin {
    cursor: AtomicUsize,
}

impl SchedPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select<'a>(&self, procs: &'a [Proc]) -> Option<(usize, spin::MutexGuard<'a, ProcInner>)> {
        let start = self.cursor.load(Ordering::Relaxed);
        for k in 0..procs.len() {
            let slot = (start + k) % procs.len();
            let inner = procs[slot].inner.lock();
            if inner.state == ProcState::Runnable {
                self.cursor.store((slot + 1) % procs.len(), Ordering::Relaxed);
                return Some((slot, inner));
            }
        }
        None
    }
}

/// 彩票调度
///
/// 第一趟数清 RUNNABLE 任务的总票数，抽一个 [0, total) 的彩票号，
/// 第二趟按累计票数找中奖者。两趟之间票池可能变动，抽空了就放弃
/// 这一圈。选中者 ticks 加一。
struct Lottery {
    lfsr: spin::Mutex<Lfsr>,
}

impl SchedPolicy for Lottery {
    fn name(&self) -> &'static str {
        "lottery"
    }

    fn select<'a>(&self, procs: &'a [Proc]) -> Option<(usize, spin::MutexGuard<'a, ProcInner>)> {
        let mut total: u64 = 0;
        for p in procs.iter() {
            let inner = p.inner.lock();
            if inner.state == ProcState::Runnable {
                total += inner.tickets as u64;
            }
        }
        if total == 0 {
            return None;
        }

        let draw = (self.lfsr.lock().next() as u64) % total;
        let mut counter: u64 = 0;
        for p in procs.iter() {
            let mut inner = p.inner.lock();
            if inner.state != ProcState::Runnable {
                continue;
            }
            counter += inner.tickets as u64;
            if counter > draw {
                inner.ticks += 1;
                return Some((p.slot, inner));
            }
        }
        None
    }
}

/// 步长调度
///
/// 选 pass 最小的 RUNNABLE 任务（严格小于，平票归槽位小者），
/// 给它的 pass 加上自己的 stride，ticks 加一。票多者 stride 小，
/// pass 涨得慢，被选得就多——确定性的比例份额。
struct Stride;

impl SchedPolicy for Stride {
    fn name(&self) -> &'static str {
        "stride"
    }

    fn select<'a>(&self, procs: &'a [Proc]) -> Option<(usize, spin::MutexGuard<'a, ProcInner>)> {
        let mut best: Option<(usize, u64)> = None;
        for p in procs.iter() {
            let inner = p.inner.lock();
            if inner.state != ProcState::Runnable {
                continue;
            }
            match best {
                Some((_, pass)) if inner.pass >= pass => {}
                _ => best = Some((p.slot, inner.pass)),
            }
        }

        let (slot, _) = best?;
        let mut inner = procs[slot].inner.lock();
        // 重新拿锁期间任务可能退场，确认后才记账
        if inner.state != ProcState::Runnable {
            return None;
        }
        inner.pass += inner.stride;
        inner.ticks += 1;
        Some((slot, inner))
    }
}
