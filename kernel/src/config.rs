//! Xvos 内核配置
//!
//! 所有常量集中在此处，其他模块不得散布魔法数字

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "Xvos";

/// 内核版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// 进程表配置
// ============================================================

/// 进程表容量（对应 xv6 的 NPROC, kernel/param.h）
pub const NPROC: usize = 64;

/// 最大 CPU 数量（对应 xv6 的 NCPU）
pub const NCPU: usize = 4;

/// 每进程打开文件表大小（对应 xv6 的 NOFILE）
pub const NOFILE: usize = 16;

/// 单个进程可创建线程的上限（clone 的线程号天花板）
pub const NTHREAD_MAX: u32 = 20;

// ============================================================
// 内存布局
// ============================================================

/// 页大小
pub const PGSIZE: u64 = 4096;

/// 最高用户虚拟地址（Sv39 下留一位防符号扩展，对应 xv6 的 MAXVA）
pub const MAXVA: u64 = 1 << 38;

/// trampoline 代码页：映射在最高用户虚拟地址，内核/用户切换共用
pub const TRAMPOLINE: u64 = MAXVA - PGSIZE;

/// 进程私有 trapframe 页：紧贴 trampoline 之下
/// 线程的 trapframe 页按线程号继续向下排布（TRAPFRAME - PGSIZE * tid）
pub const TRAPFRAME: u64 = TRAMPOLINE - PGSIZE;

/// 第 i 个进程槽位的内核栈虚拟地址
///
/// 每个槽位一页内核栈，栈后跟一页未映射的守护页，
/// 对应 xv6 的 KSTACK 宏（kernel/memlayout.h）
pub const fn kstack(i: usize) -> u64 {
    TRAMPOLINE - ((i as u64) + 1) * 2 * PGSIZE
}

// ============================================================
// 调度器配置
// ============================================================

/// 比例份额调度的基准票数（原始实现中的 stride1）
///
/// 新分配的描述符默认持有这么多票
pub const BASE_TICKETS: u32 = 10_000;

/// 新分配描述符的默认步长
///
/// 注意：这与 set_sched_tickets 里 BASE_TICKETS / tickets 的公式不一致，
/// 是从原始实现继承下来的缺省值
pub const DEFAULT_STRIDE: u64 = 10;

/// set_sched_tickets 允许的票数上限
pub const TICKET_MAX: u32 = 10_000;

/// 伪随机源（16 位 LFSR）的固定种子
pub const LFSR_SEED: u16 = 0xACE1;

/// 启动时的默认调度策略（round_robin / lottery / stride）
pub const DEFAULT_POLICY: &str = "round_robin";
