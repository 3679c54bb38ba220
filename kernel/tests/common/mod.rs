//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 集成测试的公共搭台：起一个内核，把场景体装进首个任务跑。

use std::sync::Arc;

use xvos::{Kernel, PolicyKind};

/// 跑一个完整场景：建内核、userinit、boot，场景体结束后请求停机
/// 并等全部调度线程下线
///
/// 场景体跑在首个任务（init）里；init 不能 exit，所以收尾后它
/// 留在让位循环里，调度线程看到停机旗标便退出。
pub fn run_scenario<F>(policy: PolicyKind, ncpu: usize, body: F)
where
    F: FnOnce(&Arc<Kernel>) + Send + 'static,
{
    let kernel = Kernel::new(policy);
    kernel.userinit(Box::new(move |k: &Arc<Kernel>| {
        body(k);
        k.shutdown();
        loop {
            k.yield_cpu();
        }
    }));
    for cpu in kernel.boot(ncpu) {
        cpu.join().expect("scheduler thread exits cleanly");
    }
}
