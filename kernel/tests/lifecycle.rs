//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 任务生命周期的端到端场景：fork/exit/wait/kill/clone 与睡眠唤醒。
//! 场景体跑在内核里的任务上，结果通过通道交回测试线程断言。

mod common;

use std::sync::mpsc;
use std::sync::Arc;

use xvos::config::{NTHREAD_MAX, PGSIZE};
use xvos::{Errno, Kernel, PolicyKind, ProcState};

// 测试：子进程 exit 的状态原样走到父进程的 wait
#[test]
fn fork_exit_wait_roundtrip() {
    let (tx, rx) = mpsc::channel();
    common::run_scenario(PolicyKind::RoundRobin, 1, move |k| {
        let child = k
            .do_fork(Box::new(|k: &Arc<Kernel>| {
                k.do_exit(7);
            }))
            .unwrap();
        let reaped = k.do_wait(64).unwrap();
        let mut buf = [0u8; 4];
        k.copy_in_user(64, &mut buf).unwrap();
        tx.send((child, reaped, i32::from_le_bytes(buf))).unwrap();
    });
    let (child, reaped, status) = rx.recv().unwrap();
    assert_eq!(reaped, child);
    assert_eq!(status, 7);
}

// 测试：没有孩子时 wait 立刻报 ECHILD，不睡
#[test]
fn wait_without_children_fails_fast() {
    let (tx, rx) = mpsc::channel();
    common::run_scenario(PolicyKind::RoundRobin, 1, move |k| {
        tx.send(k.do_wait(0)).unwrap();
    });
    assert_eq!(rx.recv().unwrap(), Err(Errno::NoChild));
}

// 测试：父进程先走，孤儿过继给 init，由 init 收尸
#[test]
fn orphans_reparent_to_init() {
    let (tx, rx) = mpsc::channel();
    common::run_scenario(PolicyKind::RoundRobin, 1, move |k| {
        let (gtx, grx) = mpsc::channel();
        let middle = k
            .do_fork(Box::new(move |k: &Arc<Kernel>| {
                let grandchild = k
                    .do_fork(Box::new(|k: &Arc<Kernel>| {
                        k.do_exit(3);
                    }))
                    .unwrap();
                gtx.send(grandchild).unwrap();
                k.do_exit(1);
            }))
            .unwrap();
        let first = k.do_wait(0).unwrap();
        let second = k.do_wait(0).unwrap();
        let grandchild = grx.recv().unwrap();
        tx.send((middle, grandchild, first, second)).unwrap();
    });
    let (middle, grandchild, first, second) = rx.recv().unwrap();
    let mut got = [first, second];
    got.sort_unstable();
    let mut want = [middle, grandchild];
    want.sort_unstable();
    assert_eq!(got, want);
}

// 测试：唤醒按频道精确匹配，喊错频道的睡者纹丝不动
#[test]
fn wakeup_matches_channel_exactly() {
    const CHAN: usize = 0xABC;
    let (tx, rx) = mpsc::channel();
    common::run_scenario(PolicyKind::RoundRobin, 1, move |k| {
        let cond = Arc::new(spin::Mutex::new(false));
        let c2 = cond.clone();
        let sleeper = k
            .do_fork(Box::new(move |k: &Arc<Kernel>| {
                let mut ready = c2.lock();
                while !*ready {
                    ready = k.sleep(CHAN, &c2, ready);
                }
            }))
            .unwrap();

        // 等它睡熟
        while k.state_of(sleeper) != Some(ProcState::Sleeping) {
            k.yield_cpu();
        }

        // 错频道不应惊动它
        k.wakeup(CHAN + 1);
        k.yield_cpu();
        k.yield_cpu();
        let still = k.state_of(sleeper);

        *cond.lock() = true;
        k.wakeup(CHAN);
        let reaped = k.do_wait(0).unwrap();
        tx.send((still, sleeper, reaped)).unwrap();
    });
    let (still, sleeper, reaped) = rx.recv().unwrap();
    assert_eq!(still, Some(ProcState::Sleeping));
    assert_eq!(reaped, sleeper);
}

// 测试：kill 把睡者捞成 RUNNABLE，由它自己协作退出；
// 不存在的 pid 报 ESRCH
#[test]
fn kill_wakes_sleeper_for_cooperative_exit() {
    let (tx, rx) = mpsc::channel();
    common::run_scenario(PolicyKind::RoundRobin, 1, move |k| {
        let gate = Arc::new(spin::Mutex::new(()));
        let g2 = gate.clone();
        let victim = k
            .do_fork(Box::new(move |k: &Arc<Kernel>| {
                let mut held = g2.lock();
                while !k.current_killed() {
                    held = k.sleep(0x51EE, &g2, held);
                }
            }))
            .unwrap();

        while k.state_of(victim) != Some(ProcState::Sleeping) {
            k.yield_cpu();
        }

        let missing = k.do_kill(victim + 1000);
        k.do_kill(victim).unwrap();
        let reaped = k.do_wait(96).unwrap();
        let mut buf = [0u8; 4];
        k.copy_in_user(96, &mut buf).unwrap();
        tx.send((missing, victim, reaped, i32::from_le_bytes(buf)))
            .unwrap();
    });
    let (missing, victim, reaped, status) = rx.recv().unwrap();
    assert_eq!(missing, Err(Errno::NoSuchProcess));
    assert_eq!(reaped, victim);
    assert_eq!(status, 0);
}

// 测试：退出状态写不进父地址空间时僵尸保留，父进程可以重试
#[test]
fn wait_keeps_zombie_when_copyout_fails() {
    let (tx, rx) = mpsc::channel();
    common::run_scenario(PolicyKind::RoundRobin, 1, move |k| {
        let child = k
            .do_fork(Box::new(|k: &Arc<Kernel>| {
                k.do_exit(5);
            }))
            .unwrap();
        while k.state_of(child) != Some(ProcState::Zombie) {
            k.yield_cpu();
        }
        let bad = k.do_wait(50 * PGSIZE);
        let still = k.state_of(child);
        let good = k.do_wait(0);
        tx.send((bad, still, good, child)).unwrap();
    });
    let (bad, still, good, child) = rx.recv().unwrap();
    assert_eq!(bad, Err(Errno::BadAddress));
    assert_eq!(still, Some(ProcState::Zombie));
    assert_eq!(good, Ok(child));
}

// 测试：clone 出的线程与进程共享地址空间；坏栈参数直接拒绝
#[test]
fn clone_shares_address_space() {
    let (tx, rx) = mpsc::channel();
    common::run_scenario(PolicyKind::RoundRobin, 1, move |k| {
        let zero_stack = k.do_clone(0, Box::new(|_| {}));
        let crooked_stack = k.do_clone(123, Box::new(|_| {}));

        k.grow_proc(2 * PGSIZE as i64).unwrap();
        let tid = k
            .do_clone(
                PGSIZE,
                Box::new(|k: &Arc<Kernel>| {
                    k.copy_out_user(8, b"thrd").unwrap();
                }),
            )
            .unwrap();
        let reaped = k.do_wait(0).unwrap();
        let mut buf = [0u8; 4];
        k.copy_in_user(8, &mut buf).unwrap();
        tx.send((zero_stack.err(), crooked_stack.err(), tid, reaped, buf))
            .unwrap();
    });
    let (zero_stack, crooked_stack, tid, reaped, buf) = rx.recv().unwrap();
    assert_eq!(zero_stack, Some(Errno::InvalidArgument));
    assert_eq!(crooked_stack, Some(Errno::InvalidArgument));
    assert_eq!(tid, 1);
    assert_eq!(reaped, 2); // init 是 1，线程的 pid 是 2
    assert_eq!(&buf, b"thrd");
}

// 测试：线程号有全局天花板，顶到就拒绝，不留半开的槽位
#[test]
fn clone_tid_ceiling() {
    let (tx, rx) = mpsc::channel();
    common::run_scenario(PolicyKind::RoundRobin, 1, move |k| {
        k.grow_proc(2 * PGSIZE as i64).unwrap();
        let mut last = 0;
        for _ in 0..NTHREAD_MAX {
            last = k.do_clone(PGSIZE, Box::new(|_| {})).unwrap();
            k.do_wait(0).unwrap();
        }
        let over = k.do_clone(PGSIZE, Box::new(|_| {}));
        tx.send((last, over.err())).unwrap();
    });
    let (last, over) = rx.recv().unwrap();
    assert_eq!(last, NTHREAD_MAX);
    assert_eq!(over, Some(Errno::InvalidArgument));
}

// 测试：被收割的任务不留下宿主线程
//
// 每个任务的内核态计算挂在一个宿主线程上；exit 之后这个线程必须
// 消亡，否则 fork 循环会把进程的线程数越堆越高。
#[cfg(target_os = "linux")]
#[test]
fn reaped_tasks_release_host_threads() {
    fn host_threads() -> usize {
        std::fs::read_to_string("/proc/self/status")
            .unwrap_or_default()
            .lines()
            .find_map(|l| l.strip_prefix("Threads:"))
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0)
    }

    let (tx, rx) = mpsc::channel();
    common::run_scenario(PolicyKind::RoundRobin, 1, move |k| {
        let before = host_threads();
        for _ in 0..100 {
            k.do_fork(Box::new(|k: &Arc<Kernel>| {
                k.do_exit(0);
            }))
            .unwrap();
            k.do_wait(0).unwrap();
        }
        // 线程消亡在移交之后异步发生，给点时间
        let mut after = host_threads();
        for _ in 0..200 {
            if after <= before + 8 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
            after = host_threads();
        }
        tx.send((before, after)).unwrap();
    });
    let (before, after) = rx.recv().unwrap();
    assert!(
        after <= before + 8,
        "host threads piled up: {} -> {}",
        before,
        after
    );
}

// 测试：数据段长上去能写，缩回来那页就成了坏地址
#[test]
fn grow_and_shrink_data_segment() {
    let (tx, rx) = mpsc::channel();
    common::run_scenario(PolicyKind::RoundRobin, 1, move |k| {
        k.grow_proc(PGSIZE as i64).unwrap();
        let grown = k.copy_out_user(PGSIZE + 10, b"grown");
        k.grow_proc(-(PGSIZE as i64)).unwrap();
        let shrunk = k.copy_out_user(PGSIZE + 10, b"gone?");
        tx.send((grown, shrunk)).unwrap();
    });
    let (grown, shrunk) = rx.recv().unwrap();
    assert_eq!(grown, Ok(()));
    assert_eq!(shrunk, Err(Errno::BadAddress));
}
