//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 文件系统协作者（窄接口）
//!
//! 进程管理只要求：打开文件句柄的复制/关闭按引用计数走
//! （对应 xv6 的 filedup/fileclose），路径解析出目录引用
//! （namei/idup/iput），以及目录变更前后的事务括号
//! （begin_op/end_op）。句柄的引用计数直接用 Arc 承担，
//! 最后一个持有者释放即关闭。

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use core::array;
use core::sync::atomic::{AtomicI32, Ordering};

use crate::config::NOFILE;
use crate::errno::{Errno, KResult};

/// 一个目录/索引节点引用
///
/// iput 就是丢掉 Arc；idup 就是 Arc::clone。
pub struct Inode {
    path: String,
}

impl Inode {
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// 一个打开的文件句柄
///
/// 引用计数由 Arc 承担，fork/clone 复制句柄时计数加一。
pub struct File {
    inode: Arc<Inode>,
}

impl File {
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }
}

/// 每进程打开文件表（固定容量）
///
/// 对应 xv6 proc 里的 ofile[NOFILE]
pub struct FdTable {
    files: [Option<Arc<File>>; NOFILE],
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            files: array::from_fn(|_| None),
        }
    }

    /// 装进最小的空 fd
    pub fn alloc_fd(&mut self, file: Arc<File>) -> KResult<usize> {
        for (fd, slot) in self.files.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(file);
                return Ok(fd);
            }
        }
        Err(Errno::Busy)
    }

    pub fn get(&self, fd: usize) -> Option<Arc<File>> {
        self.files.get(fd).and_then(|f| f.clone())
    }

    /// 复制整张表，每个句柄计数加一（对应 fork 里的 filedup 循环）
    pub fn dup_all(&self) -> FdTable {
        Self {
            files: array::from_fn(|i| self.files[i].clone()),
        }
    }

    /// 关掉全部句柄（对应 exit 里的 fileclose 循环）
    pub fn close_all(&mut self) {
        for slot in self.files.iter_mut() {
            *slot = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.iter().all(|f| f.is_none())
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

/// 文件系统门面
pub struct Fs {
    root: Arc<Inode>,
    /// begin_op/end_op 的配平计数，诊断用
    outstanding: AtomicI32,
    initialized: spin::Once<()>,
}

impl Fs {
    pub fn new() -> Self {
        Self {
            root: Arc::new(Inode {
                path: "/".to_string(),
            }),
            outstanding: AtomicI32::new(0),
            initialized: spin::Once::new(),
        }
    }

    /// 首个任务第一次回到用户态时完成挂载
    ///
    /// 对应 xv6 forkret() 里的一次性 fsinit()
    pub fn ensure_init(&self) {
        self.initialized.call_once(|| {
            log::debug!("fs: root mounted");
        });
    }

    /// 路径解析出目录引用，对应 namei()
    pub fn namei(&self, path: &str) -> Arc<Inode> {
        if path == "/" {
            return self.root.clone();
        }
        Arc::new(Inode {
            path: path.to_string(),
        })
    }

    /// 打开一个文件句柄（测试与上层使用）
    pub fn open(&self, path: &str) -> Arc<File> {
        Arc::new(File {
            inode: self.namei(path),
        })
    }

    /// 目录变更事务开括号，对应 begin_op()
    pub fn begin_op(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    /// 目录变更事务闭括号，对应 end_op()
    pub fn end_op(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) <= 0 {
            panic!("end_op: unbalanced");
        }
    }
}

impl Default for Fs {
    fn default() -> Self {
        Self::new()
    }
}
