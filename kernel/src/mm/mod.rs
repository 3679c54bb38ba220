//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 内存管理协作者
//!
//! 进程管理对页表的全部依赖都收敛在 pagemap 的窄接口后面。

pub mod pagemap;

pub use pagemap::{pg_round_up, AddrSpace, AddressSpace, PteFlags};
