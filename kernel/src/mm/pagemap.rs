//! MIT License
//!
//! Copyright (c) 2026 Xvos Developers
//!
//! 用户地址空间（内存管理协作者的窄接口）
//!
//! 进程管理只通过这里的操作碰页表：建空表、在固定虚址映射/解除
//! 一页、增长/收缩数据段、整体复制、整体拆除、跨地址空间拷字节。
//! 对应 xv6 的 kernel/vm.c（uvmcreate/mappages/uvmunmap/uvmalloc/
//! uvmdealloc/uvmcopy/uvmfree/copyout/copyin）。页表项这里退化为
//! 一张 va -> 页 的有序映射，权限位照旧。

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;

use bitflags::bitflags;

use crate::config::PGSIZE;
use crate::errno::{Errno, KResult};

bitflags! {
    /// 页权限位，对应 riscv 的 PTE_R/W/X/U
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u8 {
        const R = 1 << 0;
        const W = 1 << 1;
        const X = 1 << 2;
        const U = 1 << 3;
    }
}

/// 一页物理内存加它的权限位
struct Page {
    data: Box<[u8]>,
    flags: PteFlags,
}

impl Page {
    fn zeroed(flags: PteFlags) -> Self {
        Self {
            data: vec![0u8; PGSIZE as usize].into_boxed_slice(),
            flags,
        }
    }
}

/// 进程（及其线程）共享的地址空间句柄
pub type AddrSpace = Arc<spin::Mutex<AddressSpace>>;

/// 一个用户地址空间
pub struct AddressSpace {
    pages: BTreeMap<u64, Page>,
}

impl AddressSpace {
    /// 建一个空地址空间，对应 uvmcreate()
    pub fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
        }
    }

    /// 包一层共享句柄
    pub fn new_shared() -> AddrSpace {
        Arc::new(spin::Mutex::new(Self::new()))
    }

    /// 在 va 处映射一页零页，对应 mappages() 的单页情形
    ///
    /// va 必须页对齐；重复映射是调用方的协议错误。
    pub fn map_page(&mut self, va: u64, flags: PteFlags) -> KResult<()> {
        if va % PGSIZE != 0 {
            return Err(Errno::InvalidArgument);
        }
        if self.pages.contains_key(&va) {
            panic!("mappages: remap");
        }
        self.pages.insert(va, Page::zeroed(flags));
        Ok(())
    }

    /// 解除 va 处的一页映射，对应 uvmunmap() 的单页情形
    pub fn unmap_page(&mut self, va: u64) -> KResult<()> {
        if self.pages.remove(&va).is_none() {
            return Err(Errno::BadAddress);
        }
        Ok(())
    }

    /// va 处是否有映射（诊断/测试用）
    pub fn mapped(&self, va: u64) -> bool {
        self.pages.contains_key(&(va & !(PGSIZE - 1)))
    }

    /// 把第一个用户程序装进第 0 页，对应 uvmfirst()
    pub fn uvm_first(&mut self, code: &[u8]) {
        if code.len() as u64 > PGSIZE {
            panic!("uvm_first: more than a page");
        }
        let mut page = Page::zeroed(PteFlags::R | PteFlags::W | PteFlags::X | PteFlags::U);
        page.data[..code.len()].copy_from_slice(code);
        self.pages.insert(0, page);
    }

    /// 把数据段从 oldsz 增长到 newsz，返回新尺寸，对应 uvmalloc()
    pub fn uvm_alloc(&mut self, oldsz: u64, newsz: u64, xperm: PteFlags) -> KResult<u64> {
        if newsz < oldsz {
            return Ok(oldsz);
        }
        let mut va = pg_round_up(oldsz);
        while va < newsz {
            if self.pages.contains_key(&va) {
                // 半途失败时调用方负责回退，这里不该撞上已有映射
                panic!("uvm_alloc: remap");
            }
            self.pages
                .insert(va, Page::zeroed(PteFlags::R | PteFlags::U | xperm));
            va += PGSIZE;
        }
        Ok(newsz)
    }

    /// 把数据段从 oldsz 收缩到 newsz，返回新尺寸，对应 uvmdealloc()
    pub fn uvm_dealloc(&mut self, oldsz: u64, newsz: u64) -> u64 {
        if newsz >= oldsz {
            return oldsz;
        }
        let mut va = pg_round_up(newsz);
        let end = pg_round_up(oldsz);
        while va < end {
            self.pages.remove(&va);
            va += PGSIZE;
        }
        newsz
    }

    /// 把 [0, sz) 的已映射内容复制进另一个地址空间，对应 uvmcopy()
    pub fn uvm_copy(&self, dst: &mut AddressSpace, sz: u64) -> KResult<()> {
        let mut va = 0;
        while va < sz {
            let src = match self.pages.get(&va) {
                Some(p) => p,
                None => panic!("uvm_copy: page not present"),
            };
            let mut page = Page::zeroed(src.flags);
            page.data.copy_from_slice(&src.data);
            dst.pages.insert(va, page);
            va += PGSIZE;
        }
        Ok(())
    }

    /// 拆掉整个地址空间，对应 uvmfree()
    pub fn uvm_free(&mut self) {
        self.pages.clear();
    }

    /// 把内核字节写进本地址空间的 dstva，对应 copyout()
    ///
    /// 只允许写带 U 位的页；越界或权限不符时不做部分写入之外的承诺，
    /// 与 xv6 相同（失败前已写的字节保留）。
    pub fn copy_out(&mut self, dstva: u64, src: &[u8]) -> KResult<()> {
        let mut va = dstva;
        let mut off = 0usize;
        while off < src.len() {
            let base = va & !(PGSIZE - 1);
            let page = self.pages.get_mut(&base).ok_or(Errno::BadAddress)?;
            if !page.flags.contains(PteFlags::U) {
                return Err(Errno::BadAddress);
            }
            let pgoff = (va - base) as usize;
            let n = core::cmp::min(src.len() - off, PGSIZE as usize - pgoff);
            page.data[pgoff..pgoff + n].copy_from_slice(&src[off..off + n]);
            off += n;
            va = base + PGSIZE;
        }
        Ok(())
    }

    /// 从本地址空间的 srcva 读字节到内核缓冲，对应 copyin()
    pub fn copy_in(&self, srcva: u64, dst: &mut [u8]) -> KResult<()> {
        let mut va = srcva;
        let mut off = 0usize;
        while off < dst.len() {
            let base = va & !(PGSIZE - 1);
            let page = self.pages.get(&base).ok_or(Errno::BadAddress)?;
            if !page.flags.contains(PteFlags::U) {
                return Err(Errno::BadAddress);
            }
            let pgoff = (va - base) as usize;
            let n = core::cmp::min(dst.len() - off, PGSIZE as usize - pgoff);
            dst[off..off + n].copy_from_slice(&page.data[pgoff..pgoff + n]);
            off += n;
            va = base + PGSIZE;
        }
        Ok(())
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// 向上取页边界，对应 PGROUNDUP
pub const fn pg_round_up(sz: u64) -> u64 {
    (sz + PGSIZE - 1) & !(PGSIZE - 1)
}
