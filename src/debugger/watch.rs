//! ウォッチとゼロページポインタ
//!
//! どちらも表示専用で、ステップ実行を止めることはない。

use super::table::SlotRecord;
use crate::memory::{IO_PAGE_END, IO_PAGE_START};

/// ウォッチ対象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchTarget {
    #[default]
    None,
    Memory(u16),
    /// ビデオスキャナの位置
    VideoScanner,
}

/// ウォッチ1スロット分
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watch {
    pub target: WatchTarget,
    pub set: bool,
    pub enabled: bool,
}

impl Watch {
    pub fn new(target: WatchTarget) -> Self {
        Watch { target, set: true, enabled: true }
    }

    /// I/Oページは読むだけで副作用があるのでウォッチできない
    pub fn is_watchable(address: u16) -> bool {
        !(IO_PAGE_START..=IO_PAGE_END).contains(&address)
    }
}

impl SlotRecord for Watch {
    const KIND: &'static str = "watches";

    fn is_set(&self) -> bool {
        self.set
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn address(&self) -> u16 {
        match self.target {
            WatchTarget::Memory(address) => address,
            _ => 0,
        }
    }

    fn access_label(&self) -> &'static str {
        "R/W"
    }

    fn detail(&self) -> String {
        match self.target {
            WatchTarget::VideoScanner => "video".to_string(),
            _ => String::new(),
        }
    }
}

/// ゼロページポインタ1スロット分
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZeroPagePointer {
    pub address: u8,
    pub set: bool,
    pub enabled: bool,
}

impl ZeroPagePointer {
    pub fn new(address: u8) -> Self {
        ZeroPagePointer { address, set: true, enabled: true }
    }
}

impl SlotRecord for ZeroPagePointer {
    const KIND: &'static str = "zero page pointers";

    fn is_set(&self) -> bool {
        self.set
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn address(&self) -> u16 {
        self.address as u16
    }
}
