//! 固定長スロットテーブル
//!
//! ブレークポイント・ウォッチ・ゼロページポインタの3種類が共有する
//! スロット管理（先頭からの空き探索、削除、有効/無効、一覧表示）。
//! 使用中スロット数 `count` は常に `is_set()` なスロットの数と一致させる。

use crate::error::DebugError;

/// スロットに格納できるレコード
pub trait SlotRecord: Default + Clone {
    /// メッセージ用の種類名（複数形）
    const KIND: &'static str;

    fn is_set(&self) -> bool;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
    fn address(&self) -> u16;

    fn is_stop(&self) -> bool {
        true
    }
    fn is_temp(&self) -> bool {
        false
    }
    fn is_hit(&self) -> bool {
        false
    }
    fn hit_count(&self) -> u32 {
        0
    }
    /// 一覧の Mem 列
    fn access_label(&self) -> &'static str {
        "   "
    }
    /// 一覧の末尾に付ける説明
    fn detail(&self) -> String {
        String::new()
    }
}

/// スロット指定（`3`、`*`、`3*`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotArg {
    Index(usize),
    All,
    /// 指定スロットから末尾まで
    From(usize),
}

impl SlotArg {
    pub fn parse(arg: &str) -> Result<SlotArg, DebugError> {
        if arg == "*" {
            return Ok(SlotArg::All);
        }
        let (digits, from) = match arg.strip_suffix('*') {
            Some(rest) => (rest, true),
            None => (arg, false),
        };
        let digits = digits.trim_start_matches('#');
        let slot = usize::from_str_radix(digits, 16)
            .map_err(|_| DebugError::Syntax(format!("bad slot number '{}'", arg)))?;
        Ok(if from { SlotArg::From(slot) } else { SlotArg::Index(slot) })
    }
}

/// 容量 `N` の固定長テーブル
#[derive(Debug, Clone)]
pub struct SlotTable<R: SlotRecord, const N: usize> {
    slots: [R; N],
    count: usize,
}

impl<R: SlotRecord, const N: usize> Default for SlotTable<R, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: SlotRecord, const N: usize> SlotTable<R, N> {
    pub fn new() -> Self {
        SlotTable {
            slots: std::array::from_fn(|_| R::default()),
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// 使用中のスロット数
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 最も小さい空きスロット
    pub fn find_free(&self) -> Option<usize> {
        self.slots.iter().position(|r| !r.is_set())
    }

    /// 先頭の空きスロットに追加
    pub fn insert(&mut self, record: R) -> Result<usize, DebugError> {
        let slot = self.find_free().ok_or(DebugError::TableFull {
            kind: R::KIND,
            capacity: N,
        })?;
        self.slots[slot] = record;
        self.count += 1;
        log::debug!("{} #{:X} added", R::KIND, slot);
        Ok(slot)
    }

    /// 指定スロットに配置（使用中なら置き換え）
    pub fn insert_at(&mut self, slot: usize, record: R) -> Result<(), DebugError> {
        if slot >= N {
            return Err(self.invalid_slot(slot));
        }
        if !self.slots[slot].is_set() {
            self.count += 1;
        }
        self.slots[slot] = record;
        log::debug!("{} #{:X} placed", R::KIND, slot);
        Ok(())
    }

    /// 1スロット削除（空きなら何もしない）
    pub fn remove(&mut self, slot: usize) -> bool {
        match self.slots.get_mut(slot) {
            Some(record) if record.is_set() => {
                *record = R::default();
                self.count -= 1;
                log::debug!("{} #{:X} removed", R::KIND, slot);
                true
            }
            _ => false,
        }
    }

    pub fn remove_all(&mut self) {
        for slot in 0..N {
            self.remove(slot);
        }
    }

    /// 引数リストに従って削除（`*` は全削除）
    pub fn clear(&mut self, args: &[SlotArg]) {
        for arg in args {
            match *arg {
                SlotArg::All => {
                    self.remove_all();
                    break;
                }
                SlotArg::From(start) => {
                    for slot in start..N {
                        self.remove(slot);
                    }
                }
                SlotArg::Index(slot) => {
                    self.remove(slot);
                }
            }
        }
    }

    /// 引数リストに従って有効/無効を切り替える
    ///
    /// 範囲外のスロットは黙って無視する。
    pub fn set_enabled(&mut self, args: &[SlotArg], enabled: bool) {
        for arg in args {
            let range = match *arg {
                SlotArg::All => 0..N,
                SlotArg::From(start) => start.min(N)..N,
                SlotArg::Index(slot) if slot < N => slot..slot + 1,
                SlotArg::Index(_) => continue,
            };
            for record in &mut self.slots[range] {
                if record.is_set() {
                    record.set_enabled(enabled);
                }
            }
        }
    }

    /// 使用中スロットへの参照
    pub fn get(&self, slot: usize) -> Option<&R> {
        self.slots.get(slot).filter(|r| r.is_set())
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut R> {
        self.slots.get_mut(slot).filter(|r| r.is_set())
    }

    /// 使用中スロットを番号付きで列挙
    pub fn iter(&self) -> impl Iterator<Item = (usize, &R)> {
        self.slots.iter().enumerate().filter(|(_, r)| r.is_set())
    }

    pub fn invalid_slot(&self, slot: usize) -> DebugError {
        DebugError::InvalidSlot {
            kind: R::KIND,
            slot,
            max: N,
        }
    }

    /// 一覧表示
    pub fn list(&self) -> Vec<String> {
        if self.count == 0 {
            return vec![format!("  There are no current {}.  (Max: {})", R::KIND, N)];
        }
        let mut lines = vec!["  ID On Stop Temp HitCounter  Addr Mem Symbol".to_string()];
        for (slot, record) in self.iter() {
            lines.push(
                format!(
                    "  #{:X} {}  {}    {}  {}   {:08X}  {:04X} {} {}",
                    slot,
                    if record.is_enabled() { 'E' } else { '-' },
                    if record.is_stop() { 'S' } else { '-' },
                    if record.is_temp() { 'T' } else { '-' },
                    if record.is_hit() { '*' } else { ' ' },
                    record.hit_count(),
                    record.address(),
                    record.access_label(),
                    record.detail(),
                )
                .trim_end()
                .to_string(),
            );
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::breakpoint::{Breakpoint, BreakpointOperator, BreakpointSource};

    type Table = SlotTable<Breakpoint, 4>;

    fn pc_bp(address: u16) -> Breakpoint {
        Breakpoint::new(BreakpointSource::RegPc, BreakpointOperator::Equal, address, 1, false)
    }

    fn live(table: &Table) -> usize {
        table.iter().count()
    }

    #[test]
    fn test_first_fit_reuses_lowest_slot() {
        let mut table = Table::new();
        for i in 0..3 {
            assert_eq!(table.insert(pc_bp(0x300 + i)).unwrap(), i as usize);
        }
        assert!(table.remove(1));
        assert_eq!(table.insert(pc_bp(0x400)).unwrap(), 1);
        assert_eq!(table.get(1).unwrap().address, 0x400);
    }

    #[test]
    fn test_table_full() {
        let mut table = Table::new();
        for i in 0..4 {
            table.insert(pc_bp(i)).unwrap();
        }
        let err = table.insert(pc_bp(0x10)).unwrap_err();
        assert!(matches!(err, DebugError::TableFull { capacity: 4, .. }));
        assert_eq!(table.count(), 4);
    }

    #[test]
    fn test_count_matches_set_slots() {
        let mut table = Table::new();
        let ops: [(bool, usize); 10] = [
            (true, 0), (true, 0), (false, 0), (false, 0), (true, 0),
            (false, 3), (true, 0), (true, 0), (false, 1), (false, 9),
        ];
        for (add, slot) in ops {
            if add {
                let _ = table.insert(pc_bp(0x300));
            } else {
                table.remove(slot);
            }
            assert_eq!(table.count(), live(&table));
        }
        table.insert_at(3, pc_bp(0x500)).unwrap();
        table.insert_at(3, pc_bp(0x600)).unwrap();
        assert_eq!(table.count(), live(&table));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut table = Table::new();
        table.insert(pc_bp(0x300)).unwrap();
        assert!(table.remove(0));
        assert!(!table.remove(0));
        assert!(!table.remove(99));
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn test_enable_from_index() {
        let mut table = Table::new();
        for i in 0..4 {
            table.insert(pc_bp(i)).unwrap();
        }
        table.set_enabled(&[SlotArg::From(2)], false);
        let enabled: Vec<bool> = table.iter().map(|(_, bp)| bp.enabled).collect();
        assert_eq!(enabled, vec![true, true, false, false]);

        table.set_enabled(&[SlotArg::All], false);
        assert!(table.iter().all(|(_, bp)| !bp.enabled));
        table.set_enabled(&[SlotArg::Index(1), SlotArg::Index(40)], true);
        assert!(table.get(1).unwrap().enabled);
    }

    #[test]
    fn test_enable_skips_empty_slots() {
        let mut table = Table::new();
        table.insert(pc_bp(0x300)).unwrap();
        table.set_enabled(&[SlotArg::All], true);
        assert_eq!(table.iter().count(), 1);
        assert!(table.get(2).is_none());
    }

    #[test]
    fn test_clear_via_args() {
        let mut table = Table::new();
        for i in 0..4 {
            table.insert(pc_bp(i)).unwrap();
        }
        table.clear(&[SlotArg::Index(0), SlotArg::Index(2)]);
        assert_eq!(table.count(), 2);
        table.clear(&[SlotArg::All]);
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn test_slot_arg_parse() {
        assert_eq!(SlotArg::parse("*").unwrap(), SlotArg::All);
        assert_eq!(SlotArg::parse("A").unwrap(), SlotArg::Index(10));
        assert_eq!(SlotArg::parse("2*").unwrap(), SlotArg::From(2));
        assert!(SlotArg::parse("zz").is_err());
    }

    #[test]
    fn test_list_format() {
        let mut table = Table::new();
        assert_eq!(table.list(), vec!["  There are no current breakpoints.  (Max: 4)"]);

        let mut bp = Breakpoint::new(BreakpointSource::MemRw, BreakpointOperator::Equal, 0x300, 4, true);
        bp.hit_count = 2;
        table.insert(bp).unwrap();
        let lines = table.list();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "  #0 E  S    T      00000002  0300 R/W M = 0300,0004");
    }
}
