//! ブレークポイントのレコードと条件評価

use std::fmt;
use std::str::FromStr;

use super::table::SlotRecord;
use crate::error::DebugError;

/// ブレークポイントの監視対象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakpointSource {
    RegA,
    RegX,
    RegY,
    #[default]
    RegPc,
    RegS,
    RegP,
    /// オペコード
    Opcode,
    /// メモリ読み書き
    MemRw,
    /// メモリ読み取りのみ
    MemRead,
    /// メモリ書き込みのみ
    MemWrite,
    /// ビデオスキャナの垂直位置
    VideoScanner,
}

impl BreakpointSource {
    /// コマンド引数・保存形式で使う名前
    pub fn name(self) -> &'static str {
        match self {
            BreakpointSource::RegA => "A",
            BreakpointSource::RegX => "X",
            BreakpointSource::RegY => "Y",
            BreakpointSource::RegPc => "PC",
            BreakpointSource::RegS => "S",
            BreakpointSource::RegP => "P",
            BreakpointSource::Opcode => "OP",
            BreakpointSource::MemRw => "M",
            BreakpointSource::MemRead => "MR",
            BreakpointSource::MemWrite => "MW",
            BreakpointSource::VideoScanner => "V",
        }
    }

    pub fn is_register(self) -> bool {
        matches!(
            self,
            BreakpointSource::RegA
                | BreakpointSource::RegX
                | BreakpointSource::RegY
                | BreakpointSource::RegPc
                | BreakpointSource::RegS
                | BreakpointSource::RegP
        )
    }

    pub fn is_memory(self) -> bool {
        matches!(
            self,
            BreakpointSource::MemRw | BreakpointSource::MemRead | BreakpointSource::MemWrite
        )
    }
}

impl FromStr for BreakpointSource {
    type Err = DebugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(BreakpointSource::RegA),
            "X" => Ok(BreakpointSource::RegX),
            "Y" => Ok(BreakpointSource::RegY),
            "PC" => Ok(BreakpointSource::RegPc),
            "S" | "SP" => Ok(BreakpointSource::RegS),
            "P" => Ok(BreakpointSource::RegP),
            "OP" => Ok(BreakpointSource::Opcode),
            "M" => Ok(BreakpointSource::MemRw),
            "MR" => Ok(BreakpointSource::MemRead),
            "MW" => Ok(BreakpointSource::MemWrite),
            "V" => Ok(BreakpointSource::VideoScanner),
            other => Err(DebugError::Syntax(format!("unknown breakpoint source '{}'", other))),
        }
    }
}

impl fmt::Display for BreakpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 比較演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakpointOperator {
    LessEqual,
    LessThan,
    /// `[address, address+length)` に含まれる
    #[default]
    Equal,
    /// `[address, address+length)` に含まれない
    NotEqual,
    GreaterThan,
    GreaterEqual,
}

impl BreakpointOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BreakpointOperator::LessEqual => "<=",
            BreakpointOperator::LessThan => "<",
            BreakpointOperator::Equal => "=",
            BreakpointOperator::NotEqual => "!=",
            BreakpointOperator::GreaterThan => ">",
            BreakpointOperator::GreaterEqual => ">=",
        }
    }
}

impl FromStr for BreakpointOperator {
    type Err = DebugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<=" => Ok(BreakpointOperator::LessEqual),
            "<" => Ok(BreakpointOperator::LessThan),
            "=" | "==" => Ok(BreakpointOperator::Equal),
            "!=" | "<>" | "!" => Ok(BreakpointOperator::NotEqual),
            ">" => Ok(BreakpointOperator::GreaterThan),
            ">=" => Ok(BreakpointOperator::GreaterEqual),
            other => Err(DebugError::Syntax(format!("unknown operator '{}'", other))),
        }
    }
}

impl fmt::Display for BreakpointOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// ブレークポイント1スロット分
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakpoint {
    pub source: BreakpointSource,
    pub operator: BreakpointOperator,
    /// 範囲の先頭、または比較値
    pub address: u16,
    /// 範囲の幅（0なら空き）
    pub length: u32,
    pub set: bool,
    pub enabled: bool,
    /// ヒット後、次のステップ開始時に削除
    pub temp: bool,
    /// falseならヒットを数えるだけで停止しない
    pub stop: bool,
    pub hit: bool,
    pub hit_count: u32,
}

impl Breakpoint {
    pub fn new(
        source: BreakpointSource,
        operator: BreakpointOperator,
        address: u16,
        length: u32,
        temp: bool,
    ) -> Self {
        Breakpoint {
            source,
            operator,
            address,
            length: length.min(0x10000),
            set: true,
            enabled: true,
            temp,
            stop: true,
            hit: false,
            hit_count: 0,
        }
    }

    /// 比較値に対して条件が成立するか
    pub fn matches(&self, value: u32) -> bool {
        let start = self.address as u32;
        let end = start + self.length;
        match self.operator {
            BreakpointOperator::LessEqual => value <= start,
            BreakpointOperator::LessThan => value < start,
            BreakpointOperator::Equal => value >= start && value < end,
            BreakpointOperator::NotEqual => value < start || value >= end,
            BreakpointOperator::GreaterThan => value > start,
            BreakpointOperator::GreaterEqual => value >= start,
        }
    }

    /// `[value, value+size)` がブレークポイントの範囲と重なるか
    ///
    /// `=` 以外の演算子で呼ぶのは内部エラー。
    pub fn matches_range(&self, value: u32, size: u32) -> bool {
        assert_eq!(
            self.operator,
            BreakpointOperator::Equal,
            "range check on a non-equal breakpoint"
        );
        let start = self.address as u32;
        (value >= start && value < start + self.length) || (start >= value && start < value + size)
    }

    /// ヒットを記録し、停止すべきかを返す
    pub fn record_hit(&mut self) -> bool {
        self.hit = true;
        self.hit_count += 1;
        self.stop
    }

    /// 走査対象か（有効かつ空きでない）
    pub fn is_valid(&self) -> bool {
        self.enabled && self.length != 0
    }

    /// 範囲の最終アドレス（表示用）
    pub fn end_address(&self) -> u16 {
        (self.address as u32 + self.length.max(1) - 1).min(0xFFFF) as u16
    }
}

impl SlotRecord for Breakpoint {
    const KIND: &'static str = "breakpoints";

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
        self.address
    }

    fn is_stop(&self) -> bool {
        self.stop
    }

    fn is_temp(&self) -> bool {
        self.temp
    }

    fn is_hit(&self) -> bool {
        self.hit
    }

    fn hit_count(&self) -> u32 {
        self.hit_count
    }

    fn access_label(&self) -> &'static str {
        match self.source {
            BreakpointSource::MemRead => "R  ",
            BreakpointSource::MemWrite => "W  ",
            BreakpointSource::MemRw => "R/W",
            _ => "   ",
        }
    }

    fn detail(&self) -> String {
        format!("{} {} {:04X},{:04X}", self.source, self.operator, self.address, self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bp(operator: BreakpointOperator) -> Breakpoint {
        Breakpoint::new(BreakpointSource::RegPc, operator, 0x0300, 4, false)
    }

    #[test]
    fn test_equal_is_half_open() {
        let eq = bp(BreakpointOperator::Equal);
        assert!(eq.matches(0x300));
        assert!(eq.matches(0x303));
        assert!(!eq.matches(0x304));
        assert!(!eq.matches(0x2FF));

        let ne = bp(BreakpointOperator::NotEqual);
        assert!(ne.matches(0x304));
        assert!(ne.matches(0x2FF));
        assert!(!ne.matches(0x300));
        assert!(!ne.matches(0x303));
    }

    #[test]
    fn test_ordering_operators() {
        assert!(bp(BreakpointOperator::LessEqual).matches(0x300));
        assert!(!bp(BreakpointOperator::LessThan).matches(0x300));
        assert!(bp(BreakpointOperator::LessThan).matches(0x2FF));
        assert!(!bp(BreakpointOperator::GreaterThan).matches(0x300));
        assert!(bp(BreakpointOperator::GreaterThan).matches(0x301));
        assert!(bp(BreakpointOperator::GreaterEqual).matches(0x300));
    }

    #[test]
    fn test_range_overlap_is_symmetric() {
        let b = bp(BreakpointOperator::Equal);
        // 範囲がブレークポイントを覆う
        assert!(b.matches_range(0x200, 0x200));
        // 先頭だけ重なる
        assert!(b.matches_range(0x2FF, 2));
        // 末尾だけ重なる
        assert!(b.matches_range(0x303, 0x10));
        assert!(!b.matches_range(0x304, 0x10));
        assert!(!b.matches_range(0x2F0, 0x10));
    }

    #[test]
    #[should_panic]
    fn test_range_check_rejects_other_operators() {
        bp(BreakpointOperator::GreaterThan).matches_range(0x300, 1);
    }

    #[test]
    fn test_record_hit() {
        let mut b = bp(BreakpointOperator::Equal);
        assert!(b.record_hit());
        b.stop = false;
        assert!(!b.record_hit());
        assert!(b.hit);
        assert_eq!(b.hit_count, 2);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("pc".parse::<BreakpointSource>().unwrap(), BreakpointSource::RegPc);
        assert_eq!("MW".parse::<BreakpointSource>().unwrap(), BreakpointSource::MemWrite);
        assert!("Q".parse::<BreakpointSource>().is_err());
        assert_eq!("<>".parse::<BreakpointOperator>().unwrap(), BreakpointOperator::NotEqual);
        assert_eq!("==".parse::<BreakpointOperator>().unwrap(), BreakpointOperator::Equal);
        for op in [
            BreakpointOperator::LessEqual,
            BreakpointOperator::LessThan,
            BreakpointOperator::Equal,
            BreakpointOperator::NotEqual,
            BreakpointOperator::GreaterThan,
            BreakpointOperator::GreaterEqual,
        ] {
            assert_eq!(op.symbol().parse::<BreakpointOperator>().unwrap(), op);
        }
    }
}
