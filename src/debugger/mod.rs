//! 6502 デバッガコア
//!
//! ブレークポイント・ウォッチ・ゼロページポインタのテーブル、ステップ実行の
//! 状態機械、停止理由の判定をひとつの `DebugSession` にまとめる。
//! 実機（CPU・メモリ・ビデオ）へは `DebugTarget` トレイト越しにアクセスする。

pub mod breakpoint;
pub mod command;
mod scan;
pub mod script;
mod step_over;
mod stepping;
mod stop_reason;
pub mod table;
pub mod watch;

use std::collections::VecDeque;

use crate::cpu::{opcode_info, CpuType, Registers};
use crate::error::DebugError;

pub use breakpoint::{Breakpoint, BreakpointOperator, BreakpointSource};
pub use scan::Hit;
pub use step_over::StackCheck;
pub use stepping::{SkipRange, StepReport, Steps};
pub use table::{SlotArg, SlotRecord, SlotTable};
pub use watch::{Watch, WatchTarget, ZeroPagePointer};

/// ブレークポイントの最大数
pub const MAX_BREAKPOINTS: usize = 16;
/// ウォッチの最大数
pub const MAX_WATCHES: usize = 6;
/// ゼロページポインタの最大数
pub const MAX_ZEROPAGE_POINTERS: usize = 8;
/// 同時に保持できるDMAブレーク窓
pub const NUM_BREAK_ON_DMA: usize = 3;
/// ステップオーバーの既定ステップ上限
///
/// 経験的な値で、スタックポインタを書き換えるようなコードでは足りないことがある。
pub const DEFAULT_STEP_OVER_MAX_STEPS: u32 = 0xFFFFF;
/// コマンドからの Go が打ち切られるまでのパス数
pub const DEFAULT_RUN_LIMIT: u64 = 0x100_0000;
/// トレースバッファの既定行数
pub const DEFAULT_TRACE_BUFFER_LIMIT: usize = 10000;

bitflags::bitflags! {
    /// BRK・非公式命令で停止するかどうか
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BreakOnInvalid: u8 {
        const BRK      = 0b0001;
        const INVALID1 = 0b0010;
        const INVALID2 = 0b0100;
        const INVALID3 = 0b1000;
    }
}

impl BreakOnInvalid {
    /// 分類番号（0=BRK, 1〜3=非公式命令の長さ）から
    pub fn class(index: u16) -> Self {
        match index {
            0 => BreakOnInvalid::BRK,
            1 => BreakOnInvalid::INVALID1,
            2 => BreakOnInvalid::INVALID2,
            3 => BreakOnInvalid::INVALID3,
            _ => BreakOnInvalid::empty(),
        }
    }
}

/// アプリケーションのモード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// デバッガ外で通常実行
    Running,
    /// 停止してコマンド待ち
    Debug,
    /// ステップ実行中
    Stepping,
}

/// 周辺カードによるDMA転送1回分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaTransfer {
    pub address: u16,
    pub size: u16,
    /// true: カード→メモリ、false: メモリ→カード
    pub to_memory: bool,
}

/// メモリブレークポイントにかかったDMA転送
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaWindow {
    pub start: u16,
    pub end: u16,
    pub to_memory: bool,
    /// 一致したブレークポイントのスロット
    pub breakpoint: usize,
}

/// I/O領域（またはROM）に対するDMA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaIoAccess {
    pub address: u16,
    pub to_memory: bool,
}

/// デバッガから見たマシン
pub trait DebugTarget {
    fn cpu_type(&self) -> CpuType;
    fn registers(&self) -> &Registers;
    fn registers_mut(&mut self) -> &mut Registers;
    /// 1命令（または割り込みエントリ）を実行する
    ///
    /// `reinit` は新しい Go の最初の1命令で true になる。
    fn single_step(&mut self, reinit: bool);
    fn was_last_execution_interrupt(&self) -> bool;
    /// 副作用なしの読み取り
    fn peek(&self, address: u16) -> u8;
    fn poke(&mut self, address: u16, value: u8);
    /// PCを置いてよいメモリか（I/Oやフローティングバスは false）
    fn is_code_memory(&self, address: u16) -> bool;
    /// ビデオスキャナの垂直位置（呼ぶたびに再計算）
    fn video_vertical_position(&self) -> u16;
    fn video_line_count(&self) -> u16;
    /// 前回の呼び出し以降に行われたDMA転送
    fn take_dma_transfers(&mut self) -> Vec<DmaTransfer>;
    /// 累積サイクル数
    fn cycles(&self) -> u64;
}

/// デバッガの状態をすべて保持する
#[derive(Debug, Clone)]
pub struct DebugSession {
    pub breakpoints: SlotTable<Breakpoint, MAX_BREAKPOINTS>,
    pub watches: SlotTable<Watch, MAX_WATCHES>,
    pub zero_page: SlotTable<ZeroPagePointer, MAX_ZEROPAGE_POINTERS>,

    pub break_on_invalid: BreakOnInvalid,
    /// 指定オペコードで停止（BRKは指定できない）
    pub break_on_opcode: Option<u8>,
    pub break_on_interrupt: bool,

    pub mode: AppMode,
    steps: Steps,
    step_until: Option<u16>,
    skip_range: Option<SkipRange>,
    reinit: bool,
    /// GG: 1命令ごとの表示更新をしない
    full_speed: bool,
    /// 直前のパスで停止した命令を、次は必ず1つ実行する
    force_single_step: bool,
    /// TL 実行時にサイクル数を報告する
    count_cycles: bool,
    step_start_cycles: u64,

    /// 最後に実行した制御フロー命令のアドレス（LBR）
    pub last_branch: Option<u16>,
    /// 最後に一致したメモリブレークポイントのアドレス
    pub last_mem_address: Option<u16>,
    dma_io: Option<DmaIoAccess>,
    dma_windows: [Option<DmaWindow>; NUM_BREAK_ON_DMA],

    /// ステップオーバーの上限ステップ数
    pub step_over_max_steps: u32,
    /// コマンドから G/RET を実行したときの上限パス数
    pub run_limit: u64,

    opcode_counts: Box<[u32; 256]>,
    pub trace_enabled: bool,
    trace_buffer: VecDeque<String>,
    trace_buffer_limit: usize,
}

impl Default for DebugSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugSession {
    pub fn new() -> Self {
        DebugSession {
            breakpoints: SlotTable::new(),
            watches: SlotTable::new(),
            zero_page: SlotTable::new(),
            break_on_invalid: BreakOnInvalid::empty(),
            break_on_opcode: None,
            break_on_interrupt: false,
            mode: AppMode::Running,
            steps: Steps::Remaining(0),
            step_until: None,
            skip_range: None,
            reinit: false,
            full_speed: false,
            force_single_step: false,
            count_cycles: false,
            step_start_cycles: 0,
            last_branch: None,
            last_mem_address: None,
            dma_io: None,
            dma_windows: [None; NUM_BREAK_ON_DMA],
            step_over_max_steps: DEFAULT_STEP_OVER_MAX_STEPS,
            run_limit: DEFAULT_RUN_LIMIT,
            opcode_counts: Box::new([0; 256]),
            trace_enabled: false,
            trace_buffer: VecDeque::new(),
            trace_buffer_limit: DEFAULT_TRACE_BUFFER_LIMIT,
        }
    }

    /// 設定ファイルの値で初期化
    pub fn with_config(config: &crate::config::Config) -> Self {
        let mut session = Self::new();
        session.break_on_invalid = BreakOnInvalid::from_bits_truncate(config.break_on_invalid);
        session.break_on_opcode = config.break_on_opcode.filter(|&op| op != 0x00);
        session.break_on_interrupt = config.break_on_interrupt;
        session.step_over_max_steps = config.step_over_max_steps;
        session.trace_buffer_limit = config.trace_buffer_limit;
        session
    }

    /// 通常実行からデバッガに入る
    pub fn enter_debugger(&mut self) {
        log::debug!("mode: {:?} -> Debug", self.mode);
        self.mode = AppMode::Debug;
    }

    /// デバッガを抜けて通常実行に戻る
    pub fn exit_debugger(&mut self) {
        log::debug!("mode: {:?} -> Running", self.mode);
        self.reset_stepping();
        self.mode = AppMode::Running;
    }

    // ---- ブレークポイント ----

    /// 空きスロットにブレークポイントを追加
    pub fn add_breakpoint<T: DebugTarget + ?Sized>(&mut self, target: &T, bp: Breakpoint) -> Result<usize, DebugError> {
        let bp = Self::checked_breakpoint(target, bp)?;
        self.breakpoints.insert(bp)
    }

    /// 指定スロットにブレークポイントを配置（保存ファイルの復元用）
    pub fn place_breakpoint<T: DebugTarget + ?Sized>(
        &mut self,
        target: &T,
        slot: usize,
        bp: Breakpoint,
    ) -> Result<(), DebugError> {
        let bp = Self::checked_breakpoint(target, bp)?;
        self.breakpoints.insert_at(slot, bp)
    }

    /// 長さ0を拒否し、ビデオブレークポイントをマシンのライン数に収める
    fn checked_breakpoint<T: DebugTarget + ?Sized>(target: &T, bp: Breakpoint) -> Result<Breakpoint, DebugError> {
        if bp.length == 0 {
            return Err(DebugError::InvalidRange(format!(
                "Breakpoint length must be non-zero (${:04X},0)",
                bp.address
            )));
        }
        Ok(clamp_video(bp, target.video_line_count()))
    }

    /// ヒット済みの一時ブレークポイントを削除し、全ヒットフラグを落とす
    pub fn clear_temp_breakpoints(&mut self) {
        for slot in 0..MAX_BREAKPOINTS {
            let remove = match self.breakpoints.get_mut(slot) {
                Some(bp) if bp.is_valid() => {
                    let remove = bp.hit && bp.temp;
                    bp.hit = false;
                    remove
                }
                _ => false,
            };
            if remove {
                log::debug!("temp breakpoint #{:X} removed", slot);
                self.breakpoints.remove(slot);
            }
        }
    }

    /// アドレスを含むPCブレークポイントの状態（逆アセンブル表示用）
    ///
    /// 戻り値は (使用中, 有効)。
    pub fn breakpoint_at(&self, address: u16) -> Option<(bool, bool)> {
        self.breakpoints
            .iter()
            .map(|(_, bp)| bp)
            .find(|bp| {
                bp.source == BreakpointSource::RegPc
                    && bp.operator == BreakpointOperator::Equal
                    && bp.matches(address as u32)
            })
            .map(|bp| (bp.set, bp.enabled))
    }

    // ---- ウォッチ / ゼロページポインタ ----

    /// ウォッチを追加する（`slot` 指定時はそこから順に配置）
    pub fn add_watches(
        &mut self,
        slot: Option<usize>,
        targets: &[WatchTarget],
    ) -> Result<Vec<usize>, DebugError> {
        for target in targets {
            if let WatchTarget::Memory(address) = *target {
                if !Watch::is_watchable(address) {
                    return Err(DebugError::InvalidRange(
                        "You cannot watch an I/O location.".to_string(),
                    ));
                }
            }
        }
        if let Some(start) = slot {
            if start >= MAX_WATCHES {
                return Err(DebugError::InvalidRange(format!(
                    "Watch index too big.  (Max: {})",
                    MAX_WATCHES - 1
                )));
            }
        }
        place_sequential(&mut self.watches, slot, targets.iter().map(|&t| Watch::new(t)))
    }

    /// ゼロページポインタを追加する
    pub fn add_zero_page_pointers(
        &mut self,
        slot: Option<usize>,
        addresses: &[u16],
    ) -> Result<Vec<usize>, DebugError> {
        if addresses.iter().any(|&a| a > 0xFF) {
            return Err(DebugError::InvalidRange(
                "Zero page pointer must be in the range: [00..FF].".to_string(),
            ));
        }
        if let Some(start) = slot {
            if start >= MAX_ZEROPAGE_POINTERS {
                return Err(DebugError::InvalidRange(format!(
                    "Zero page pointer index too big.  (Max: {})",
                    MAX_ZEROPAGE_POINTERS - 1
                )));
            }
        }
        place_sequential(
            &mut self.zero_page,
            slot,
            addresses.iter().map(|&a| ZeroPagePointer::new(a as u8)),
        )
    }

    /// `ZP0`〜`ZP7`: アドレス指定で設定、省略で無効化
    pub fn set_zero_page_pointer(&mut self, slot: usize, address: Option<u16>) -> Result<(), DebugError> {
        if slot >= MAX_ZEROPAGE_POINTERS {
            return Err(self.zero_page.invalid_slot(slot));
        }
        match address {
            Some(address) if address > 0xFF => Err(DebugError::InvalidRange(
                "Zero page pointer must be in the range: [00..FF].".to_string(),
            )),
            Some(address) => self.zero_page.insert_at(slot, ZeroPagePointer::new(address as u8)),
            None => {
                if let Some(zp) = self.zero_page.get_mut(slot) {
                    zp.enabled = false;
                }
                Ok(())
            }
        }
    }

    /// 有効なウォッチの現在値
    pub fn watch_values<T: DebugTarget + ?Sized>(&self, target: &T) -> Vec<String> {
        self.watches
            .iter()
            .filter(|(_, w)| w.enabled)
            .map(|(slot, w)| match w.target {
                WatchTarget::Memory(address) => {
                    let lo = target.peek(address);
                    let hi = target.peek(address.wrapping_add(1));
                    format!("W{} {:04X}: {:02X} {:02X}  ({:04X})", slot, address, lo, hi, u16::from_le_bytes([lo, hi]))
                }
                WatchTarget::VideoScanner => {
                    format!("W{} vpos: {:04X}", slot, target.video_vertical_position())
                }
                WatchTarget::None => format!("W{} ----", slot),
            })
            .collect()
    }

    /// 有効なゼロページポインタと指し先
    pub fn zero_page_values<T: DebugTarget + ?Sized>(&self, target: &T) -> Vec<String> {
        self.zero_page
            .iter()
            .filter(|(_, zp)| zp.enabled)
            .map(|(slot, zp)| {
                let lo = target.peek(zp.address as u16);
                let hi = target.peek(zp.address.wrapping_add(1) as u16);
                let pointer = u16::from_le_bytes([lo, hi]);
                format!("ZP{} {:02X}: {:04X} -> {:02X}", slot, zp.address, pointer, target.peek(pointer))
            })
            .collect()
    }

    // ---- プロファイル / トレース ----

    /// 実行回数の多いオペコード
    pub fn hot_opcodes(&self, top_n: usize) -> Vec<(u8, u32)> {
        let mut opcodes: Vec<(u8, u32)> = self
            .opcode_counts
            .iter()
            .enumerate()
            .map(|(i, &count)| (i as u8, count))
            .filter(|(_, count)| *count > 0)
            .collect();

        opcodes.sort_by(|a, b| b.1.cmp(&a.1));
        opcodes.truncate(top_n);
        opcodes
    }

    pub fn clear_profile(&mut self) {
        self.opcode_counts.fill(0);
    }

    /// 直近のトレース行
    pub fn trace_lines(&self, last_n: usize) -> Vec<&str> {
        let start = self.trace_buffer.len().saturating_sub(last_n);
        self.trace_buffer.iter().skip(start).map(String::as_str).collect()
    }

    pub fn clear_trace(&mut self) {
        self.trace_buffer.clear();
    }

    fn push_trace(&mut self, line: String) {
        self.trace_buffer.push_back(line);
        while self.trace_buffer.len() > self.trace_buffer_limit {
            self.trace_buffer.pop_front();
        }
    }
}

/// 先頭の空き、または指定スロットから順にレコードを置く
///
/// 途中で満杯になった場合は、それまでに置けた分を返す。
fn place_sequential<R: SlotRecord, const N: usize>(
    table: &mut SlotTable<R, N>,
    slot: Option<usize>,
    records: impl Iterator<Item = R>,
) -> Result<Vec<usize>, DebugError> {
    let mut placed = Vec::new();
    let mut next = slot;
    for record in records {
        let result = match next {
            Some(index) if index < N => table.insert_at(index, record).map(|_| index),
            Some(_) => Err(DebugError::TableFull { kind: R::KIND, capacity: N }),
            None => table.insert(record),
        };
        match result {
            Ok(index) => {
                placed.push(index);
                next = next.map(|i| i + 1);
            }
            Err(err) if placed.is_empty() => return Err(err),
            Err(_) => break,
        }
    }
    Ok(placed)
}

/// 1命令分の逆アセンブル（`0300: 20 10 03  JSR $0310`）
pub fn disassemble<T: DebugTarget + ?Sized>(target: &T, pc: u16) -> String {
    let opcode = target.peek(pc);
    let info = opcode_info(target.cpu_type(), opcode);
    let b1 = target.peek(pc.wrapping_add(1));
    let b2 = target.peek(pc.wrapping_add(2));
    let bytes = match info.len() {
        1 => format!("{:02X}      ", opcode),
        2 => format!("{:02X} {:02X}   ", opcode, b1),
        _ => format!("{:02X} {:02X} {:02X}", opcode, b1, b2),
    };
    let mnemonic = if info.undocumented {
        info.mnemonic.name().to_ascii_lowercase()
    } else {
        info.mnemonic.name().to_string()
    };
    let operand = info.mode.format_operand(b1, b2, pc);
    format!("{:04X}: {}  {} {}", pc, bytes, mnemonic, operand).trim_end().to_string()
}

/// レジスタ表示（`A=00 X=00 Y=00 P=..-..I.. S=FD`）
pub fn format_registers(regs: &Registers) -> String {
    format!(
        "A={:02X} X={:02X} Y={:02X} P={} S={:02X}",
        regs.a,
        regs.x,
        regs.y,
        regs.flags_string(),
        regs.sp
    )
}

/// ビデオブレークポイントのアドレスと長さをライン数に収める
fn clamp_video(mut bp: Breakpoint, lines: u16) -> Breakpoint {
    if bp.source == BreakpointSource::VideoScanner {
        let lines = lines.max(1) as u32;
        if bp.address as u32 >= lines {
            bp.address = (lines - 1) as u16;
        }
        if bp.address as u32 + bp.length >= lines {
            bp.length = lines - bp.address as u32;
        }
    }
    bp
}
