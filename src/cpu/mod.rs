//! MOS 6502/65C02 CPU Emulator
//!
//! デバッガから1命令単位で駆動されるCPUコア。
//! デコードは `table` のオペコード表、実行は `opcodes` に分離している。

pub mod addressing;
mod opcodes;
pub mod table;

use serde::{Deserialize, Serialize};

pub use addressing::{operand_targets, AddressingMode, MemTarget};
pub use table::{opcode_info, MemAccess, Mnemonic, OpcodeInfo};

/// CPUのステータスレジスタのフラグビット
pub mod flags {
    pub const CARRY: u8 = 0b0000_0001;      // C: キャリーフラグ
    pub const ZERO: u8 = 0b0000_0010;       // Z: ゼロフラグ
    pub const IRQ_DISABLE: u8 = 0b0000_0100; // I: 割り込み禁止フラグ
    pub const DECIMAL: u8 = 0b0000_1000;    // D: BCDモードフラグ
    pub const BREAK: u8 = 0b0001_0000;      // B: ブレークフラグ
    pub const UNUSED: u8 = 0b0010_0000;     // 未使用（常に1）
    pub const OVERFLOW: u8 = 0b0100_0000;   // V: オーバーフローフラグ
    pub const NEGATIVE: u8 = 0b1000_0000;   // N: 負数フラグ
}

/// スタックページの先頭アドレス
pub const STACK_PAGE: u16 = 0x0100;

/// CPUの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuType {
    /// オリジナルのNMOS 6502 (Apple II, II+)
    #[serde(rename = "6502")]
    Cpu6502,
    /// CMOS 65C02 (Apple IIe Enhanced, IIc)
    #[serde(rename = "65c02")]
    Cpu65C02,
}

impl std::str::FromStr for CpuType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "6502" => Ok(CpuType::Cpu6502),
            "65c02" => Ok(CpuType::Cpu65C02),
            other => Err(format!("unknown cpu type '{}'", other)),
        }
    }
}

/// CPUレジスタの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    /// アキュムレータ（A）
    pub a: u8,
    /// Xインデックスレジスタ
    pub x: u8,
    /// Yインデックスレジスタ
    pub y: u8,
    /// スタックポインタ
    pub sp: u8,
    /// プログラムカウンタ
    pub pc: u16,
    /// ステータスレジスタ（プロセッサフラグ）
    pub status: u8,
}

impl Default for Registers {
    fn default() -> Self {
        Registers {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,  // スタックは$01FDから開始
            pc: 0,
            status: flags::UNUSED | flags::IRQ_DISABLE,
        }
    }
}

impl Registers {
    /// フラグをセット
    pub fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.status |= flag;
        } else {
            self.status &= !flag;
        }
    }

    /// フラグを取得
    pub fn get_flag(&self, flag: u8) -> bool {
        (self.status & flag) != 0
    }

    /// ゼロフラグと負数フラグを値に基づいて更新
    pub fn update_zero_negative_flags(&mut self, value: u8) {
        self.set_flag(flags::ZERO, value == 0);
        self.set_flag(flags::NEGATIVE, (value & 0x80) != 0);
    }

    /// `NV-BDIZC` 形式のフラグ文字列
    pub fn flags_string(&self) -> String {
        const NAMES: [char; 8] = ['N', 'V', '-', 'B', 'D', 'I', 'Z', 'C'];
        NAMES
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                if self.status & (0x80 >> i) != 0 { c } else { '.' }
            })
            .collect()
    }
}

/// メモリバスインターフェース
/// CPUがメモリにアクセスするために必要なトレイト
pub trait MemoryBus {
    /// メモリから1バイト読み取り
    fn read(&mut self, address: u16) -> u8;
    /// メモリに1バイト書き込み
    fn write(&mut self, address: u16, value: u8);
}

/// 6502 CPUエミュレータ
#[derive(Debug, Clone)]
pub struct Cpu {
    /// CPUレジスタ
    pub regs: Registers,
    /// CPUの種類（6502 or 65C02）
    pub cpu_type: CpuType,
    /// 累積サイクル数
    pub total_cycles: u64,
    /// 現在の命令で消費したサイクル
    pub cycles: u32,
    /// IRQ（割り込み要求）ライン
    pub irq_pending: bool,
    /// NMI（ノンマスカブル割り込み）ライン
    pub nmi_pending: bool,
    /// NMI検出のためのエッジ検出
    nmi_edge_detected: bool,
    /// 前回のNMIライン状態
    prev_nmi: bool,
    /// 直前の step が割り込みエントリだったか
    last_was_interrupt: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(CpuType::Cpu6502)
    }
}

impl Cpu {
    /// 新しいCPUインスタンスを作成
    pub fn new(cpu_type: CpuType) -> Self {
        Cpu {
            regs: Registers::default(),
            cpu_type,
            total_cycles: 0,
            cycles: 0,
            irq_pending: false,
            nmi_pending: false,
            nmi_edge_detected: false,
            prev_nmi: false,
            last_was_interrupt: false,
        }
    }

    /// CPUをリセット
    pub fn reset<M: MemoryBus>(&mut self, memory: &mut M) {
        self.regs = Registers::default();
        // リセットベクター（$FFFC-$FFFD）からPCを読み込み
        let low = memory.read(0xFFFC) as u16;
        let high = memory.read(0xFFFD) as u16;
        self.regs.pc = (high << 8) | low;
        self.cycles = 7;
        self.total_cycles += 7;
        self.last_was_interrupt = false;
    }

    /// 直前の `step` がNMI/IRQのエントリだったか
    pub fn was_last_execution_interrupt(&self) -> bool {
        self.last_was_interrupt
    }

    /// 割り込みシーケンス（NMI/IRQ共通）
    fn enter_interrupt<M: MemoryBus>(&mut self, memory: &mut M, vector: u16) {
        self.push_word(memory, self.regs.pc);
        // Bフラグはクリアしてプッシュ
        let status = (self.regs.status | flags::UNUSED) & !flags::BREAK;
        self.push_byte(memory, status);
        self.regs.set_flag(flags::IRQ_DISABLE, true);
        if self.cpu_type == CpuType::Cpu65C02 {
            self.regs.set_flag(flags::DECIMAL, false);
        }
        let low = memory.read(vector) as u16;
        let high = memory.read(vector.wrapping_add(1)) as u16;
        self.regs.pc = (high << 8) | low;
        self.cycles += 7;
    }

    /// 1命令（または割り込みエントリ）を実行し、消費したサイクル数を返す
    pub fn step<M: MemoryBus>(&mut self, memory: &mut M) -> u32 {
        self.cycles = 0;
        self.last_was_interrupt = false;

        // NMIのエッジ検出
        if self.nmi_pending && !self.prev_nmi {
            self.nmi_edge_detected = true;
        }
        self.prev_nmi = self.nmi_pending;

        if self.nmi_edge_detected {
            self.nmi_edge_detected = false;
            self.enter_interrupt(memory, 0xFFFA);
            self.last_was_interrupt = true;
        } else if self.irq_pending && !self.regs.get_flag(flags::IRQ_DISABLE) {
            self.enter_interrupt(memory, 0xFFFE);
            self.last_was_interrupt = true;
        } else {
            let opcode = self.fetch_byte(memory);
            self.execute_opcode(memory, opcode);
        }

        self.total_cycles += self.cycles as u64;
        self.cycles
    }

    /// PCから1バイトフェッチしてPCをインクリメント
    fn fetch_byte<M: MemoryBus>(&mut self, memory: &mut M) -> u8 {
        let value = memory.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 1;
        value
    }

    /// スタックに1バイトプッシュ
    fn push_byte<M: MemoryBus>(&mut self, memory: &mut M, value: u8) {
        memory.write(STACK_PAGE | self.regs.sp as u16, value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    /// スタックから1バイトポップ
    fn pop_byte<M: MemoryBus>(&mut self, memory: &mut M) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        memory.read(STACK_PAGE | self.regs.sp as u16)
    }

    /// スタックに2バイトプッシュ（上位バイト先）
    fn push_word<M: MemoryBus>(&mut self, memory: &mut M, value: u16) {
        self.push_byte(memory, (value >> 8) as u8);
        self.push_byte(memory, value as u8);
    }

    /// スタックから2バイトポップ
    fn pop_word<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let low = self.pop_byte(memory) as u16;
        let high = self.pop_byte(memory) as u16;
        (high << 8) | low
    }
}
