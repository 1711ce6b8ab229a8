//! アドレッシングモードの実装
//!
//! 6502のアドレッシングモードを定義し、実行時のオペランド解決と
//! デバッガ向けの「この命令が触るメモリ」のデコードを行う。

use super::table::{opcode_info, MemAccess, Mnemonic};
use super::{Cpu, CpuType, MemoryBus, Registers, STACK_PAGE};

/// アドレッシングモードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// 暗黙的
    Implied,
    /// アキュムレータ - A
    Accumulator,
    /// 即値（Immediate） - #$nn
    Immediate,
    /// ゼロページ - $nn
    ZeroPage,
    /// ゼロページ,X - $nn,X
    ZeroPageX,
    /// ゼロページ,Y - $nn,Y
    ZeroPageY,
    /// 絶対 - $nnnn
    Absolute,
    /// 絶対,X - $nnnn,X
    AbsoluteX,
    /// 絶対,Y - $nnnn,Y
    AbsoluteY,
    /// 間接 - ($nnnn)
    Indirect,
    /// 間接,X（プリインデックス） - ($nn,X)
    IndirectX,
    /// 間接,Y（ポストインデックス） - ($nn),Y
    IndirectY,
    /// 間接（ゼロページ、65C02のみ） - ($nn)
    IndirectZeroPage,
    /// 絶対間接,X（65C02のJMPのみ） - ($nnnn,X)
    AbsoluteIndirectX,
    /// 相対（ブランチ命令用） - $nn
    Relative,
    /// ゼロページ＋相対（Rockwell BBR/BBS の形） - $nn,$rr
    ZeroPageRelative,
}

impl AddressingMode {
    /// オペコードを含む命令長
    pub fn byte_count(self) -> u16 {
        use AddressingMode::*;
        match self {
            Implied | Accumulator => 1,
            Immediate | ZeroPage | ZeroPageX | ZeroPageY | IndirectX | IndirectY
            | IndirectZeroPage | Relative => 2,
            Absolute | AbsoluteX | AbsoluteY | Indirect | AbsoluteIndirectX
            | ZeroPageRelative => 3,
        }
    }

    /// データとしての実効アドレスを持つか（JMP系の間接は飛び先なので含まない）
    pub fn has_effective_address(self) -> bool {
        use AddressingMode::*;
        matches!(
            self,
            ZeroPage | ZeroPageX | ZeroPageY | Absolute | AbsoluteX | AbsoluteY
                | IndirectX | IndirectY | IndirectZeroPage | ZeroPageRelative
        )
    }

    /// 逆アセンブル用のオペランド書式
    pub fn format_operand(self, b1: u8, b2: u8, pc: u16) -> String {
        use AddressingMode::*;
        let abs = u16::from_le_bytes([b1, b2]);
        match self {
            Implied => String::new(),
            Accumulator => "A".to_string(),
            Immediate => format!("#${:02X}", b1),
            ZeroPage => format!("${:02X}", b1),
            ZeroPageX => format!("${:02X},X", b1),
            ZeroPageY => format!("${:02X},Y", b1),
            Absolute => format!("${:04X}", abs),
            AbsoluteX => format!("${:04X},X", abs),
            AbsoluteY => format!("${:04X},Y", abs),
            Indirect => format!("(${:04X})", abs),
            IndirectX => format!("(${:02X},X)", b1),
            IndirectY => format!("(${:02X}),Y", b1),
            IndirectZeroPage => format!("(${:02X})", b1),
            AbsoluteIndirectX => format!("(${:04X},X)", abs),
            Relative => format!("${:04X}", branch_target(pc.wrapping_add(2), b1)),
            ZeroPageRelative => format!("${:02X},${:04X}", b1, branch_target(pc.wrapping_add(3), b2)),
        }
    }
}

/// 相対オフセットから分岐先を計算
pub fn branch_target(next_pc: u16, offset: u8) -> u16 {
    next_pc.wrapping_add(offset as i8 as u16)
}

/// 命令がアクセスするメモリ位置1つ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemTarget {
    pub address: u16,
    pub access: MemAccess,
}

impl MemTarget {
    fn read(address: u16) -> Self {
        MemTarget { address, access: MemAccess::READ }
    }

    fn write(address: u16) -> Self {
        MemTarget { address, access: MemAccess::WRITE }
    }
}

/// PCの命令が実行時に触るメモリ位置を最大3つデコードする
///
/// 間接モードのポインタ読み出し、スタック操作、実効アドレスを含む。
/// JSR/JMPの飛び先や分岐先、RTS/RTI/BRKの戻り先・ベクタはメモリアクセスとして扱わない。
/// `peek` は副作用なしで読めること。
pub fn operand_targets<F: Fn(u16) -> u8>(
    cpu_type: CpuType,
    regs: &Registers,
    peek: F,
) -> [Option<MemTarget>; 3] {
    let pc = regs.pc;
    let info = opcode_info(cpu_type, peek(pc));
    let b1 = peek(pc.wrapping_add(1));
    let b2 = peek(pc.wrapping_add(2));
    let abs = u16::from_le_bytes([b1, b2]);
    let stack = |offset: u8| STACK_PAGE | regs.sp.wrapping_add(offset) as u16;
    let zp_word = |ptr: u8| u16::from_le_bytes([peek(ptr as u16), peek(ptr.wrapping_add(1) as u16)]);

    let mut targets = [None; 3];

    match info.mnemonic {
        Mnemonic::Pha | Mnemonic::Php | Mnemonic::Phx | Mnemonic::Phy => {
            targets[0] = Some(MemTarget::write(stack(0)));
            return targets;
        }
        Mnemonic::Pla | Mnemonic::Plp | Mnemonic::Plx | Mnemonic::Ply => {
            targets[0] = Some(MemTarget::read(stack(1)));
            return targets;
        }
        Mnemonic::Jsr => {
            targets[0] = Some(MemTarget::write(stack(0)));
            targets[1] = Some(MemTarget::write(stack(0xFF)));
            return targets;
        }
        Mnemonic::Brk => {
            targets[0] = Some(MemTarget::write(stack(0)));
            targets[1] = Some(MemTarget::write(stack(0xFF)));
            targets[2] = Some(MemTarget::write(stack(0xFE)));
            return targets;
        }
        Mnemonic::Rts => {
            targets[0] = Some(MemTarget::read(stack(1)));
            targets[1] = Some(MemTarget::read(stack(2)));
            return targets;
        }
        Mnemonic::Rti => {
            targets[0] = Some(MemTarget::read(stack(1)));
            targets[1] = Some(MemTarget::read(stack(2)));
            targets[2] = Some(MemTarget::read(stack(3)));
            return targets;
        }
        _ => {}
    }

    use AddressingMode::*;
    let effective = match info.mode {
        ZeroPage | ZeroPageRelative => Some(b1 as u16),
        ZeroPageX => Some(b1.wrapping_add(regs.x) as u16),
        ZeroPageY => Some(b1.wrapping_add(regs.y) as u16),
        Absolute => Some(abs),
        AbsoluteX => Some(abs.wrapping_add(regs.x as u16)),
        AbsoluteY => Some(abs.wrapping_add(regs.y as u16)),
        IndirectX => {
            let ptr = b1.wrapping_add(regs.x);
            targets[0] = Some(MemTarget::read(ptr as u16));
            targets[1] = Some(MemTarget::read(ptr.wrapping_add(1) as u16));
            Some(zp_word(ptr))
        }
        IndirectY => {
            targets[0] = Some(MemTarget::read(b1 as u16));
            targets[1] = Some(MemTarget::read(b1.wrapping_add(1) as u16));
            Some(zp_word(b1).wrapping_add(regs.y as u16))
        }
        IndirectZeroPage => {
            targets[0] = Some(MemTarget::read(b1 as u16));
            targets[1] = Some(MemTarget::read(b1.wrapping_add(1) as u16));
            Some(zp_word(b1))
        }
        Indirect => {
            targets[0] = Some(MemTarget::read(abs));
            let high = if cpu_type == CpuType::Cpu6502 {
                // NMOSはページ境界をまたがない
                (abs & 0xFF00) | (abs.wrapping_add(1) & 0x00FF)
            } else {
                abs.wrapping_add(1)
            };
            targets[1] = Some(MemTarget::read(high));
            None
        }
        AbsoluteIndirectX => {
            let ptr = abs.wrapping_add(regs.x as u16);
            targets[0] = Some(MemTarget::read(ptr));
            targets[1] = Some(MemTarget::read(ptr.wrapping_add(1)));
            None
        }
        Implied | Accumulator | Immediate | Relative => None,
    };

    if let Some(address) = effective {
        if !info.access.is_empty() {
            if let Some(slot) = targets.iter_mut().find(|t| t.is_none()) {
                *slot = Some(MemTarget { address, access: info.access });
            }
        }
    }

    targets
}

/// 実行時に解決されたオペランド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Operand {
    None,
    Accumulator,
    Immediate(u8),
    Address(u16),
    Branch(u16),
}

impl Cpu {
    //--------------------------------------------------
    // アドレッシングモードのヘルパー関数
    //--------------------------------------------------

    /// PCから16ビットのオペランドを読む
    fn fetch_word_operand<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let low = self.fetch_byte(memory) as u16;
        let high = self.fetch_byte(memory) as u16;
        (high << 8) | low
    }

    /// ゼロページからポインタを読む（ページ内でラップ）
    fn read_zp_pointer<M: MemoryBus>(&mut self, memory: &mut M, ptr: u8) -> u16 {
        let low = memory.read(ptr as u16) as u16;
        let high = memory.read(ptr.wrapping_add(1) as u16) as u16;
        self.cycles += 2;
        (high << 8) | low
    }

    /// インデックス加算（読み込み時はページ境界でペナルティ）
    fn indexed(&mut self, base: u16, index: u8, write: bool) -> u16 {
        let addr = base.wrapping_add(index as u16);
        if write || (base & 0xFF00) != (addr & 0xFF00) {
            self.cycles += 1;
        }
        addr
    }

    /// モードに従ってオペランドをフェッチ・解決する
    pub(super) fn resolve_operand<M: MemoryBus>(
        &mut self,
        memory: &mut M,
        mode: AddressingMode,
        write: bool,
    ) -> Operand {
        use AddressingMode::*;
        match mode {
            Implied => {
                self.cycles += 1;
                Operand::None
            }
            Accumulator => {
                self.cycles += 1;
                Operand::Accumulator
            }
            Immediate => Operand::Immediate(self.fetch_byte(memory)),
            ZeroPage => Operand::Address(self.fetch_byte(memory) as u16),
            ZeroPageX => {
                let base = self.fetch_byte(memory);
                self.cycles += 1;
                Operand::Address(base.wrapping_add(self.regs.x) as u16)
            }
            ZeroPageY => {
                let base = self.fetch_byte(memory);
                self.cycles += 1;
                Operand::Address(base.wrapping_add(self.regs.y) as u16)
            }
            Absolute => Operand::Address(self.fetch_word_operand(memory)),
            AbsoluteX => {
                let base = self.fetch_word_operand(memory);
                Operand::Address(self.indexed(base, self.regs.x, write))
            }
            AbsoluteY => {
                let base = self.fetch_word_operand(memory);
                Operand::Address(self.indexed(base, self.regs.y, write))
            }
            Indirect => {
                let ptr = self.fetch_word_operand(memory);
                let low = memory.read(ptr) as u16;
                let high_addr = if self.cpu_type == CpuType::Cpu6502 {
                    (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF)
                } else {
                    self.cycles += 1;
                    ptr.wrapping_add(1)
                };
                let high = memory.read(high_addr) as u16;
                self.cycles += 2;
                Operand::Address((high << 8) | low)
            }
            AbsoluteIndirectX => {
                let base = self.fetch_word_operand(memory);
                let ptr = base.wrapping_add(self.regs.x as u16);
                let low = memory.read(ptr) as u16;
                let high = memory.read(ptr.wrapping_add(1)) as u16;
                self.cycles += 3;
                Operand::Address((high << 8) | low)
            }
            IndirectX => {
                let base = self.fetch_byte(memory);
                self.cycles += 1;
                let ptr = base.wrapping_add(self.regs.x);
                Operand::Address(self.read_zp_pointer(memory, ptr))
            }
            IndirectY => {
                let ptr = self.fetch_byte(memory);
                let base = self.read_zp_pointer(memory, ptr);
                Operand::Address(self.indexed(base, self.regs.y, write))
            }
            IndirectZeroPage => {
                let ptr = self.fetch_byte(memory);
                Operand::Address(self.read_zp_pointer(memory, ptr))
            }
            Relative => {
                let offset = self.fetch_byte(memory);
                Operand::Branch(branch_target(self.regs.pc, offset))
            }
            ZeroPageRelative => {
                let zp = self.fetch_byte(memory);
                let _ = self.fetch_byte(memory);
                self.cycles += 1;
                Operand::Address(zp as u16)
            }
        }
    }
}
