//! オペコード表
//!
//! 6502/65C02の全256オペコードについてニーモニック、アドレッシングモード、
//! メモリアクセス方向、非公式命令かどうかを引けるようにする。

use super::addressing::AddressingMode;
use super::CpuType;

bitflags::bitflags! {
    /// 命令が実効アドレスに対して行うアクセス
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MemAccess: u8 {
        const READ  = 0b01;
        const WRITE = 0b10;
    }
}

/// ニーモニック
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Bra, Brk, Bvc, Bvs,
    Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny,
    Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Phx, Phy, Pla, Plp,
    Plx, Ply, Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Stz,
    Tax, Tay, Trb, Tsb, Tsx, Txa, Txs, Tya,
    // NMOS 非公式命令
    Slo, Rla, Sre, Rra, Sax, Lax, Dcp, Isc, Anc, Alr, Arr, Xaa, Axs, Ahx,
    Shx, Shy, Tas, Las, Kil,
}

impl Mnemonic {
    /// 表示用の名前（大文字）
    pub fn name(self) -> &'static str {
        use Mnemonic::*;
        match self {
            Adc => "ADC", And => "AND", Asl => "ASL", Bcc => "BCC", Bcs => "BCS",
            Beq => "BEQ", Bit => "BIT", Bmi => "BMI", Bne => "BNE", Bpl => "BPL",
            Bra => "BRA", Brk => "BRK", Bvc => "BVC", Bvs => "BVS", Clc => "CLC",
            Cld => "CLD", Cli => "CLI", Clv => "CLV", Cmp => "CMP", Cpx => "CPX",
            Cpy => "CPY", Dec => "DEC", Dex => "DEX", Dey => "DEY", Eor => "EOR",
            Inc => "INC", Inx => "INX", Iny => "INY", Jmp => "JMP", Jsr => "JSR",
            Lda => "LDA", Ldx => "LDX", Ldy => "LDY", Lsr => "LSR", Nop => "NOP",
            Ora => "ORA", Pha => "PHA", Php => "PHP", Phx => "PHX", Phy => "PHY",
            Pla => "PLA", Plp => "PLP", Plx => "PLX", Ply => "PLY", Rol => "ROL",
            Ror => "ROR", Rti => "RTI", Rts => "RTS", Sbc => "SBC", Sec => "SEC",
            Sed => "SED", Sei => "SEI", Sta => "STA", Stx => "STX", Sty => "STY",
            Stz => "STZ", Tax => "TAX", Tay => "TAY", Trb => "TRB", Tsb => "TSB",
            Tsx => "TSX", Txa => "TXA", Txs => "TXS", Tya => "TYA",
            Slo => "SLO", Rla => "RLA", Sre => "SRE", Rra => "RRA", Sax => "SAX",
            Lax => "LAX", Dcp => "DCP", Isc => "ISC", Anc => "ANC", Alr => "ALR",
            Arr => "ARR", Xaa => "XAA", Axs => "AXS", Ahx => "AHX", Shx => "SHX",
            Shy => "SHY", Tas => "TAS", Las => "LAS", Kil => "KIL",
        }
    }

    /// 条件分岐命令か（BRAは含まない）
    pub fn is_conditional_branch(self) -> bool {
        use Mnemonic::*;
        matches!(self, Bcc | Bcs | Beq | Bmi | Bne | Bpl | Bvc | Bvs)
    }

    fn access(self) -> MemAccess {
        use Mnemonic::*;
        match self {
            Adc | And | Bit | Cmp | Cpx | Cpy | Eor | Lda | Ldx | Ldy | Ora | Sbc
            | Lax | Las | Nop => MemAccess::READ,
            Sta | Stx | Sty | Stz | Sax | Ahx | Shx | Shy | Tas => MemAccess::WRITE,
            Asl | Lsr | Rol | Ror | Inc | Dec | Tsb | Trb | Slo | Rla | Sre | Rra
            | Dcp | Isc => MemAccess::READ | MemAccess::WRITE,
            _ => MemAccess::empty(),
        }
    }
}

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// オペコード1つ分のメタデータ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    /// 実効アドレスへのアクセス方向（アドレスを持たないモードでは空）
    pub access: MemAccess,
    /// 非公式（未定義）オペコード
    pub undocumented: bool,
}

impl OpcodeInfo {
    fn new(mnemonic: Mnemonic, mode: AddressingMode, undocumented: bool) -> Self {
        let access = if mode.has_effective_address() {
            mnemonic.access()
        } else {
            MemAccess::empty()
        };
        OpcodeInfo { mnemonic, mode, access, undocumented }
    }

    /// 命令長（バイト）
    pub fn len(&self) -> u16 {
        self.mode.byte_count()
    }

    /// 非公式命令の分類（命令長 1〜3）。公式命令は `None`
    pub fn invalid_class(&self) -> Option<u16> {
        self.undocumented.then(|| self.len())
    }
}

/// オペコードのメタデータを取得
pub fn opcode_info(cpu_type: CpuType, opcode: u8) -> OpcodeInfo {
    if let Some((mnemonic, mode)) = documented(opcode) {
        return OpcodeInfo::new(mnemonic, mode, false);
    }
    match cpu_type {
        CpuType::Cpu6502 => nmos_undocumented(opcode),
        CpuType::Cpu65C02 => match cmos_extension(opcode) {
            Some((mnemonic, mode)) => OpcodeInfo::new(mnemonic, mode, false),
            None => cmos_undefined(opcode),
        },
    }
}

/// 両CPU共通の公式命令
fn documented(opcode: u8) -> Option<(Mnemonic, AddressingMode)> {
    use AddressingMode::*;
    use Mnemonic::*;
    Some(match opcode {
        0x00 => (Brk, Implied), 0x01 => (Ora, IndirectX), 0x05 => (Ora, ZeroPage),
        0x06 => (Asl, ZeroPage), 0x08 => (Php, Implied), 0x09 => (Ora, Immediate),
        0x0A => (Asl, Accumulator), 0x0D => (Ora, Absolute), 0x0E => (Asl, Absolute),
        0x10 => (Bpl, Relative), 0x11 => (Ora, IndirectY), 0x15 => (Ora, ZeroPageX),
        0x16 => (Asl, ZeroPageX), 0x18 => (Clc, Implied), 0x19 => (Ora, AbsoluteY),
        0x1D => (Ora, AbsoluteX), 0x1E => (Asl, AbsoluteX),
        0x20 => (Jsr, Absolute), 0x21 => (And, IndirectX), 0x24 => (Bit, ZeroPage),
        0x25 => (And, ZeroPage), 0x26 => (Rol, ZeroPage), 0x28 => (Plp, Implied),
        0x29 => (And, Immediate), 0x2A => (Rol, Accumulator), 0x2C => (Bit, Absolute),
        0x2D => (And, Absolute), 0x2E => (Rol, Absolute),
        0x30 => (Bmi, Relative), 0x31 => (And, IndirectY), 0x35 => (And, ZeroPageX),
        0x36 => (Rol, ZeroPageX), 0x38 => (Sec, Implied), 0x39 => (And, AbsoluteY),
        0x3D => (And, AbsoluteX), 0x3E => (Rol, AbsoluteX),
        0x40 => (Rti, Implied), 0x41 => (Eor, IndirectX), 0x45 => (Eor, ZeroPage),
        0x46 => (Lsr, ZeroPage), 0x48 => (Pha, Implied), 0x49 => (Eor, Immediate),
        0x4A => (Lsr, Accumulator), 0x4C => (Jmp, Absolute), 0x4D => (Eor, Absolute),
        0x4E => (Lsr, Absolute),
        0x50 => (Bvc, Relative), 0x51 => (Eor, IndirectY), 0x55 => (Eor, ZeroPageX),
        0x56 => (Lsr, ZeroPageX), 0x58 => (Cli, Implied), 0x59 => (Eor, AbsoluteY),
        0x5D => (Eor, AbsoluteX), 0x5E => (Lsr, AbsoluteX),
        0x60 => (Rts, Implied), 0x61 => (Adc, IndirectX), 0x65 => (Adc, ZeroPage),
        0x66 => (Ror, ZeroPage), 0x68 => (Pla, Implied), 0x69 => (Adc, Immediate),
        0x6A => (Ror, Accumulator), 0x6C => (Jmp, Indirect), 0x6D => (Adc, Absolute),
        0x6E => (Ror, Absolute),
        0x70 => (Bvs, Relative), 0x71 => (Adc, IndirectY), 0x75 => (Adc, ZeroPageX),
        0x76 => (Ror, ZeroPageX), 0x78 => (Sei, Implied), 0x79 => (Adc, AbsoluteY),
        0x7D => (Adc, AbsoluteX), 0x7E => (Ror, AbsoluteX),
        0x81 => (Sta, IndirectX), 0x84 => (Sty, ZeroPage), 0x85 => (Sta, ZeroPage),
        0x86 => (Stx, ZeroPage), 0x88 => (Dey, Implied), 0x8A => (Txa, Implied),
        0x8C => (Sty, Absolute), 0x8D => (Sta, Absolute), 0x8E => (Stx, Absolute),
        0x90 => (Bcc, Relative), 0x91 => (Sta, IndirectY), 0x94 => (Sty, ZeroPageX),
        0x95 => (Sta, ZeroPageX), 0x96 => (Stx, ZeroPageY), 0x98 => (Tya, Implied),
        0x99 => (Sta, AbsoluteY), 0x9A => (Txs, Implied), 0x9D => (Sta, AbsoluteX),
        0xA0 => (Ldy, Immediate), 0xA1 => (Lda, IndirectX), 0xA2 => (Ldx, Immediate),
        0xA4 => (Ldy, ZeroPage), 0xA5 => (Lda, ZeroPage), 0xA6 => (Ldx, ZeroPage),
        0xA8 => (Tay, Implied), 0xA9 => (Lda, Immediate), 0xAA => (Tax, Implied),
        0xAC => (Ldy, Absolute), 0xAD => (Lda, Absolute), 0xAE => (Ldx, Absolute),
        0xB0 => (Bcs, Relative), 0xB1 => (Lda, IndirectY), 0xB4 => (Ldy, ZeroPageX),
        0xB5 => (Lda, ZeroPageX), 0xB6 => (Ldx, ZeroPageY), 0xB8 => (Clv, Implied),
        0xB9 => (Lda, AbsoluteY), 0xBA => (Tsx, Implied), 0xBC => (Ldy, AbsoluteX),
        0xBD => (Lda, AbsoluteX), 0xBE => (Ldx, AbsoluteY),
        0xC0 => (Cpy, Immediate), 0xC1 => (Cmp, IndirectX), 0xC4 => (Cpy, ZeroPage),
        0xC5 => (Cmp, ZeroPage), 0xC6 => (Dec, ZeroPage), 0xC8 => (Iny, Implied),
        0xC9 => (Cmp, Immediate), 0xCA => (Dex, Implied), 0xCC => (Cpy, Absolute),
        0xCD => (Cmp, Absolute), 0xCE => (Dec, Absolute),
        0xD0 => (Bne, Relative), 0xD1 => (Cmp, IndirectY), 0xD5 => (Cmp, ZeroPageX),
        0xD6 => (Dec, ZeroPageX), 0xD8 => (Cld, Implied), 0xD9 => (Cmp, AbsoluteY),
        0xDD => (Cmp, AbsoluteX), 0xDE => (Dec, AbsoluteX),
        0xE0 => (Cpx, Immediate), 0xE1 => (Sbc, IndirectX), 0xE4 => (Cpx, ZeroPage),
        0xE5 => (Sbc, ZeroPage), 0xE6 => (Inc, ZeroPage), 0xE8 => (Inx, Implied),
        0xE9 => (Sbc, Immediate), 0xEA => (Nop, Implied), 0xEC => (Cpx, Absolute),
        0xED => (Sbc, Absolute), 0xEE => (Inc, Absolute),
        0xF0 => (Beq, Relative), 0xF1 => (Sbc, IndirectY), 0xF5 => (Sbc, ZeroPageX),
        0xF6 => (Inc, ZeroPageX), 0xF8 => (Sed, Implied), 0xF9 => (Sbc, AbsoluteY),
        0xFD => (Sbc, AbsoluteX), 0xFE => (Inc, AbsoluteX),
        _ => return None,
    })
}

/// 65C02で追加された公式命令
fn cmos_extension(opcode: u8) -> Option<(Mnemonic, AddressingMode)> {
    use AddressingMode::*;
    use Mnemonic::*;
    Some(match opcode {
        0x04 => (Tsb, ZeroPage), 0x0C => (Tsb, Absolute), 0x12 => (Ora, IndirectZeroPage),
        0x14 => (Trb, ZeroPage), 0x1A => (Inc, Accumulator), 0x1C => (Trb, Absolute),
        0x32 => (And, IndirectZeroPage), 0x34 => (Bit, ZeroPageX), 0x3A => (Dec, Accumulator),
        0x3C => (Bit, AbsoluteX), 0x52 => (Eor, IndirectZeroPage), 0x5A => (Phy, Implied),
        0x64 => (Stz, ZeroPage), 0x72 => (Adc, IndirectZeroPage), 0x74 => (Stz, ZeroPageX),
        0x7A => (Ply, Implied), 0x7C => (Jmp, AbsoluteIndirectX), 0x80 => (Bra, Relative),
        0x89 => (Bit, Immediate), 0x92 => (Sta, IndirectZeroPage), 0x9C => (Stz, Absolute),
        0x9E => (Stz, AbsoluteX), 0xB2 => (Lda, IndirectZeroPage), 0xD2 => (Cmp, IndirectZeroPage),
        0xDA => (Phx, Implied), 0xF2 => (Sbc, IndirectZeroPage), 0xFA => (Plx, Implied),
        _ => return None,
    })
}

/// 65C02の未定義オペコード（すべて長さの決まったNOP）
///
/// Rockwell拡張（RMB/SMB/BBR/BBS）はApple IIe Enhancedの65C02には無いため、ここでは同じ長さのNOP扱い。
fn cmos_undefined(opcode: u8) -> OpcodeInfo {
    use AddressingMode::*;
    let mode = match opcode {
        0x02 | 0x22 | 0x42 | 0x62 | 0x82 | 0xC2 | 0xE2 => Immediate,
        0x44 => ZeroPage,
        0x54 | 0xD4 | 0xF4 => ZeroPageX,
        0x5C | 0xDC | 0xFC => Absolute,
        op if op & 0x0F == 0x07 => ZeroPage,
        op if op & 0x0F == 0x0F => ZeroPageRelative,
        _ => Implied,
    };
    OpcodeInfo::new(Mnemonic::Nop, mode, true)
}

/// NMOS 6502の非公式命令
fn nmos_undocumented(opcode: u8) -> OpcodeInfo {
    use AddressingMode::*;
    use Mnemonic::*;

    let (mnemonic, mode) = match opcode {
        0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2 => {
            (Kil, Implied)
        }
        0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xFA => (Nop, Implied),
        0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => (Nop, Immediate),
        0x04 | 0x44 | 0x64 => (Nop, ZeroPage),
        0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => (Nop, ZeroPageX),
        0x0C => (Nop, Absolute),
        0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => (Nop, AbsoluteX),
        0x9C => (Shy, AbsoluteX),
        0x9E => (Shx, AbsoluteY),
        0x0B | 0x2B => (Anc, Immediate),
        0x4B => (Alr, Immediate),
        0x6B => (Arr, Immediate),
        0x8B => (Xaa, Immediate),
        0xAB => (Lax, Immediate),
        0xCB => (Axs, Immediate),
        0xEB => (Sbc, Immediate),
        0x93 => (Ahx, IndirectY),
        0x9B => (Tas, AbsoluteY),
        0x9F => (Ahx, AbsoluteY),
        0xBB => (Las, AbsoluteY),
        op => {
            // 残りは下位2ビットが11の列: 行で命令、列でモードが決まる
            let mnemonic = match op >> 5 {
                0 => Slo,
                1 => Rla,
                2 => Sre,
                3 => Rra,
                4 => Sax,
                5 => Lax,
                6 => Dcp,
                _ => Isc,
            };
            let indexes_y = matches!(mnemonic, Sax | Lax);
            let mode = match (op >> 2) & 0x07 {
                0 => IndirectX,
                1 => ZeroPage,
                3 => Absolute,
                4 => IndirectY,
                5 if indexes_y => ZeroPageY,
                5 => ZeroPageX,
                6 => AbsoluteY,
                _ if indexes_y => AbsoluteY,
                _ => AbsoluteX,
            };
            (mnemonic, mode)
        }
    };
    OpcodeInfo::new(mnemonic, mode, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_count() {
        let nmos = (0..=255u8)
            .filter(|&op| !opcode_info(CpuType::Cpu6502, op).undocumented)
            .count();
        assert_eq!(nmos, 151);

        let cmos = (0..=255u8)
            .filter(|&op| !opcode_info(CpuType::Cpu65C02, op).undocumented)
            .count();
        assert_eq!(cmos, 178);
    }

    #[test]
    fn test_access_direction() {
        assert_eq!(opcode_info(CpuType::Cpu6502, 0xAD).access, MemAccess::READ);
        assert_eq!(opcode_info(CpuType::Cpu6502, 0x8D).access, MemAccess::WRITE);
        assert_eq!(
            opcode_info(CpuType::Cpu6502, 0xEE).access,
            MemAccess::READ | MemAccess::WRITE
        );
        // ASL A はメモリに触れない
        assert!(opcode_info(CpuType::Cpu6502, 0x0A).access.is_empty());
        assert!(opcode_info(CpuType::Cpu6502, 0xA9).access.is_empty());
    }

    #[test]
    fn test_undocumented_lengths() {
        assert_eq!(opcode_info(CpuType::Cpu6502, 0x02).len(), 1);
        assert_eq!(opcode_info(CpuType::Cpu6502, 0xA7).len(), 2);
        assert_eq!(opcode_info(CpuType::Cpu6502, 0xA7).mnemonic, Mnemonic::Lax);
        assert_eq!(opcode_info(CpuType::Cpu6502, 0xBF).mode, AddressingMode::AbsoluteY);
        assert_eq!(opcode_info(CpuType::Cpu6502, 0x1F).mode, AddressingMode::AbsoluteX);
        assert_eq!(opcode_info(CpuType::Cpu6502, 0x0C).len(), 3);

        assert_eq!(opcode_info(CpuType::Cpu65C02, 0x03).len(), 1);
        assert_eq!(opcode_info(CpuType::Cpu65C02, 0x02).len(), 2);
        assert_eq!(opcode_info(CpuType::Cpu65C02, 0x07).len(), 2);
        assert_eq!(opcode_info(CpuType::Cpu65C02, 0x0F).len(), 3);
        assert_eq!(opcode_info(CpuType::Cpu65C02, 0xDC).len(), 3);
        assert!(opcode_info(CpuType::Cpu65C02, 0xDC).undocumented);

        assert_eq!(opcode_info(CpuType::Cpu6502, 0xA7).invalid_class(), Some(2));
        assert_eq!(opcode_info(CpuType::Cpu6502, 0xAD).invalid_class(), None);
    }

    #[test]
    fn test_cmos_extensions_not_on_nmos() {
        let nmos = opcode_info(CpuType::Cpu6502, 0x80);
        assert!(nmos.undocumented);
        let cmos = opcode_info(CpuType::Cpu65C02, 0x80);
        assert_eq!(cmos.mnemonic, Mnemonic::Bra);
        assert!(!cmos.undocumented);
    }
}
