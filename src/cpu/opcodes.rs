//! オペコードの実装
//!
//! `table` でデコードした (ニーモニック, モード) を実行する。
//! 非公式命令は命令長ぶんオペランドを読み飛ばすNOPとして扱う。

use super::addressing::Operand;
use super::table::{opcode_info, Mnemonic};
use super::{flags, Cpu, CpuType, MemoryBus};

impl Cpu {
    /// オペコードを実行
    pub(super) fn execute_opcode<M: MemoryBus>(&mut self, memory: &mut M, opcode: u8) {
        let info = opcode_info(self.cpu_type, opcode);

        if info.undocumented {
            // オペランドは読むが結果は捨てる
            if let Operand::Address(addr) = self.resolve_operand(memory, info.mode, false) {
                let _ = memory.read(addr);
                self.cycles += 1;
            }
            return;
        }

        let write = matches!(
            info.mnemonic,
            Mnemonic::Sta | Mnemonic::Stx | Mnemonic::Sty | Mnemonic::Stz
        ) || info.access.contains(super::MemAccess::READ | super::MemAccess::WRITE);

        use Mnemonic::*;
        match info.mnemonic {
            Jsr => self.jsr(memory),
            Rts => self.rts(memory),
            Rti => self.rti(memory),
            Brk => self.brk(memory),
            Jmp => {
                if let Operand::Address(target) = self.resolve_operand(memory, info.mode, false) {
                    self.regs.pc = target;
                }
            }
            Pha => self.push_timed(memory, self.regs.a),
            Phx => self.push_timed(memory, self.regs.x),
            Phy => self.push_timed(memory, self.regs.y),
            Php => {
                let status = self.regs.status | flags::BREAK | flags::UNUSED;
                self.push_timed(memory, status);
            }
            Pla => {
                self.regs.a = self.pull_timed(memory);
                self.regs.update_zero_negative_flags(self.regs.a);
            }
            Plx => {
                self.regs.x = self.pull_timed(memory);
                self.regs.update_zero_negative_flags(self.regs.x);
            }
            Ply => {
                self.regs.y = self.pull_timed(memory);
                self.regs.update_zero_negative_flags(self.regs.y);
            }
            Plp => {
                let value = self.pull_timed(memory);
                self.regs.status = (value | flags::UNUSED) & !flags::BREAK;
            }
            _ => {
                let operand = self.resolve_operand(memory, info.mode, write);
                self.execute_with_operand(memory, info.mnemonic, operand);
            }
        }
    }

    fn execute_with_operand<M: MemoryBus>(&mut self, memory: &mut M, mnemonic: Mnemonic, operand: Operand) {
        use Mnemonic::*;
        match mnemonic {
            // ロード/ストア
            Lda => {
                self.regs.a = self.load(memory, operand);
                self.regs.update_zero_negative_flags(self.regs.a);
            }
            Ldx => {
                self.regs.x = self.load(memory, operand);
                self.regs.update_zero_negative_flags(self.regs.x);
            }
            Ldy => {
                self.regs.y = self.load(memory, operand);
                self.regs.update_zero_negative_flags(self.regs.y);
            }
            Sta => self.store(memory, operand, self.regs.a),
            Stx => self.store(memory, operand, self.regs.x),
            Sty => self.store(memory, operand, self.regs.y),
            Stz => self.store(memory, operand, 0),

            // 転送
            Tax => self.transfer(|r| r.a, |r, v| r.x = v),
            Tay => self.transfer(|r| r.a, |r, v| r.y = v),
            Txa => self.transfer(|r| r.x, |r, v| r.a = v),
            Tya => self.transfer(|r| r.y, |r, v| r.a = v),
            Tsx => self.transfer(|r| r.sp, |r, v| r.x = v),
            Txs => self.regs.sp = self.regs.x,

            // 算術・論理
            Adc => {
                let value = self.load(memory, operand);
                self.adc(value);
            }
            Sbc => {
                let value = self.load(memory, operand);
                self.sbc(value);
            }
            And => {
                self.regs.a &= self.load(memory, operand);
                self.regs.update_zero_negative_flags(self.regs.a);
            }
            Ora => {
                self.regs.a |= self.load(memory, operand);
                self.regs.update_zero_negative_flags(self.regs.a);
            }
            Eor => {
                self.regs.a ^= self.load(memory, operand);
                self.regs.update_zero_negative_flags(self.regs.a);
            }
            Cmp => {
                let value = self.load(memory, operand);
                self.compare(self.regs.a, value);
            }
            Cpx => {
                let value = self.load(memory, operand);
                self.compare(self.regs.x, value);
            }
            Cpy => {
                let value = self.load(memory, operand);
                self.compare(self.regs.y, value);
            }
            Bit => {
                let value = self.load(memory, operand);
                self.regs.set_flag(flags::ZERO, self.regs.a & value == 0);
                // 即値BITはZのみ変化
                if !matches!(operand, Operand::Immediate(_)) {
                    self.regs.set_flag(flags::NEGATIVE, value & 0x80 != 0);
                    self.regs.set_flag(flags::OVERFLOW, value & 0x40 != 0);
                }
            }

            // リードモディファイライト
            Asl => self.modify(memory, operand, |cpu, v| {
                cpu.regs.set_flag(flags::CARRY, v & 0x80 != 0);
                v << 1
            }),
            Lsr => self.modify(memory, operand, |cpu, v| {
                cpu.regs.set_flag(flags::CARRY, v & 0x01 != 0);
                v >> 1
            }),
            Rol => self.modify(memory, operand, |cpu, v| {
                let carry = cpu.regs.get_flag(flags::CARRY) as u8;
                cpu.regs.set_flag(flags::CARRY, v & 0x80 != 0);
                (v << 1) | carry
            }),
            Ror => self.modify(memory, operand, |cpu, v| {
                let carry = (cpu.regs.get_flag(flags::CARRY) as u8) << 7;
                cpu.regs.set_flag(flags::CARRY, v & 0x01 != 0);
                (v >> 1) | carry
            }),
            Inc => self.modify(memory, operand, |_, v| v.wrapping_add(1)),
            Dec => self.modify(memory, operand, |_, v| v.wrapping_sub(1)),
            Tsb | Trb => {
                if let Operand::Address(addr) = operand {
                    let value = memory.read(addr);
                    self.regs.set_flag(flags::ZERO, self.regs.a & value == 0);
                    let result = if mnemonic == Tsb { value | self.regs.a } else { value & !self.regs.a };
                    memory.write(addr, result);
                    self.cycles += 3;
                }
            }
            Inx => self.transfer(|r| r.x.wrapping_add(1), |r, v| r.x = v),
            Iny => self.transfer(|r| r.y.wrapping_add(1), |r, v| r.y = v),
            Dex => self.transfer(|r| r.x.wrapping_sub(1), |r, v| r.x = v),
            Dey => self.transfer(|r| r.y.wrapping_sub(1), |r, v| r.y = v),

            // 分岐
            Bpl => self.branch(operand, !self.regs.get_flag(flags::NEGATIVE)),
            Bmi => self.branch(operand, self.regs.get_flag(flags::NEGATIVE)),
            Bvc => self.branch(operand, !self.regs.get_flag(flags::OVERFLOW)),
            Bvs => self.branch(operand, self.regs.get_flag(flags::OVERFLOW)),
            Bcc => self.branch(operand, !self.regs.get_flag(flags::CARRY)),
            Bcs => self.branch(operand, self.regs.get_flag(flags::CARRY)),
            Bne => self.branch(operand, !self.regs.get_flag(flags::ZERO)),
            Beq => self.branch(operand, self.regs.get_flag(flags::ZERO)),
            Bra => self.branch(operand, true),

            // フラグ
            Clc => self.regs.set_flag(flags::CARRY, false),
            Sec => self.regs.set_flag(flags::CARRY, true),
            Cli => self.regs.set_flag(flags::IRQ_DISABLE, false),
            Sei => self.regs.set_flag(flags::IRQ_DISABLE, true),
            Clv => self.regs.set_flag(flags::OVERFLOW, false),
            Cld => self.regs.set_flag(flags::DECIMAL, false),
            Sed => self.regs.set_flag(flags::DECIMAL, true),

            Nop => {
                if let Operand::Address(addr) = operand {
                    let _ = memory.read(addr);
                    self.cycles += 1;
                }
            }

            // スタック/制御系と非公式命令は execute_opcode 側で処理済み
            _ => {}
        }
    }

    fn load<M: MemoryBus>(&mut self, memory: &mut M, operand: Operand) -> u8 {
        match operand {
            Operand::Immediate(value) => value,
            Operand::Address(addr) => {
                self.cycles += 1;
                memory.read(addr)
            }
            Operand::Accumulator => self.regs.a,
            Operand::None | Operand::Branch(_) => 0,
        }
    }

    fn store<M: MemoryBus>(&mut self, memory: &mut M, operand: Operand, value: u8) {
        if let Operand::Address(addr) = operand {
            memory.write(addr, value);
            self.cycles += 1;
        }
    }

    fn transfer(&mut self, get: impl Fn(&super::Registers) -> u8, set: impl Fn(&mut super::Registers, u8)) {
        let value = get(&self.regs);
        set(&mut self.regs, value);
        self.regs.update_zero_negative_flags(value);
    }

    /// アキュムレータまたはメモリに対するリードモディファイライト
    fn modify<M: MemoryBus>(&mut self, memory: &mut M, operand: Operand, op: impl Fn(&mut Cpu, u8) -> u8) {
        match operand {
            Operand::Accumulator => {
                let a = self.regs.a;
                let result = op(self, a);
                self.regs.a = result;
                self.regs.update_zero_negative_flags(result);
            }
            Operand::Address(addr) => {
                let value = memory.read(addr);
                // NMOSはダミーの書き戻しを行う
                if self.cpu_type == CpuType::Cpu6502 {
                    memory.write(addr, value);
                }
                let result = op(self, value);
                memory.write(addr, result);
                self.cycles += 3;
                self.regs.update_zero_negative_flags(result);
            }
            _ => {}
        }
    }

    fn compare(&mut self, register: u8, value: u8) {
        let result = register.wrapping_sub(value);
        self.regs.set_flag(flags::CARRY, register >= value);
        self.regs.update_zero_negative_flags(result);
    }

    /// ブランチを実行（共通ロジック）
    fn branch(&mut self, operand: Operand, condition: bool) {
        if let Operand::Branch(target) = operand {
            if condition {
                let old_pc = self.regs.pc;
                self.regs.pc = target;
                self.cycles += 1;
                // ページ境界を越えた場合、追加サイクル
                if (old_pc & 0xFF00) != (target & 0xFF00) {
                    self.cycles += 1;
                }
            }
        }
    }

    fn adc(&mut self, value: u8) {
        let carry = self.regs.get_flag(flags::CARRY) as u16;
        let a = self.regs.a as u16;
        let binary = a + value as u16 + carry;
        let overflow = (!(a ^ value as u16) & (a ^ binary) & 0x80) != 0;

        if self.regs.get_flag(flags::DECIMAL) {
            let mut low = (a & 0x0F) + (value as u16 & 0x0F) + carry;
            let mut high = (a >> 4) + (value as u16 >> 4);
            if low > 9 {
                low += 6;
                high += 1;
            }
            if high > 9 {
                high += 6;
            }
            let result = (((high & 0x0F) << 4) | (low & 0x0F)) as u8;
            self.regs.set_flag(flags::CARRY, high > 15);
            self.regs.set_flag(flags::OVERFLOW, overflow);
            self.regs.a = result;
            if self.cpu_type == CpuType::Cpu65C02 {
                self.regs.update_zero_negative_flags(result);
                self.cycles += 1;
            } else {
                // NMOSのZはバイナリ結果に従う
                self.regs.set_flag(flags::ZERO, binary as u8 == 0);
                self.regs.set_flag(flags::NEGATIVE, result & 0x80 != 0);
            }
        } else {
            self.regs.set_flag(flags::CARRY, binary > 0xFF);
            self.regs.set_flag(flags::OVERFLOW, overflow);
            self.regs.a = binary as u8;
            self.regs.update_zero_negative_flags(self.regs.a);
        }
    }

    fn sbc(&mut self, value: u8) {
        let borrow = 1 - self.regs.get_flag(flags::CARRY) as i16;
        let a = self.regs.a as i16;
        let binary = a - value as i16 - borrow;
        let overflow = ((a ^ value as i16) & (a ^ binary) & 0x80) != 0;

        if self.regs.get_flag(flags::DECIMAL) {
            let mut low = (a & 0x0F) - (value as i16 & 0x0F) - borrow;
            let mut high = (a >> 4) - (value as i16 >> 4);
            if low < 0 {
                low -= 6;
                high -= 1;
            }
            if high < 0 {
                high -= 6;
            }
            let result = (((high & 0x0F) << 4) | (low & 0x0F)) as u8;
            self.regs.a = result;
            if self.cpu_type == CpuType::Cpu65C02 {
                self.regs.update_zero_negative_flags(result);
                self.cycles += 1;
            } else {
                self.regs.update_zero_negative_flags(binary as u8);
            }
        } else {
            self.regs.a = binary as u8;
            self.regs.update_zero_negative_flags(self.regs.a);
        }
        self.regs.set_flag(flags::CARRY, binary >= 0);
        self.regs.set_flag(flags::OVERFLOW, overflow);
    }

    fn push_timed<M: MemoryBus>(&mut self, memory: &mut M, value: u8) {
        self.push_byte(memory, value);
        self.cycles += 2;
    }

    fn pull_timed<M: MemoryBus>(&mut self, memory: &mut M) -> u8 {
        self.cycles += 3;
        self.pop_byte(memory)
    }

    //--------------------------------------------------
    // 制御命令
    //--------------------------------------------------

    fn jsr<M: MemoryBus>(&mut self, memory: &mut M) {
        let low = self.fetch_byte(memory) as u16;
        // リターンアドレスは JSR の最終バイト
        let ret = self.regs.pc;
        self.push_word(memory, ret);
        let high = self.fetch_byte(memory) as u16;
        self.regs.pc = (high << 8) | low;
        self.cycles += 3;
    }

    fn rts<M: MemoryBus>(&mut self, memory: &mut M) {
        let ret = self.pop_word(memory);
        self.regs.pc = ret.wrapping_add(1);
        self.cycles += 5;
    }

    fn rti<M: MemoryBus>(&mut self, memory: &mut M) {
        let status = self.pop_byte(memory);
        self.regs.status = (status | flags::UNUSED) & !flags::BREAK;
        self.regs.pc = self.pop_word(memory);
        self.cycles += 5;
    }

    fn brk<M: MemoryBus>(&mut self, memory: &mut M) {
        // シグネチャバイトを飛ばす
        let ret = self.regs.pc.wrapping_add(1);
        self.push_word(memory, ret);
        self.push_byte(memory, self.regs.status | flags::BREAK | flags::UNUSED);
        self.regs.set_flag(flags::IRQ_DISABLE, true);
        if self.cpu_type == CpuType::Cpu65C02 {
            self.regs.set_flag(flags::DECIMAL, false);
        }
        let low = memory.read(0xFFFE) as u16;
        let high = memory.read(0xFFFF) as u16;
        self.regs.pc = (high << 8) | low;
        self.cycles += 6;
    }
}
