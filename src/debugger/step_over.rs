//! ステップオーバー
//!
//! JSR はトレースで1命令実行したあと、戻りアドレスまで上限つきで走らせる。
//! 戻ってこなかった場合はスタックを調べて診断を出す（実行は止めない）。

use super::stepping::{StepReport, Steps};
use super::{DebugSession, DebugTarget};
use crate::cpu::STACK_PAGE;

const OPCODE_JSR: u8 = 0x20;

/// JSR のあとのスタック診断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackCheck {
    /// 予定どおり戻った
    Ok,
    /// 戻りアドレスがスタック上に見つからない
    Error { expected: u16 },
    /// 戻りアドレスはスタックトップにある（まだ戻っていない）
    Info { expected: u16 },
    /// 戻りアドレスはあるが `offset` バイトずれている
    Warning { expected: u16, offset: u8 },
}

impl StackCheck {
    pub fn message(&self) -> Option<String> {
        match *self {
            StackCheck::Ok => None,
            StackCheck::Error { expected } => Some(format!(
                "ERROR: Didn't step over JSR! (RTS ${:04X} not found!)",
                expected
            )),
            StackCheck::Info { expected } => Some(format!(
                "INFO: Didn't step over JSR! (RTS ${:04X} on top of stack.)",
                expected
            )),
            StackCheck::Warning { expected, offset } => Some(format!(
                "WARN: Didn't step over JSR! (Stack has RTS ${:04X} but needs fixup: ${:02X} bytes)",
                expected, offset
            )),
        }
    }
}

impl DebugSession {
    /// `P n`: n回ステップオーバーする
    ///
    /// 戻り値の `StackCheck` は最後に検出した問題（なければ `Ok`）。
    pub fn step_over<T: DebugTarget + ?Sized>(&mut self, target: &mut T, count: u32) -> (StepReport, StackCheck) {
        let mut report = StepReport::default();
        let mut check = StackCheck::Ok;

        for _ in 0..count.max(1) {
            let pc = target.registers().pc;
            let opcode = target.peek(pc);
            let expected = pc.wrapping_add(3);

            let step = self.trace(target, 1);
            report.merge(step);

            if opcode != OPCODE_JSR {
                continue;
            }

            self.step_out(target);
            self.steps = Steps::Remaining(self.step_over_max_steps);
            while self.is_stepping() {
                let step = self.continue_stepping(target);
                report.merge(step);
            }

            if target.registers().pc != expected {
                check = match Self::find_stack_return_address(target, expected) {
                    None => StackCheck::Error { expected },
                    Some(0) => StackCheck::Info { expected },
                    Some(offset) => StackCheck::Warning { expected, offset },
                };
                if let Some(message) = check.message() {
                    match check {
                        StackCheck::Error { .. } => log::error!("{}", message),
                        StackCheck::Info { .. } => log::info!("{}", message),
                        _ => log::warn!("{}", message),
                    }
                }
                log::warn!(
                    "step over budget is ${:X} steps; self-modifying stack code may need more",
                    self.step_over_max_steps
                );
            }
        }
        (report, check)
    }

    /// スタックトップの戻りアドレス（RTS で戻る先）
    pub fn stack_return_address<T: DebugTarget + ?Sized>(target: &T) -> u16 {
        let sp = target.registers().sp;
        Self::stack_word(target, sp.wrapping_add(1)).wrapping_add(1)
    }

    /// スタック上で `expected` に戻る位置を探し、スタックトップからのずれを返す
    pub fn find_stack_return_address<T: DebugTarget + ?Sized>(target: &T, expected: u16) -> Option<u8> {
        let sp = target.registers().sp;
        (0..0xFFu8.wrapping_sub(sp)).find(|&offset| {
            let lo = sp.wrapping_add(1).wrapping_add(offset);
            Self::stack_word(target, lo).wrapping_add(1) == expected
        })
    }

    fn stack_word<T: DebugTarget + ?Sized>(target: &T, lo: u8) -> u16 {
        let low = target.peek(STACK_PAGE | lo as u16);
        let high = target.peek(STACK_PAGE | lo.wrapping_add(1) as u16);
        u16::from_le_bytes([low, high])
    }
}
