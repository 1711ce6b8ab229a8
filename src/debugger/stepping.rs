//! ステップ実行の状態機械
//!
//! `continue_stepping` が1パス分（最大1命令）を担当する。ホストはモードが
//! `Stepping` のあいだ呼び続けるか、`run_until_halt` に任せる。

use super::scan::Hit;
use super::{disassemble, AppMode, DebugSession, DebugTarget};
use crate::cpu::{flags, opcode_info, Mnemonic};

/// 残りステップ数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steps {
    /// 停止条件まで走り続ける
    Unbounded,
    Remaining(u32),
}

impl Steps {
    fn is_zero(self) -> bool {
        self == Steps::Remaining(0)
    }
}

/// Go のスキップ範囲 `[start, start+len)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipRange {
    pub start: u16,
    pub len: u32,
}

impl SkipRange {
    /// `start,len` 形式（64KBで打ち切り）
    pub fn with_length(start: u16, len: u32) -> Self {
        let end = (start as u32 + len).min(0x10000);
        SkipRange { start, len: end - start as u32 }
    }

    /// `start:end` 形式（`end` を含む）
    pub fn with_end(start: u16, end: u16) -> Self {
        let (lo, hi) = if end < start { (end, start) } else { (start, end) };
        SkipRange { start: lo, len: hi as u32 - lo as u32 + 1 }
    }

    pub fn contains(&self, pc: u16) -> bool {
        let pc = pc as u32;
        pc >= self.start as u32 && pc < self.start as u32 + self.len
    }
}

/// `continue_stepping` の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    /// 実行した命令数
    pub executed: u32,
    /// デバッグモードに戻った
    pub halted: bool,
    /// 画面を更新すべきか（スキップ範囲内・フルスピード中は false）
    pub refresh: bool,
    /// `Stop reason: ...` の行
    pub reasons: Vec<String>,
    /// 停止の原因になったヒット
    pub hits: Vec<Hit>,
    /// TL のときだけ、開始からのサイクル数
    pub cycles: Option<u64>,
}

impl StepReport {
    pub(crate) fn merge(&mut self, other: StepReport) {
        self.executed += other.executed;
        self.halted = other.halted;
        self.refresh = other.refresh;
        self.reasons.extend(other.reasons);
        self.hits.extend(other.hits);
        if other.cycles.is_some() {
            self.cycles = other.cycles;
        }
    }
}

impl DebugSession {
    /// `G`/`GG`: 停止条件まで実行する
    pub fn go(&mut self, until: Option<u16>, skip: Option<SkipRange>, full_speed: bool) {
        self.steps = Steps::Unbounded;
        self.step_until = until;
        self.skip_range = skip.filter(|s| s.len > 0);
        self.full_speed = full_speed;
        self.count_cycles = false;
        self.reinit = true;
        self.enter_stepping();
    }

    /// `T n`: n命令トレース（0は1とみなす）。最初の1パスを実行して返す
    pub fn trace<T: DebugTarget + ?Sized>(&mut self, target: &mut T, count: u32) -> StepReport {
        self.steps = Steps::Remaining(count.max(1));
        self.step_until = None;
        self.skip_range = None;
        self.full_speed = false;
        self.count_cycles = false;
        self.enter_stepping();
        self.continue_stepping(target)
    }

    /// `TL n`: トレースしつつ、停止時に消費サイクル数を報告する
    pub fn trace_line<T: DebugTarget + ?Sized>(&mut self, target: &mut T, count: u32) -> StepReport {
        self.steps = Steps::Remaining(count.max(1));
        self.step_until = None;
        self.skip_range = None;
        self.full_speed = false;
        self.count_cycles = true;
        self.step_start_cycles = target.cycles();
        self.enter_stepping();
        self.continue_stepping(target)
    }

    /// `RET`: スタックトップの戻りアドレスまでフルスピードで実行する
    pub fn step_out<T: DebugTarget + ?Sized>(&mut self, target: &T) {
        let until = Self::stack_return_address(target);
        log::debug!("step out until ${:04X}", until);
        self.go(Some(until), None, true);
    }

    /// ステップ実行に入る（ヒット済みの一時ブレークポイントを掃除）
    pub fn enter_stepping(&mut self) {
        self.clear_temp_breakpoints();
        log::debug!("mode: {:?} -> Stepping ({:?})", self.mode, self.steps);
        self.mode = AppMode::Stepping;
    }

    /// 外部からの停止要求。次の `continue_stepping` で止まる
    pub fn stop_stepping(&mut self) {
        self.steps = Steps::Remaining(0);
        self.skip_range = None;
    }

    pub(crate) fn reset_stepping(&mut self) {
        self.steps = Steps::Remaining(0);
        self.step_until = None;
        self.skip_range = None;
        self.full_speed = false;
        self.count_cycles = false;
        self.reinit = false;
    }

    pub fn is_stepping(&self) -> bool {
        self.mode == AppMode::Stepping
    }

    /// 1パス分進める
    pub fn continue_stepping<T: DebugTarget + ?Sized>(&mut self, target: &mut T) -> StepReport {
        let mut report = StepReport { refresh: !self.full_speed, ..Default::default() };
        if self.mode != AppMode::Stepping {
            report.halted = true;
            return report;
        }

        if let Some(skip) = self.skip_range {
            if skip.contains(target.registers().pc) {
                self.steps = Steps::Unbounded;
                report.refresh = false;
            } else {
                self.steps = Steps::Remaining(1);
                report.refresh = true;
            }
        }

        if !self.steps.is_zero() {
            let mut hits = Vec::new();
            let mut do_step = true;

            if self.force_single_step {
                // 前回止まった命令は必ず1回実行させる
                self.force_single_step = false;
            } else {
                let pc = target.registers().pc;
                if self.trace_enabled || self.count_cycles {
                    let line = trace_line(target);
                    self.push_trace(line);
                }
                if target.is_code_memory(pc) {
                    let opcode = target.peek(pc);
                    let count = &mut self.opcode_counts[opcode as usize];
                    *count = count.saturating_add(1);
                    hits.extend(self.check_break_opcode(opcode, pc, target.cpu_type()));
                } else {
                    hits.push(Hit::FloatingBus);
                }
                if !hits.is_empty() {
                    do_step = false;
                    self.force_single_step = true;
                }
            }

            if do_step {
                self.update_lbr(target);
                let old_pc = target.registers().pc;

                target.single_step(self.reinit);
                self.reinit = false;
                report.executed = 1;

                if target.was_last_execution_interrupt() {
                    let origin = self.last_branch;
                    self.last_branch = Some(old_pc);
                    if self.break_on_interrupt {
                        hits.push(Hit::Interrupt { origin });
                    }
                }

                let scanned = self.check_all_breakpoints(target);
                hits.extend(scanned);
            }

            let pc = target.registers().pc;
            if self.step_until == Some(pc) {
                hits.insert(0, Hit::StepUntil(pc));
            }
            if !hits.is_empty() || self.has_dma_windows() {
                report.reasons = self.resolve_stop_reasons(&hits);
                report.hits = hits;
                self.steps = Steps::Remaining(0);
            }

            if let Steps::Remaining(n) = &mut self.steps {
                *n = n.saturating_sub(1);
            }
        }

        if self.steps.is_zero() {
            if self.count_cycles {
                report.cycles = Some(target.cycles().saturating_sub(self.step_start_cycles));
            }
            self.reset_stepping();
            self.mode = AppMode::Debug;
            report.halted = true;
            report.refresh = true;
            log::debug!("mode: Stepping -> Debug at ${:04X}", target.registers().pc);
        }
        report
    }

    /// 停止するまで（または `limit` パスまで）回す
    pub fn run_until_halt<T: DebugTarget + ?Sized>(&mut self, target: &mut T, limit: u64) -> StepReport {
        let mut total = StepReport { halted: !self.is_stepping(), ..Default::default() };
        let mut passes = 0u64;
        while self.is_stepping() && passes < limit {
            let report = self.continue_stepping(target);
            total.merge(report);
            passes += 1;
        }
        if self.is_stepping() {
            log::warn!("stepping not halted after {} passes", passes);
        }
        total
    }

    /// 制御フロー命令を実行する直前にLBRを更新する
    fn update_lbr<T: DebugTarget + ?Sized>(&mut self, target: &T) {
        let regs = target.registers();
        let info = opcode_info(target.cpu_type(), target.peek(regs.pc));
        if info.undocumented {
            return;
        }
        let status = |flag: u8| regs.get_flag(flag);
        let branch = match info.mnemonic {
            Mnemonic::Brk | Mnemonic::Jsr | Mnemonic::Jmp | Mnemonic::Rti | Mnemonic::Rts => true,
            Mnemonic::Bra => true,
            Mnemonic::Bcc => !status(flags::CARRY),
            Mnemonic::Bcs => status(flags::CARRY),
            Mnemonic::Bne => !status(flags::ZERO),
            Mnemonic::Beq => status(flags::ZERO),
            Mnemonic::Bpl => !status(flags::NEGATIVE),
            Mnemonic::Bmi => status(flags::NEGATIVE),
            Mnemonic::Bvc => !status(flags::OVERFLOW),
            Mnemonic::Bvs => status(flags::OVERFLOW),
            _ => false,
        };
        if branch {
            self.last_branch = Some(regs.pc);
        }
    }
}

/// トレース1行（`0300: A9 01     LDA #$01  A=00 X=00 Y=00 P=..-..I.. S=FD`）
fn trace_line<T: DebugTarget + ?Sized>(target: &T) -> String {
    let regs = target.registers();
    format!(
        "{:<32}  {}",
        disassemble(target, regs.pc),
        super::format_registers(regs)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::tests::{machine, pc_bp};
    use crate::debugger::{BreakOnInvalid, Breakpoint, BreakpointOperator, BreakpointSource};

    const NOPS: [u8; 8] = [0xEA; 8];

    #[test]
    fn test_trace_counts_instructions() {
        let mut m = machine(&NOPS);
        let mut session = DebugSession::new();
        let first = session.trace(&mut m, 3);
        assert_eq!(first.executed, 1);
        assert!(!first.halted);
        let rest = session.run_until_halt(&mut m, 100);
        assert_eq!(rest.executed, 2);
        assert!(rest.halted);
        assert!(rest.reasons.is_empty());
        assert_eq!(m.cpu.regs.pc, 0x303);
        assert_eq!(session.mode, AppMode::Debug);
    }

    #[test]
    fn test_go_until_address() {
        let mut m = machine(&NOPS);
        let mut session = DebugSession::new();
        session.go(Some(0x302), None, false);
        let report = session.run_until_halt(&mut m, 100);
        assert_eq!(m.cpu.regs.pc, 0x302);
        assert_eq!(
            report.reasons,
            vec!["Stop reason: Register PC matches 'Go until' address $0302"]
        );
    }

    #[test]
    fn test_pc_breakpoint_then_resume() {
        // 0300: NOP / NOP / NOP / JMP $0300
        let mut m = machine(&[0xEA, 0xEA, 0xEA, 0x4C, 0x00, 0x03]);
        let mut session = DebugSession::new();
        session.add_breakpoint(&m, pc_bp(0x302)).unwrap();

        session.go(None, None, false);
        let report = session.run_until_halt(&mut m, 100);
        assert_eq!(m.cpu.regs.pc, 0x302);
        assert_eq!(report.reasons, vec!["Stop reason: Register PC matches breakpoint #0"]);

        // 一周して戻ってくる
        session.go(None, None, false);
        let report = session.run_until_halt(&mut m, 100);
        assert_eq!(report.executed, 4);
        assert_eq!(m.cpu.regs.pc, 0x302);
        assert_eq!(session.breakpoints.get(0).unwrap().hit_count, 2);
    }

    #[test]
    fn test_temp_breakpoint_removed_on_next_go() {
        let mut m = machine(&NOPS);
        let mut session = DebugSession::new();
        let mut temp = pc_bp(0x301);
        temp.temp = true;
        session.add_breakpoint(&m, temp).unwrap();

        session.go(None, None, false);
        session.run_until_halt(&mut m, 100);
        assert_eq!(m.cpu.regs.pc, 0x301);
        assert_eq!(session.breakpoints.count(), 1);

        session.go(Some(0x303), None, false);
        assert_eq!(session.breakpoints.count(), 0);
    }

    #[test]
    fn test_invalid_opcode_forces_single_step() {
        // LAX $10 / NOP
        let mut m = machine(&[0xA7, 0x10, 0xEA]);
        let mut session = DebugSession::new();
        session.break_on_invalid = BreakOnInvalid::INVALID2;

        let report = session.trace(&mut m, 1);
        assert!(report.halted);
        assert_eq!(report.executed, 0);
        assert_eq!(report.reasons, vec!["Stop reason: Invalid opcode"]);
        assert_eq!(m.cpu.regs.pc, 0x300);

        // 2回目は同じ命令で止まらずに実行する
        let report = session.trace(&mut m, 1);
        assert_eq!(report.executed, 1);
        assert!(report.reasons.is_empty());
        assert_eq!(m.cpu.regs.pc, 0x302);
    }

    #[test]
    fn test_break_on_brk() {
        let mut m = machine(&[0x00]);
        let mut session = DebugSession::new();
        session.break_on_invalid = BreakOnInvalid::BRK;
        let report = session.trace(&mut m, 1);
        assert_eq!(report.hits, vec![Hit::InvalidOpcode]);
    }

    #[test]
    fn test_floating_bus_stop() {
        let mut m = machine(&NOPS);
        m.set_pc(0xC080);
        let mut session = DebugSession::new();
        let report = session.trace(&mut m, 1);
        assert_eq!(report.executed, 0);
        assert_eq!(
            report.reasons,
            vec!["Stop reason: PC reads from floating bus or I/O memory"]
        );
    }

    fn with_irq_handler(program: &[u8]) -> crate::apple2::Apple2 {
        let mut m = machine(program);
        m.memory.poke(0xFFFE, 0x00);
        m.memory.poke(0xFFFF, 0x04);
        m.memory.poke(0x0400, 0xEA);
        m.cpu.regs.set_flag(flags::IRQ_DISABLE, false);
        m
    }

    #[test]
    fn test_interrupt_with_unknown_lbr() {
        let mut m = with_irq_handler(&NOPS);
        let mut session = DebugSession::new();
        session.break_on_interrupt = true;
        m.set_irq(true);

        let report = session.trace(&mut m, 1);
        assert_eq!(report.reasons, vec!["Stop reason: Interrupt occurred (LBR unknown)"]);
        assert_eq!(m.cpu.regs.pc, 0x400);
        assert_eq!(session.last_branch, Some(0x300));
    }

    #[test]
    fn test_interrupt_reports_last_branch() {
        // JMP $0303 / NOP
        let mut m = with_irq_handler(&[0x4C, 0x03, 0x03, 0xEA]);
        let mut session = DebugSession::new();
        session.break_on_interrupt = true;
        session.trace(&mut m, 1);
        assert_eq!(session.last_branch, Some(0x300));

        m.set_irq(true);
        let report = session.trace(&mut m, 1);
        assert_eq!(report.reasons, vec!["Stop reason: Interrupt occurred at $0300"]);
        assert_eq!(session.last_branch, Some(0x303));
    }

    #[test]
    fn test_interrupt_ignored_unless_enabled() {
        let mut m = with_irq_handler(&NOPS);
        let mut session = DebugSession::new();
        m.set_irq(true);
        let report = session.trace(&mut m, 1);
        assert!(report.reasons.is_empty());
        assert_eq!(m.cpu.regs.pc, 0x400);
    }

    #[test]
    fn test_taken_branch_updates_lbr() {
        // LDA #$01 / BNE +0 / BEQ +0 / NOP
        let mut m = machine(&[0xA9, 0x01, 0xD0, 0x00, 0xF0, 0x00, 0xEA]);
        let mut session = DebugSession::new();
        session.trace(&mut m, 3);
        session.run_until_halt(&mut m, 10);
        assert_eq!(m.cpu.regs.pc, 0x306);
        assert_eq!(session.last_branch, Some(0x302));
    }

    #[test]
    fn test_skip_range_runs_then_halts_outside() {
        let mut m = machine(&NOPS);
        let mut session = DebugSession::new();
        session.go(None, Some(SkipRange::with_length(0x300, 3)), false);

        let mut refreshes = Vec::new();
        while session.is_stepping() {
            let report = session.continue_stepping(&mut m);
            refreshes.push(report.refresh);
        }
        assert_eq!(refreshes, vec![false, false, false, true]);
        assert_eq!(m.cpu.regs.pc, 0x304);
    }

    #[test]
    fn test_skip_range_forms() {
        assert_eq!(SkipRange::with_length(0xFFF0, 0x100), SkipRange { start: 0xFFF0, len: 0x10 });
        assert_eq!(SkipRange::with_end(0x300, 0x30F), SkipRange { start: 0x300, len: 0x10 });
        assert_eq!(SkipRange::with_end(0x30F, 0x300), SkipRange { start: 0x300, len: 0x10 });
        assert!(SkipRange::with_end(0x300, 0x30F).contains(0x30F));
    }

    #[test]
    fn test_step_out() {
        // 0300: JSR $0310 / NOP    0310: NOP / NOP / RTS
        let mut m = machine(&[0x20, 0x10, 0x03, 0xEA]);
        m.load_program(0x0310, &[0xEA, 0xEA, 0x60]).unwrap();
        let mut session = DebugSession::new();
        session.trace(&mut m, 1);
        assert_eq!(m.cpu.regs.pc, 0x310);

        session.step_out(&m);
        let report = session.run_until_halt(&mut m, 100);
        assert_eq!(m.cpu.regs.pc, 0x303);
        assert_eq!(report.executed, 3);
    }

    #[test]
    fn test_stop_stepping() {
        let mut m = machine(&NOPS);
        let mut session = DebugSession::new();
        session.go(None, None, true);
        session.stop_stepping();
        let report = session.continue_stepping(&mut m);
        assert!(report.halted);
        assert_eq!(report.executed, 0);
        assert_eq!(session.mode, AppMode::Debug);
    }

    #[test]
    fn test_trace_line_reports_cycles() {
        let mut m = machine(&NOPS);
        let mut session = DebugSession::new();
        let start = m.cpu.total_cycles;
        session.trace_line(&mut m, 2);
        let report = session.run_until_halt(&mut m, 10);
        assert_eq!(report.cycles, Some(m.cpu.total_cycles - start));
        assert!(report.cycles.unwrap() > 0);
        assert_eq!(session.trace_lines(10).len(), 2);
        assert!(session.trace_lines(1)[0].starts_with("0301: EA"));
    }

    #[test]
    fn test_profile_counts_opcodes() {
        let mut m = machine(&[0xEA, 0xEA, 0xA9, 0x00]);
        let mut session = DebugSession::new();
        session.trace(&mut m, 3);
        session.run_until_halt(&mut m, 10);
        assert_eq!(session.hot_opcodes(5), vec![(0xEA, 2), (0xA9, 1)]);
    }

    #[test]
    fn test_dma_window_halts_stepping() {
        let mut m = machine(&NOPS);
        let mut session = DebugSession::new();
        session
            .add_breakpoint(&m, Breakpoint::new(BreakpointSource::MemWrite, BreakpointOperator::Equal, 0x2000, 1, false))
            .unwrap();
        session.go(None, None, false);
        m.dma_write(0x1FFF, &[1, 2, 3]);
        let report = session.continue_stepping(&mut m);
        assert!(report.halted);
        assert_eq!(
            report.reasons,
            vec!["Stop reason: HDD DMA to memory $1FFF-2001 (breakpoint #0)"]
        );
    }

    #[test]
    fn test_register_and_memory_same_pass() {
        // LDX #$05 / STA $0310
        let mut m = machine(&[0xA2, 0x05, 0x8D, 0x10, 0x03]);
        let mut session = DebugSession::new();
        session
            .add_breakpoint(&m, Breakpoint::new(BreakpointSource::MemRw, BreakpointOperator::Equal, 0x310, 1, false))
            .unwrap();
        session
            .add_breakpoint(&m, Breakpoint::new(BreakpointSource::RegX, BreakpointOperator::Equal, 0x05, 1, false))
            .unwrap();
        let report = session.trace(&mut m, 1);
        assert_eq!(report.hits.len(), 2);
        assert_eq!(report.reasons, vec!["Stop reason: Register X matches breakpoint #1"]);
    }
}
