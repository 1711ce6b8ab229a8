//! ブレークポイントの走査
//!
//! 1命令ごとに呼ばれ、成立した停止条件を `Hit` として集める。
//! 走査中に変更するのはヒット記録（`hit`/`hit_count`）と、ビデオ
//! ブレークポイントのワンショット無効化だけ。

use super::{
    BreakOnInvalid, BreakpointSource, DebugSession, DebugTarget, DmaIoAccess, DmaTransfer,
    DmaWindow, MAX_BREAKPOINTS,
};
use crate::cpu::{opcode_info, operand_targets, MemAccess};
use crate::memory::{IO_PAGE_END, IO_PAGE_START};

/// 停止条件1件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    /// Go の終了アドレスに到達
    StepUntil(u16),
    InvalidOpcode,
    /// 指定オペコードに到達
    Opcode(u16),
    Register { slot: usize, source: BreakpointSource },
    Memory(u16),
    MemoryWrite(u16),
    MemoryRead(u16),
    /// PCがフローティングバスかI/Oを指している
    FloatingBus,
    /// 割り込みエントリ（`origin` は割り込み直前のLBR）
    Interrupt { origin: Option<u16> },
    VideoPosition(u16),
    DmaToIo(u16),
    DmaFromIo(u16),
    DmaWindow(DmaWindow),
}

impl Hit {
    /// 停止理由の優先順位（小さいほど優先）
    pub fn rank(&self) -> u8 {
        match self {
            Hit::StepUntil(_) => 0,
            Hit::InvalidOpcode => 1,
            Hit::Opcode(_) => 2,
            Hit::Register { .. } => 3,
            Hit::Memory(_) => 4,
            Hit::MemoryWrite(_) => 5,
            Hit::MemoryRead(_) => 6,
            Hit::FloatingBus => 7,
            Hit::Interrupt { .. } => 8,
            Hit::VideoPosition(_) => 9,
            Hit::DmaToIo(_) => 10,
            Hit::DmaFromIo(_) => 11,
            Hit::DmaWindow(_) => 12,
        }
    }
}

impl DebugSession {
    /// 1命令実行後の走査をまとめて行う
    ///
    /// DMAキューを取り出し、メモリ・レジスタ・ビデオの順に照合する。
    pub fn check_all_breakpoints<T: DebugTarget + ?Sized>(&mut self, target: &mut T) -> Vec<Hit> {
        let mut hits = Vec::new();
        self.drain_dma(target);
        self.scan_io(&*target, &mut hits);
        self.scan_registers(&*target, &mut hits);
        self.scan_video(&*target, &mut hits);
        hits.extend(self.take_dma_io_hit());
        hits
    }

    /// 実行前のオペコード検査（BRK・非公式命令・指定オペコード）
    pub(crate) fn check_break_opcode(&self, opcode: u8, pc: u16, cpu_type: crate::cpu::CpuType) -> Option<Hit> {
        if opcode == 0x00 && self.break_on_invalid.contains(BreakOnInvalid::BRK) {
            return Some(Hit::InvalidOpcode);
        }
        let info = opcode_info(cpu_type, opcode);
        if let Some(class) = info.invalid_class() {
            if self.break_on_invalid.contains(BreakOnInvalid::class(class)) {
                return Some(Hit::InvalidOpcode);
            }
        }
        if self.break_on_opcode == Some(opcode) {
            return Some(Hit::Opcode(pc));
        }
        None
    }

    /// 次の命令が触るメモリとメモリブレークポイントの照合
    pub(crate) fn scan_io<T: DebugTarget + ?Sized>(&mut self, target: &T, hits: &mut Vec<Hit>) {
        let targets = operand_targets(target.cpu_type(), target.registers(), |addr| target.peek(addr));

        for mem in targets.iter().flatten() {
            for slot in 0..MAX_BREAKPOINTS {
                let Some(bp) = self.breakpoints.get_mut(slot) else {
                    continue;
                };
                if !bp.is_valid() || !bp.source.is_memory() || !bp.matches(mem.address as u32) {
                    continue;
                }
                self.last_mem_address = Some(mem.address);
                let hit = match bp.source {
                    BreakpointSource::MemRw => Some(Hit::Memory(mem.address)),
                    BreakpointSource::MemRead if mem.access.contains(MemAccess::READ) => {
                        Some(Hit::MemoryRead(mem.address))
                    }
                    BreakpointSource::MemWrite if mem.access.contains(MemAccess::WRITE) => {
                        Some(Hit::MemoryWrite(mem.address))
                    }
                    _ => None,
                };
                if let Some(hit) = hit {
                    if bp.record_hit() {
                        hits.push(hit);
                    }
                }
            }
        }
    }

    /// レジスタ（とオペコード）のブレークポイント
    ///
    /// 一致したものはすべてヒットを記録し、停止するもののうち最初の1件を報告する。
    pub(crate) fn scan_registers<T: DebugTarget + ?Sized>(&mut self, target: &T, hits: &mut Vec<Hit>) {
        let regs = target.registers().clone();
        let mut reported = false;

        for slot in 0..MAX_BREAKPOINTS {
            let Some(bp) = self.breakpoints.get_mut(slot) else {
                continue;
            };
            if !bp.is_valid() {
                continue;
            }
            let value = match bp.source {
                BreakpointSource::RegA => regs.a as u32,
                BreakpointSource::RegX => regs.x as u32,
                BreakpointSource::RegY => regs.y as u32,
                BreakpointSource::RegPc => regs.pc as u32,
                BreakpointSource::RegS => regs.sp as u32,
                BreakpointSource::RegP => regs.status as u32,
                BreakpointSource::Opcode => target.peek(regs.pc) as u32,
                _ => continue,
            };
            if bp.matches(value) && bp.record_hit() && !reported {
                hits.push(Hit::Register { slot, source: bp.source });
                reported = true;
            }
        }
    }

    /// ビデオスキャナ位置のブレークポイント（一致したら無効化）
    pub(crate) fn scan_video<T: DebugTarget + ?Sized>(&mut self, target: &T, hits: &mut Vec<Hit>) {
        for slot in 0..MAX_BREAKPOINTS {
            let Some(bp) = self.breakpoints.get_mut(slot) else {
                continue;
            };
            if !bp.is_valid() || bp.source != BreakpointSource::VideoScanner {
                continue;
            }
            // フルスピード中でも最新の位置で比べる
            let vpos = target.video_vertical_position();
            if bp.matches(vpos as u32) {
                let stop = bp.record_hit();
                // 同じラインで何度も成立しないように
                bp.enabled = false;
                log::debug!("video breakpoint #{:X} disabled at vpos={:04X}", slot, vpos);
                if stop {
                    hits.push(Hit::VideoPosition(vpos));
                }
            }
        }
    }

    /// ターゲットのDMAキューを取り出して判定する
    pub(crate) fn drain_dma<T: DebugTarget + ?Sized>(&mut self, target: &mut T) {
        for transfer in target.take_dma_transfers() {
            self.check_dma_transfer(transfer);
        }
    }

    fn check_dma_transfer(&mut self, transfer: DmaTransfer) {
        if transfer.size == 0 {
            return;
        }
        let start = transfer.address as u32;
        let end = start + transfer.size as u32 - 1;
        let touches_io = if transfer.to_memory {
            // I/OページとROMへの書き込み
            end >= IO_PAGE_START as u32
        } else {
            start <= IO_PAGE_END as u32 && end >= IO_PAGE_START as u32
        };
        if touches_io {
            let address = transfer.address.max(IO_PAGE_START);
            self.break_on_dma_to_or_from_io(address, transfer.to_memory);
            return;
        }
        self.check_mem_breakpoints(transfer.address, transfer.size, transfer.to_memory);
    }

    /// I/O領域へのDMAを記録する（1件だけ保持）
    pub fn break_on_dma_to_or_from_io(&mut self, address: u16, to_memory: bool) {
        self.dma_io = Some(DmaIoAccess { address, to_memory });
    }

    /// DMA範囲とメモリブレークポイントの照合
    ///
    /// 停止するブレークポイントに一致したら空いているDMA窓に記録して true を返す。
    pub fn check_mem_breakpoints(&mut self, address: u16, size: u16, to_memory: bool) -> bool {
        for slot in 0..MAX_BREAKPOINTS {
            let Some(bp) = self.breakpoints.get_mut(slot) else {
                continue;
            };
            if !bp.is_valid() {
                continue;
            }
            let direction = match bp.source {
                BreakpointSource::MemRw => true,
                BreakpointSource::MemRead => !to_memory,
                BreakpointSource::MemWrite => to_memory,
                _ => false,
            };
            if !direction || !bp.matches_range(address as u32, size as u32) {
                continue;
            }
            if !bp.record_hit() {
                continue;
            }
            let window = DmaWindow {
                start: address,
                end: address.wrapping_add(size.wrapping_sub(1)),
                to_memory,
                breakpoint: slot,
            };
            match self.dma_windows.iter_mut().find(|w| w.is_none()) {
                Some(free) => *free = Some(window),
                None => log::warn!(
                    "DMA window {:04X}-{:04X} dropped: all {} windows in use",
                    window.start,
                    window.end,
                    self.dma_windows.len()
                ),
            }
            return true;
        }
        false
    }

    /// I/O DMA の記録を取り出す（取り出したら消える）
    pub(crate) fn take_dma_io_hit(&mut self) -> Option<Hit> {
        self.dma_io.take().map(|io| {
            if io.to_memory {
                Hit::DmaToIo(io.address)
            } else {
                Hit::DmaFromIo(io.address)
            }
        })
    }

    /// DMA窓が記録されているか（消費しない）
    pub(crate) fn has_dma_windows(&self) -> bool {
        self.dma_windows.iter().any(Option::is_some)
    }

    /// DMA窓を取り出す（取り出したら消える）
    pub(crate) fn take_dma_windows(&mut self) -> Vec<DmaWindow> {
        self.dma_windows.iter_mut().filter_map(Option::take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::tests::{machine, pc_bp};
    use crate::debugger::{Breakpoint, BreakpointOperator, SlotArg};

    fn mem_bp(source: BreakpointSource, address: u16, length: u32) -> Breakpoint {
        Breakpoint::new(source, BreakpointOperator::Equal, address, length, false)
    }

    #[test]
    fn test_io_scan_direction() {
        // STA $0310
        let m = machine(&[0x8D, 0x10, 0x03]);
        let mut session = DebugSession::new();
        session.add_breakpoint(&m, mem_bp(BreakpointSource::MemRead, 0x310, 1)).unwrap();
        let write = session.add_breakpoint(&m, mem_bp(BreakpointSource::MemWrite, 0x310, 1)).unwrap();

        let mut hits = Vec::new();
        session.scan_io(&m, &mut hits);
        assert_eq!(hits, vec![Hit::MemoryWrite(0x310)]);
        assert_eq!(session.last_mem_address, Some(0x310));
        assert_eq!(session.breakpoints.get(write).unwrap().hit_count, 1);
        assert_eq!(session.breakpoints.get(0).unwrap().hit_count, 0);
    }

    #[test]
    fn test_check_all_breakpoints_collects_every_kind() {
        // LDA $0310
        let mut m = machine(&[0xAD, 0x10, 0x03]);
        let mut session = DebugSession::new();
        session.add_breakpoint(&m, mem_bp(BreakpointSource::MemRead, 0x310, 1)).unwrap();
        session.add_breakpoint(&m, pc_bp(0x300)).unwrap();
        m.dma_write(0xC000, &[0]);

        let hits = session.check_all_breakpoints(&mut m);
        assert_eq!(
            hits,
            vec![
                Hit::MemoryRead(0x310),
                Hit::Register { slot: 1, source: BreakpointSource::RegPc },
                Hit::DmaToIo(0xC000),
            ]
        );
        assert!(session.check_all_breakpoints(&mut m).len() == 2);
    }

    #[test]
    fn test_io_scan_ignores_jsr_destination() {
        // JSR $0310
        let m = machine(&[0x20, 0x10, 0x03]);
        let mut session = DebugSession::new();
        session.add_breakpoint(&m, mem_bp(BreakpointSource::MemRw, 0x310, 1)).unwrap();
        let mut hits = Vec::new();
        session.scan_io(&m, &mut hits);
        assert!(hits.is_empty());

        // スタックへのプッシュは対象になる
        session.add_breakpoint(&m, mem_bp(BreakpointSource::MemWrite, 0x1FD, 1)).unwrap();
        session.scan_io(&m, &mut hits);
        assert_eq!(hits, vec![Hit::MemoryWrite(0x1FD)]);
    }

    #[test]
    fn test_register_scan_reports_first_stop() {
        let mut m = machine(&[0xEA]);
        m.cpu.regs.a = 0x42;
        let mut session = DebugSession::new();
        let mut silent = Breakpoint::new(BreakpointSource::RegA, BreakpointOperator::Equal, 0x42, 1, false);
        silent.stop = false;
        session.add_breakpoint(&m, silent).unwrap();
        session.add_breakpoint(&m, pc_bp(0x300)).unwrap();
        session
            .add_breakpoint(&m, Breakpoint::new(BreakpointSource::RegA, BreakpointOperator::GreaterThan, 0x10, 1, false))
            .unwrap();

        let mut hits = Vec::new();
        session.scan_registers(&m, &mut hits);
        assert_eq!(hits, vec![Hit::Register { slot: 1, source: BreakpointSource::RegPc }]);
        assert!(session.breakpoints.iter().all(|(_, bp)| bp.hit_count == 1));
    }

    #[test]
    fn test_opcode_source_compares_opcode_at_pc() {
        let m = machine(&[0xEA]);
        let mut session = DebugSession::new();
        session
            .add_breakpoint(&m, Breakpoint::new(BreakpointSource::Opcode, BreakpointOperator::Equal, 0xEA, 1, false))
            .unwrap();
        let mut hits = Vec::new();
        session.scan_registers(&m, &mut hits);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_video_breakpoint_is_one_shot() {
        let m = machine(&[0xEA]);
        let mut session = DebugSession::new();
        let bp = Breakpoint::new(BreakpointSource::VideoScanner, BreakpointOperator::Equal, 0, 1, false);
        let slot = session.add_breakpoint(&m, bp).unwrap();

        let mut hits = Vec::new();
        session.scan_video(&m, &mut hits);
        assert_eq!(hits, vec![Hit::VideoPosition(0)]);
        assert!(!session.breakpoints.get(slot).unwrap().enabled);

        hits.clear();
        session.scan_video(&m, &mut hits);
        assert!(hits.is_empty());

        session.breakpoints.set_enabled(&[SlotArg::Index(slot)], true);
        session.scan_video(&m, &mut hits);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_break_opcode_classes() {
        use crate::cpu::CpuType;
        let mut session = DebugSession::new();
        assert_eq!(session.check_break_opcode(0x00, 0x300, CpuType::Cpu6502), None);

        session.break_on_invalid = BreakOnInvalid::BRK;
        assert_eq!(session.check_break_opcode(0x00, 0x300, CpuType::Cpu6502), Some(Hit::InvalidOpcode));
        // LAX zp は2バイトの非公式命令
        assert_eq!(session.check_break_opcode(0xA7, 0x300, CpuType::Cpu6502), None);
        session.break_on_invalid |= BreakOnInvalid::INVALID2;
        assert_eq!(session.check_break_opcode(0xA7, 0x300, CpuType::Cpu6502), Some(Hit::InvalidOpcode));

        session.break_on_opcode = Some(0xEA);
        assert_eq!(session.check_break_opcode(0xEA, 0x305, CpuType::Cpu6502), Some(Hit::Opcode(0x305)));
    }

    #[test]
    fn test_dma_windows_latch_and_consume() {
        let m = machine(&[0xEA]);
        let mut session = DebugSession::new();
        session.add_breakpoint(&m, mem_bp(BreakpointSource::MemWrite, 0x2000, 0x10)).unwrap();
        session.add_breakpoint(&m, mem_bp(BreakpointSource::MemRead, 0x4000, 1)).unwrap();

        assert!(session.check_mem_breakpoints(0x1F00, 0x200, true));
        assert!(!session.check_mem_breakpoints(0x1F00, 0x200, false));
        assert!(session.check_mem_breakpoints(0x4000, 0x200, false));
        assert!(session.has_dma_windows());

        let windows = session.take_dma_windows();
        assert_eq!(
            windows,
            vec![
                DmaWindow { start: 0x1F00, end: 0x20FF, to_memory: true, breakpoint: 0 },
                DmaWindow { start: 0x4000, end: 0x41FF, to_memory: false, breakpoint: 1 },
            ]
        );
        assert!(!session.has_dma_windows());
    }

    #[test]
    fn test_dma_window_overflow_is_dropped() {
        let m = machine(&[0xEA]);
        let mut session = DebugSession::new();
        session.add_breakpoint(&m, mem_bp(BreakpointSource::MemRw, 0x2000, 1)).unwrap();
        for _ in 0..4 {
            assert!(session.check_mem_breakpoints(0x2000, 1, true));
        }
        assert_eq!(session.take_dma_windows().len(), 3);
        assert_eq!(session.breakpoints.get(0).unwrap().hit_count, 4);
    }

    #[test]
    fn test_dma_to_io_latches_single_slot() {
        let mut m = machine(&[0xEA]);
        let mut session = DebugSession::new();
        session.add_breakpoint(&m, mem_bp(BreakpointSource::MemRw, 0x0000, 0x10000)).unwrap();

        m.dma_write(0xBFF0, &[0; 0x20]);
        session.drain_dma(&mut m);
        assert_eq!(session.take_dma_io_hit(), Some(Hit::DmaToIo(0xC000)));
        assert_eq!(session.take_dma_io_hit(), None);
        assert!(!session.has_dma_windows());

        // ROM領域からの読み出しはI/Oではない
        m.dma_read(0xD000, 0x10);
        session.drain_dma(&mut m);
        assert_eq!(session.take_dma_io_hit(), None);
        assert!(session.has_dma_windows());
    }
}
