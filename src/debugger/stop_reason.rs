//! 停止理由の判定
//!
//! 集めたヒットから優先順位の最も高いものを1行目にし、DMA窓はそれぞれ
//! 追加の行として後ろに並べる。

use super::scan::Hit;
use super::DebugSession;

const PREFIX: &str = "Stop reason: ";

/// ヒット1件の説明文
pub fn describe(hit: &Hit) -> String {
    match *hit {
        Hit::StepUntil(address) => {
            format!("Register PC matches 'Go until' address ${:04X}", address)
        }
        Hit::InvalidOpcode => "Invalid opcode".to_string(),
        Hit::Opcode(pc) => format!("Opcode match at ${:04X}", pc),
        Hit::Register { slot, source } => {
            format!("Register {} matches breakpoint #{}", source, slot)
        }
        Hit::Memory(address) => format!("Memory access at ${:04X}", address),
        Hit::MemoryWrite(address) => format!("Write access at ${:04X}", address),
        Hit::MemoryRead(address) => format!("Read access at ${:04X}", address),
        Hit::FloatingBus => "PC reads from floating bus or I/O memory".to_string(),
        Hit::Interrupt { origin: None } => "Interrupt occurred (LBR unknown)".to_string(),
        Hit::Interrupt { origin: Some(lbr) } => format!("Interrupt occurred at ${:04X}", lbr),
        Hit::VideoPosition(vpos) => {
            format!("Video scanner position matches at vpos=${:04X}", vpos)
        }
        Hit::DmaToIo(address) => format!("HDD DMA to I/O memory or ROM at ${:04X}", address),
        Hit::DmaFromIo(address) => format!("HDD DMA from I/O memory at ${:04X}", address),
        Hit::DmaWindow(window) => format!(
            "HDD DMA {} memory ${:04X}-{:04X} (breakpoint #{})",
            if window.to_memory { "to" } else { "from" },
            window.start,
            window.end,
            window.breakpoint
        ),
    }
}

/// 最優先のヒット（DMA窓は除く）
pub fn primary(hits: &[Hit]) -> Option<&Hit> {
    hits.iter()
        .filter(|hit| !matches!(hit, Hit::DmaWindow(_)))
        .min_by_key(|hit| hit.rank())
}

impl DebugSession {
    /// 停止理由の行を作る（DMA窓はここで消費する）
    pub(crate) fn resolve_stop_reasons(&mut self, hits: &[Hit]) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(hit) = primary(hits) {
            lines.push(format!("{}{}", PREFIX, describe(hit)));
        }
        for window in self.take_dma_windows() {
            lines.push(format!("{}{}", PREFIX, describe(&Hit::DmaWindow(window))));
        }
        for line in &lines {
            log::info!("{}", line);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::{BreakpointSource, DmaWindow};

    #[test]
    fn test_register_beats_memory() {
        let hits = [
            Hit::Memory(0x310),
            Hit::Register { slot: 2, source: BreakpointSource::RegA },
            Hit::VideoPosition(3),
        ];
        assert_eq!(
            describe(primary(&hits).unwrap()),
            "Register A matches breakpoint #2"
        );
    }

    #[test]
    fn test_priority_order() {
        let mut hits = vec![
            Hit::DmaFromIo(0xC000),
            Hit::DmaToIo(0xC000),
            Hit::VideoPosition(1),
            Hit::Interrupt { origin: None },
            Hit::FloatingBus,
            Hit::MemoryRead(1),
            Hit::MemoryWrite(1),
            Hit::Memory(1),
            Hit::Opcode(0x300),
            Hit::InvalidOpcode,
            Hit::StepUntil(0x300),
        ];
        let mut ranks = Vec::new();
        while let Some(hit) = primary(&hits).copied() {
            ranks.push(hit.rank());
            hits.retain(|h| *h != hit);
        }
        assert_eq!(ranks, vec![0, 1, 2, 4, 5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_interrupt_origin() {
        assert_eq!(
            describe(&Hit::Interrupt { origin: None }),
            "Interrupt occurred (LBR unknown)"
        );
        assert_eq!(
            describe(&Hit::Interrupt { origin: Some(0x0304) }),
            "Interrupt occurred at $0304"
        );
    }

    #[test]
    fn test_dma_windows_appended() {
        let m = crate::debugger::tests::machine(&[0xEA]);
        let mut session = DebugSession::new();
        session.add_breakpoint(&m, crate::debugger::Breakpoint::new(
            BreakpointSource::MemRw,
            crate::debugger::BreakpointOperator::Equal,
            0x2000,
            1,
            false,
        ))
        .unwrap();
        session.check_mem_breakpoints(0x2000, 0x200, true);

        // DMA窓だけのときは1行目を出さない
        let lines = session.resolve_stop_reasons(&[]);
        assert_eq!(
            lines,
            vec!["Stop reason: HDD DMA to memory $2000-21FF (breakpoint #0)"]
        );
        assert!(session.resolve_stop_reasons(&[]).is_empty());

        session.check_mem_breakpoints(0x1000, 0x1001, false);
        let lines = session.resolve_stop_reasons(&[Hit::FloatingBus]);
        assert_eq!(lines[0], "Stop reason: PC reads from floating bus or I/O memory");
        assert_eq!(lines[1], "Stop reason: HDD DMA from memory $1000-2000 (breakpoint #0)");
        let window = DmaWindow { start: 0, end: 0, to_memory: true, breakpoint: 5 };
        assert_eq!(primary(&[Hit::DmaWindow(window)]), None);
    }
}
