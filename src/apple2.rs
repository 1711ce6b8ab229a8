//! Apple II マシン
//!
//! CPU・メモリ・ビデオスキャナをまとめ、デバッガに `DebugTarget` として渡す。
//! 周辺カードのDMAはキューに積んでおき、デバッガが1命令ごとに取り出す。

use crate::cpu::{Cpu, CpuType, MemoryBus, Registers};
use crate::debugger::{DebugTarget, DmaTransfer};
use crate::memory::{Memory, IO_PAGE_START};
use crate::video::{VideoScanner, VideoStandard};

/// Apple II本体
pub struct Apple2 {
    /// 6502/65C02 CPU（サイクル数もここで数える）
    pub cpu: Cpu,
    /// メモリシステム
    pub memory: Memory,
    /// ビデオスキャナ
    pub video: VideoScanner,
    /// 未処理のDMA転送
    dma_queue: Vec<DmaTransfer>,
}

/// CPUから見たバス（スキャナ位置は命令の頭で合わせたもの）
impl MemoryBus for Apple2 {
    fn read(&mut self, address: u16) -> u8 {
        self.memory.read(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory.write(address, value);
    }
}

impl Apple2 {
    pub fn new(cpu_type: CpuType, standard: VideoStandard) -> Self {
        Apple2 {
            cpu: Cpu::new(cpu_type),
            memory: Memory::new(),
            video: VideoScanner::new(standard),
            dma_queue: Vec::new(),
        }
    }

    /// リセットベクターから起動
    pub fn reset(&mut self) {
        // CPUを一時的に取り出してリセット
        let mut cpu = std::mem::take(&mut self.cpu);
        cpu.reset(self);
        self.cpu = cpu;
        log::debug!("reset: PC=${:04X}", self.cpu.regs.pc);
    }

    /// プログラムイメージをメモリに置く
    pub fn load_program(&mut self, address: u16, data: &[u8]) -> Result<(), String> {
        let end = address as usize + data.len();
        if end > IO_PAGE_START as usize {
            return Err(format!(
                "Program ${:04X}-{:04X} does not fit below $C000",
                address,
                end.saturating_sub(1)
            ));
        }
        for (offset, &byte) in data.iter().enumerate() {
            self.memory.poke(address + offset as u16, byte);
        }
        log::debug!("loaded {} bytes at ${:04X}", data.len(), address);
        Ok(())
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.cpu.regs.pc = pc;
    }

    /// IRQ線（レベル）
    pub fn set_irq(&mut self, active: bool) {
        self.cpu.irq_pending = active;
    }

    /// NMI線（立ち上がりで受け付け）
    pub fn set_nmi(&mut self, active: bool) {
        self.cpu.nmi_pending = active;
    }

    /// 周辺カードからメモリへのDMA
    pub fn dma_write(&mut self, address: u16, data: &[u8]) {
        for (offset, &byte) in data.iter().enumerate() {
            self.memory.poke(address.wrapping_add(offset as u16), byte);
        }
        self.queue_dma(address, data.len(), true);
    }

    /// メモリから周辺カードへのDMA
    pub fn dma_read(&mut self, address: u16, len: usize) -> Vec<u8> {
        let data = (0..len)
            .map(|offset| self.memory.peek(address.wrapping_add(offset as u16)))
            .collect();
        self.queue_dma(address, len, false);
        data
    }

    fn queue_dma(&mut self, address: u16, len: usize, to_memory: bool) {
        if len == 0 {
            return;
        }
        // 1回の転送は64KB未満
        let size = len.min(0xFFFF) as u16;
        self.dma_queue.push(DmaTransfer { address, size, to_memory });
    }

    /// 1命令（または割り込みエントリ）を実行
    pub fn step_instruction(&mut self) -> u32 {
        self.sync_bus();
        // CPUを一時的に取り出して実行
        let mut cpu = std::mem::take(&mut self.cpu);
        let cycles = cpu.step(self);
        self.cpu = cpu;
        cycles
    }

    /// スキャンラインとフローティングバスをサイクル数に合わせる
    fn sync_bus(&mut self) {
        let cycles = self.cpu.total_cycles;
        self.memory.scanline = self.video.vertical_position(cycles);
        let scan = self.video.scan_address(cycles, self.memory.switches.page2);
        self.memory.floating_bus = self.memory.main_ram[scan as usize];
    }
}

impl DebugTarget for Apple2 {
    fn cpu_type(&self) -> CpuType {
        self.cpu.cpu_type
    }

    fn registers(&self) -> &Registers {
        &self.cpu.regs
    }

    fn registers_mut(&mut self) -> &mut Registers {
        &mut self.cpu.regs
    }

    fn single_step(&mut self, reinit: bool) {
        if reinit {
            log::trace!("go from ${:04X}", self.cpu.regs.pc);
        }
        self.step_instruction();
    }

    fn was_last_execution_interrupt(&self) -> bool {
        self.cpu.was_last_execution_interrupt()
    }

    fn peek(&self, address: u16) -> u8 {
        self.memory.peek(address)
    }

    fn poke(&mut self, address: u16, value: u8) {
        self.memory.poke(address, value);
    }

    fn is_code_memory(&self, address: u16) -> bool {
        self.memory.is_code_memory(address)
    }

    fn video_vertical_position(&self) -> u16 {
        self.video.vertical_position(self.cpu.total_cycles)
    }

    fn video_line_count(&self) -> u16 {
        self.video.line_count()
    }

    fn take_dma_transfers(&mut self) -> Vec<DmaTransfer> {
        std::mem::take(&mut self.dma_queue)
    }

    fn cycles(&self) -> u64 {
        self.cpu.total_cycles
    }
}
