//! Apple II メモリサブシステム
//!
//! 64KBのメモリマップ、最小限のソフトスイッチ、スロットROM、フローティングバス。
//! デバッガからは副作用のない `peek`/`poke` でアクセスする。

use crate::cpu::MemoryBus;

/// I/Oページ
pub const IO_PAGE_START: u16 = 0xC000;
pub const IO_PAGE_END: u16 = 0xC0FF;

/// 可視ラインの本数（これ以降はVBL）
const VISIBLE_LINES: u16 = 192;

/// ソフトスイッチの状態
#[derive(Debug, Clone)]
pub struct SoftSwitches {
    pub keyboard_strobe: u8,
    pub text_mode: bool,
    pub mixed_mode: bool,
    pub page2: bool,
    pub hires: bool,
    pub speaker_click: bool,
}

impl Default for SoftSwitches {
    fn default() -> Self {
        SoftSwitches {
            keyboard_strobe: 0,
            text_mode: true,      // 起動時はテキストモード
            mixed_mode: false,
            page2: false,
            hires: false,
            speaker_click: false,
        }
    }
}

/// Apple IIメモリシステム
#[derive(Clone)]
pub struct Memory {
    pub main_ram: Box<[u8; 65536]>,
    /// $D000-$FFFF に置くROM（空ならRAMとして扱う）
    pub rom: Vec<u8>,
    /// スロット1-7の $Cn00 ROM（0は未使用）
    pub slot_rom: [Option<Box<[u8; 256]>>; 8],
    pub switches: SoftSwitches,
    /// 現在のスキャンライン（VBL検出用、外部から設定）
    pub scanline: u16,
    /// ビデオ回路が最後にバスに置いた値（外部から設定）
    pub floating_bus: u8,
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            main_ram: Box::new([0; 65536]),
            rom: Vec::new(),
            slot_rom: Default::default(),
            switches: SoftSwitches::default(),
            scanline: 0,
            floating_bus: 0,
        }
    }

    /// 12KBのシステムROMを $D000-$FFFF に配置
    pub fn load_rom(&mut self, rom_data: &[u8]) -> Result<(), String> {
        // 12KBより大きいイメージは末尾12KBを使う
        if rom_data.len() < 0x3000 {
            return Err(format!("ROM image too small: {} bytes (need 12KB)", rom_data.len()));
        }
        self.rom = rom_data[rom_data.len() - 0x3000..].to_vec();
        Ok(())
    }

    /// スロットROM (256バイト) を装着
    pub fn install_slot_rom(&mut self, slot: usize, data: &[u8]) {
        if (1..8).contains(&slot) {
            let mut rom = Box::new([0u8; 256]);
            let len = data.len().min(256);
            rom[..len].copy_from_slice(&data[..len]);
            self.slot_rom[slot] = Some(rom);
        }
    }

    pub fn set_key(&mut self, key: u8) {
        self.switches.keyboard_strobe = key | 0x80;
    }

    /// PCを置いて実行してよい領域か
    ///
    /// I/Oページと、ROMが装着されていないスロット領域・拡張ROM領域は実行コードではない。
    pub fn is_code_memory(&self, address: u16) -> bool {
        match address {
            IO_PAGE_START..=IO_PAGE_END => false,
            0xC100..=0xC7FF => self.slot_rom[((address >> 8) & 0x07) as usize].is_some(),
            0xC800..=0xCFFF => false,
            _ => true,
        }
    }

    /// 副作用なしの読み取り（I/Oはフローティングバス値）
    pub fn peek(&self, address: u16) -> u8 {
        match address {
            0x0000..=0xBFFF => self.main_ram[address as usize],
            0xC000..=0xC00F => self.switches.keyboard_strobe,
            IO_PAGE_START..=IO_PAGE_END => self.floating_bus,
            0xC100..=0xC7FF => self.read_slot_rom(address),
            0xC800..=0xCFFF => self.floating_bus,
            0xD000..=0xFFFF => self.read_high(address),
        }
    }

    /// I/Oを経由しないRAMへの書き込み（ROM装着時の $D000 以上は無視）
    pub fn poke(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0xBFFF => self.main_ram[address as usize] = value,
            0xD000..=0xFFFF if self.rom.is_empty() => self.main_ram[address as usize] = value,
            _ => {}
        }
    }

    fn read_slot_rom(&self, address: u16) -> u8 {
        let slot = ((address >> 8) & 0x07) as usize;
        match &self.slot_rom[slot] {
            Some(rom) => rom[(address & 0xFF) as usize],
            None => self.floating_bus,
        }
    }

    fn read_high(&self, address: u16) -> u8 {
        if self.rom.is_empty() {
            self.main_ram[address as usize]
        } else {
            self.rom[(address - 0xD000) as usize]
        }
    }

    fn read_soft_switch(&mut self, address: u16) -> u8 {
        let addr = address & 0xFF;
        match addr {
            0x00..=0x0F => self.switches.keyboard_strobe,
            0x10 => {
                // $C010: キーストローブクリア
                let result = self.switches.keyboard_strobe;
                self.switches.keyboard_strobe &= 0x7F;
                result
            }
            0x19 => {
                // $C019: RDVBLBAR（VBL中は0）
                let vbl = if self.scanline < VISIBLE_LINES { 0x80 } else { 0x00 };
                vbl | (self.floating_bus & 0x7F)
            }
            _ => {
                self.touch_switch(addr);
                self.floating_bus
            }
        }
    }

    fn write_soft_switch(&mut self, address: u16, _value: u8) {
        let addr = address & 0xFF;
        if addr == 0x10 {
            self.switches.keyboard_strobe &= 0x7F;
        } else {
            self.touch_switch(addr);
        }
    }

    /// 読み書きどちらでも切り替わるスイッチ
    fn touch_switch(&mut self, addr: u16) {
        match addr {
            0x30 => self.switches.speaker_click = !self.switches.speaker_click,
            0x50 => self.switches.text_mode = false,
            0x51 => self.switches.text_mode = true,
            0x52 => self.switches.mixed_mode = false,
            0x53 => self.switches.mixed_mode = true,
            0x54 => self.switches.page2 = false,
            0x55 => self.switches.page2 = true,
            0x56 => self.switches.hires = false,
            0x57 => self.switches.hires = true,
            _ => {}
        }
    }
}

impl MemoryBus for Memory {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            IO_PAGE_START..=IO_PAGE_END => self.read_soft_switch(address),
            _ => self.peek(address),
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            IO_PAGE_START..=IO_PAGE_END => self.write_soft_switch(address, value),
            _ => self.poke(address, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_memory_map() {
        let mut mem = Memory::new();
        assert!(mem.is_code_memory(0x0300));
        assert!(!mem.is_code_memory(0xC000));
        assert!(!mem.is_code_memory(0xC0FF));
        assert!(!mem.is_code_memory(0xC600));
        assert!(!mem.is_code_memory(0xC800));
        assert!(mem.is_code_memory(0xD000));

        mem.install_slot_rom(6, &[0xA2, 0x20]);
        assert!(mem.is_code_memory(0xC600));
        assert!(!mem.is_code_memory(0xC500));
        assert_eq!(mem.peek(0xC600), 0xA2);
    }

    #[test]
    fn test_floating_bus_reads() {
        let mut mem = Memory::new();
        mem.floating_bus = 0x5A;
        assert_eq!(mem.read(0xC0F0), 0x5A);
        assert_eq!(mem.peek(0xC500), 0x5A);
    }

    #[test]
    fn test_peek_has_no_side_effects() {
        let mut mem = Memory::new();
        mem.set_key(b'A');
        assert_eq!(mem.peek(0xC010), 0);
        assert_eq!(mem.peek(0xC000), 0xC1);
        assert_eq!(mem.read(0xC010), 0xC1);
        assert_eq!(mem.peek(0xC000), 0x41);
    }

    #[test]
    fn test_soft_switches_and_vbl() {
        let mut mem = Memory::new();
        mem.read(0xC050);
        assert!(!mem.switches.text_mode);
        mem.write(0xC057, 0);
        assert!(mem.switches.hires);

        mem.scanline = 10;
        assert_eq!(mem.read(0xC019) & 0x80, 0x80);
        mem.scanline = 200;
        assert_eq!(mem.read(0xC019) & 0x80, 0x00);
    }

    #[test]
    fn test_rom_is_read_only() {
        let mut mem = Memory::new();
        mem.poke(0xFFFC, 0x12);
        assert_eq!(mem.peek(0xFFFC), 0x12);

        let mut rom = vec![0u8; 0x3000];
        rom[0x2FFC] = 0x62;
        mem.load_rom(&rom).unwrap();
        mem.poke(0xFFFC, 0x00);
        assert_eq!(mem.peek(0xFFFC), 0x62);
        assert!(mem.load_rom(&[0u8; 16]).is_err());
    }
}
