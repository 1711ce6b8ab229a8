//! A2DBG - Apple II 6502/65C02 debugger core
//!
//! - 6502/65C02 CPU and Apple II memory map
//! - Breakpoints (PC, registers, opcode, memory, video scanner, DMA)
//! - Watches and zero page pointers
//! - Trace, step over, step out and go with skip range
//! - Text command language with savable scripts

pub mod cpu;
pub mod memory;
pub mod video;
pub mod apple2;
pub mod config;
pub mod error;
pub mod debugger;
