//! コマンド言語
//!
//! 1行1コマンド。コマンド名は大文字小文字を区別せず、数値は16進
//! （`$` は省略可）。範囲は `addr,len` か `addr:end`。`//` 以降はコメント。
//! エラーはすべて表示用の1行になり、状態は変更されない。

use super::stepping::{SkipRange, StepReport};
use super::{
    opcode_info, BreakOnInvalid, Breakpoint, BreakpointOperator, BreakpointSource, DebugSession,
    DebugTarget, SlotArg, SlotRecord, SlotTable, StackCheck, Watch, WatchTarget, ZeroPagePointer,
    MAX_WATCHES, MAX_ZEROPAGE_POINTERS,
};
use crate::error::{DebugError, Result};

/// 範囲指定の後半
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeTail {
    /// `,len`
    Length(u32),
    /// `:end`（含む）
    End(u16),
}

/// 16進数（`$` 省略可）
fn parse_hex(arg: &str) -> Result<u32> {
    let digits = arg.trim_start_matches('$');
    u32::from_str_radix(digits, 16).map_err(|_| DebugError::Syntax(format!("bad number '{}'", arg)))
}

fn parse_address(arg: &str) -> Result<u16> {
    let value = parse_hex(arg)?;
    u16::try_from(value)
        .map_err(|_| DebugError::InvalidRange(format!("Address out of range: ${:X}", value)))
}

/// `addr`、`addr,len`、`addr:end`
fn parse_range(arg: &str) -> Result<(u16, Option<RangeTail>)> {
    if let Some((addr, len)) = arg.split_once(',') {
        Ok((parse_address(addr)?, Some(RangeTail::Length(parse_hex(len)?))))
    } else if let Some((addr, end)) = arg.split_once(':') {
        Ok((parse_address(addr)?, Some(RangeTail::End(parse_address(end)?))))
    } else {
        Ok((parse_address(arg)?, None))
    }
}

/// 範囲をブレークポイント用の (先頭, 長さ) にする
fn range_length(start: u16, tail: Option<RangeTail>) -> Result<u32> {
    match tail {
        None => Ok(1),
        Some(RangeTail::Length(len)) => Ok(len),
        Some(RangeTail::End(end)) if end >= start => Ok(end as u32 - start as u32 + 1),
        Some(RangeTail::End(end)) => Err(DebugError::InvalidRange(format!(
            "Range end ${:04X} is before start ${:04X}",
            end, start
        ))),
    }
}

fn parse_slots(args: &[&str]) -> Result<Vec<SlotArg>> {
    args.iter().map(|arg| SlotArg::parse(arg)).collect()
}

/// `ON`/`OFF`
fn parse_switch(arg: &str) -> Result<bool> {
    match arg.to_ascii_uppercase().as_str() {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        _ => Err(DebugError::Syntax(format!("expected ON or OFF, got '{}'", arg))),
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

/// 複数引数の先頭が1桁ならスロット番号とみなす
fn split_slot<'a, 'b>(args: &'a [&'b str]) -> Result<(Option<usize>, &'a [&'b str])> {
    match args {
        [first, rest @ ..] if !rest.is_empty() && first.len() == 1 => {
            Ok((Some(parse_hex(first)? as usize), rest))
        }
        _ => Ok((None, args)),
    }
}

impl DebugSession {
    /// 1行実行して表示行を返す
    pub fn execute<T: DebugTarget + ?Sized>(&mut self, target: &mut T, line: &str) -> Vec<String> {
        let line = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        };
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Vec::new();
        };
        let args: Vec<&str> = words.collect();
        let name = name.to_ascii_uppercase();

        match self.dispatch(target, &name, &args) {
            Ok(lines) => lines,
            Err(err) => {
                log::debug!("command '{}' rejected: {}", line.trim(), err);
                vec![err.to_string()]
            }
        }
    }

    fn dispatch<T: DebugTarget + ?Sized>(&mut self, target: &mut T, name: &str, args: &[&str]) -> Result<Vec<String>> {
        match name {
            // ブレークポイント
            "BP" | "BPX" => self.cmd_breakpoint_pc(&*target, args, false),
            "BPT" => self.cmd_breakpoint_pc(&*target, args, true),
            "BPR" => self.cmd_breakpoint_register(&*target, args),
            "BPM" => self.cmd_breakpoint_memory(&*target, BreakpointSource::MemRw, args),
            "BPMR" => self.cmd_breakpoint_memory(&*target, BreakpointSource::MemRead, args),
            "BPMW" => self.cmd_breakpoint_memory(&*target, BreakpointSource::MemWrite, args),
            "BPV" => self.cmd_breakpoint_memory(&*target, BreakpointSource::VideoScanner, args),
            "BPA" => self.cmd_breakpoint_add(&*target, args),
            "BPC" => clear_table(&mut self.breakpoints, args),
            "BPD" => enable_table(&mut self.breakpoints, args, false),
            "BPE" => enable_table(&mut self.breakpoints, args, true),
            "BPL" => Ok(self.breakpoints.list()),
            "BPCHANGE" => self.cmd_breakpoint_change(args),
            "BRK" => self.cmd_break_invalid(args),
            "BRKOP" => self.cmd_break_opcode(args),
            "BRKINT" => self.cmd_break_interrupt(args),

            // ウォッチ
            "W" | "WA" => self.cmd_watch_add(args),
            "WC" => clear_table(&mut self.watches, args),
            "WD" => enable_table(&mut self.watches, args, false),
            "WE" => enable_table(&mut self.watches, args, true),
            "WL" => {
                let mut lines = self.watches.list();
                lines.extend(self.watch_values(&*target));
                Ok(lines)
            }

            // ゼロページポインタ
            "ZP" | "ZPA" => self.cmd_zero_page_add(args),
            "ZPC" => clear_table(&mut self.zero_page, args),
            "ZPD" => enable_table(&mut self.zero_page, args, false),
            "ZPE" => enable_table(&mut self.zero_page, args, true),
            "ZPL" => {
                let mut lines = self.zero_page.list();
                lines.extend(self.zero_page_values(&*target));
                Ok(lines)
            }

            // ステップ実行
            "G" => self.cmd_go(target, args, false),
            "GG" => self.cmd_go(target, args, true),
            "T" => {
                let count = self.parse_count(args)?;
                let first = self.trace(target, count);
                Ok(self.run_to_halt(target, first).reasons)
            }
            "TL" => {
                let count = self.parse_count(args)?;
                let first = self.trace_line(target, count);
                let report = self.run_to_halt(target, first);
                let mut lines: Vec<String> = self
                    .trace_lines(report.executed as usize)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                lines.extend(report.reasons);
                if let Some(cycles) = report.cycles {
                    lines.push(format!("Cycles: {}", cycles));
                }
                Ok(lines)
            }
            "P" => {
                let count = self.parse_count(args)?;
                let (report, check) = self.step_over(target, count);
                // 戻りアドレスでの停止は正常終了なので表示しない
                let mut lines: Vec<String> = report
                    .reasons
                    .into_iter()
                    .filter(|line| !line.contains("'Go until'"))
                    .collect();
                lines.extend(check.message());
                if check != StackCheck::Ok {
                    lines.push(format!("  step over budget: ${:X} steps", self.step_over_max_steps));
                }
                Ok(lines)
            }
            "RET" => {
                self.step_out(&*target);
                Ok(self.run_to_halt(target, StepReport::default()).reasons)
            }

            "R" => self.cmd_register(target, args),
            "PROFILE" => self.cmd_profile(&*target, args),
            "SAVE" => Ok(self.save_lines()),

            _ if name.len() == 3 && name.starts_with("ZP") => {
                let slot = name[2..]
                    .parse::<usize>()
                    .map_err(|_| DebugError::UnknownCommand(name.to_string()))?;
                self.cmd_zero_page_slot(slot, args)
            }
            _ => Err(DebugError::UnknownCommand(name.to_string())),
        }
    }

    fn parse_count(&self, args: &[&str]) -> Result<u32> {
        match args.first() {
            Some(arg) => parse_hex(arg),
            None => Ok(1),
        }
    }

    // ---- ブレークポイント ----

    fn cmd_breakpoint_pc<T: DebugTarget + ?Sized>(&mut self, target: &T, args: &[&str], temp: bool) -> Result<Vec<String>> {
        let (address, tail) = match args.first() {
            Some(arg) => parse_range(arg)?,
            None => (target.registers().pc, None),
        };
        let length = range_length(address, tail)?;
        let bp = Breakpoint::new(BreakpointSource::RegPc, BreakpointOperator::Equal, address, length, temp);
        self.add_breakpoint(target, bp)?;
        Ok(Vec::new())
    }

    /// `BPR reg [op] value[,len]`
    fn cmd_breakpoint_register<T: DebugTarget + ?Sized>(&mut self, target: &T, args: &[&str]) -> Result<Vec<String>> {
        let (source, operator, value) = match args {
            [reg, value] => (reg.parse::<BreakpointSource>()?, BreakpointOperator::Equal, *value),
            [reg, op, value] => (reg.parse::<BreakpointSource>()?, op.parse::<BreakpointOperator>()?, *value),
            _ => return Err(DebugError::Syntax("BPR reg [op] value[,len]".to_string())),
        };
        if !source.is_register() && source != BreakpointSource::Opcode {
            return Err(DebugError::Syntax(format!("'{}' is not a register", source)));
        }
        let (address, tail) = parse_range(value)?;
        let length = range_length(address, tail)?;
        self.add_breakpoint(target, Breakpoint::new(source, operator, address, length, false))?;
        Ok(Vec::new())
    }

    fn cmd_breakpoint_memory<T: DebugTarget + ?Sized>(
        &mut self,
        target: &T,
        source: BreakpointSource,
        args: &[&str],
    ) -> Result<Vec<String>> {
        let arg = args
            .first()
            .ok_or_else(|| DebugError::Syntax(format!("BP{} needs an address", source)))?;
        let (address, tail) = parse_range(arg)?;
        let length = range_length(address, tail)?;
        self.add_breakpoint(target, Breakpoint::new(source, BreakpointOperator::Equal, address, length, false))?;
        Ok(Vec::new())
    }

    /// `BPA [slot] src [op] addr[,len]`
    fn cmd_breakpoint_add<T: DebugTarget + ?Sized>(&mut self, target: &T, args: &[&str]) -> Result<Vec<String>> {
        let (slot, rest) = match args {
            [_, _, _, _] => (Some(SlotArg::parse(args[0])?), &args[1..]),
            [_, second, _] if second.parse::<BreakpointOperator>().is_err() => {
                (Some(SlotArg::parse(args[0])?), &args[1..])
            }
            _ => (None, args),
        };
        let (source, operator, range) = match rest {
            [src, range] => (src.parse::<BreakpointSource>()?, BreakpointOperator::Equal, *range),
            [src, op, range] => (src.parse::<BreakpointSource>()?, op.parse::<BreakpointOperator>()?, *range),
            _ => return Err(DebugError::Syntax("BPA [slot] src [op] addr[,len]".to_string())),
        };
        let (address, tail) = parse_range(range)?;
        let length = range_length(address, tail)?;
        let bp = Breakpoint::new(source, operator, address, length, false);
        match slot {
            Some(SlotArg::Index(slot)) => self.place_breakpoint(target, slot, bp)?,
            Some(_) => return Err(DebugError::Syntax("BPA needs a single slot".to_string())),
            None => {
                self.add_breakpoint(target, bp)?;
            }
        }
        Ok(Vec::new())
    }

    /// `BPCHANGE slot flags…`（E/e 有効、T/t 一時、S/s 停止）
    fn cmd_breakpoint_change(&mut self, args: &[&str]) -> Result<Vec<String>> {
        let (slot_arg, flags) = args
            .split_first()
            .ok_or_else(|| DebugError::Syntax("BPCHANGE slot flags".to_string()))?;
        let slot = parse_hex(slot_arg)? as usize;
        let invalid = self.breakpoints.invalid_slot(slot);
        let mut bp = self.breakpoints.get(slot).cloned().ok_or(invalid)?;

        for flag in flags.iter().flat_map(|f| f.chars()) {
            match flag {
                'E' => bp.enabled = true,
                'e' => bp.enabled = false,
                'T' => bp.temp = true,
                't' => bp.temp = false,
                'S' => bp.stop = true,
                's' => bp.stop = false,
                other => return Err(DebugError::Syntax(format!("unknown breakpoint flag '{}'", other))),
            }
        }
        if let Some(slot_bp) = self.breakpoints.get_mut(slot) {
            *slot_bp = bp;
        }
        Ok(Vec::new())
    }

    /// `BRK [0-3|ALL] [ON|OFF]`
    fn cmd_break_invalid(&mut self, args: &[&str]) -> Result<Vec<String>> {
        let (kind, switch) = match args {
            [] => ("0", None),
            [one] if parse_switch(one).is_ok() => ("0", Some(parse_switch(one)?)),
            [kind] => (*kind, None),
            [kind, switch] => (*kind, Some(parse_switch(switch)?)),
            _ => return Err(DebugError::Syntax("BRK [0-3|ALL] [ON|OFF]".to_string())),
        };

        let (flags, label) = if kind.eq_ignore_ascii_case("ALL") {
            (BreakOnInvalid::all(), "BRK opcode and INVALID opcodes".to_string())
        } else {
            let index = parse_hex(kind)?;
            let flags = BreakOnInvalid::class(index as u16);
            if index > 3 || flags.is_empty() {
                return Err(DebugError::InvalidRange(
                    "Break on invalid opcode type must be 0-3 or ALL.".to_string(),
                ));
            }
            let label = if index == 0 {
                "BRK opcode".to_string()
            } else {
                format!("INVALID {:X} opcode", index)
            };
            (flags, label)
        };

        if let Some(on) = switch {
            self.break_on_invalid.set(flags, on);
        }
        Ok(vec![format!(
            "Enter debugger on {}: {}",
            label,
            on_off(self.break_on_invalid.contains(flags))
        )])
    }

    /// `BRKOP [op|OFF]`
    fn cmd_break_opcode(&mut self, args: &[&str]) -> Result<Vec<String>> {
        if let Some(arg) = args.first() {
            if arg.eq_ignore_ascii_case("OFF") {
                self.break_on_opcode = None;
            } else {
                let opcode = parse_hex(arg)?;
                if opcode > 0xFF {
                    return Err(DebugError::InvalidRange(format!("Opcode out of range: ${:X}", opcode)));
                }
                if opcode == 0x00 {
                    return Err(DebugError::InvalidRange("Use BRK to break on BRK.".to_string()));
                }
                self.break_on_opcode = Some(opcode as u8);
            }
        }
        Ok(vec![match self.break_on_opcode {
            Some(opcode) => format!("Enter debugger on opcode: ${:02X}", opcode),
            None => "Enter debugger on opcode: OFF".to_string(),
        }])
    }

    /// `BRKINT [ON|OFF]`
    fn cmd_break_interrupt(&mut self, args: &[&str]) -> Result<Vec<String>> {
        if let Some(arg) = args.first() {
            self.break_on_interrupt = parse_switch(arg)?;
        }
        Ok(vec![format!("Enter debugger on interrupt: {}", on_off(self.break_on_interrupt))])
    }

    // ---- ウォッチ / ゼロページ ----

    /// `WA [slot] addr…|V`
    fn cmd_watch_add(&mut self, args: &[&str]) -> Result<Vec<String>> {
        if args.is_empty() {
            return Ok(self.watches.list());
        }
        let (slot, rest) = split_slot(args)?;
        let targets = rest
            .iter()
            .map(|arg| {
                if arg.eq_ignore_ascii_case("V") {
                    Ok(WatchTarget::VideoScanner)
                } else {
                    parse_address(arg).map(WatchTarget::Memory)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        let placed = self.add_watches(slot, &targets)?;
        if placed.len() < targets.len() {
            let full = DebugError::TableFull { kind: Watch::KIND, capacity: MAX_WATCHES };
            return Ok(vec![full.to_string()]);
        }
        Ok(Vec::new())
    }

    /// `ZPA [slot] addr…`
    fn cmd_zero_page_add(&mut self, args: &[&str]) -> Result<Vec<String>> {
        if args.is_empty() {
            return Ok(self.zero_page.list());
        }
        let (slot, rest) = split_slot(args)?;
        let addresses = rest.iter().map(|arg| parse_address(arg)).collect::<Result<Vec<_>>>()?;
        let placed = self.add_zero_page_pointers(slot, &addresses)?;
        if placed.len() < addresses.len() {
            let full = DebugError::TableFull { kind: ZeroPagePointer::KIND, capacity: MAX_ZEROPAGE_POINTERS };
            return Ok(vec![full.to_string()]);
        }
        Ok(Vec::new())
    }

    /// `ZP0`〜`ZP7 [addr]`
    fn cmd_zero_page_slot(&mut self, slot: usize, args: &[&str]) -> Result<Vec<String>> {
        let address = args.first().map(|arg| parse_address(arg)).transpose()?;
        self.set_zero_page_pointer(slot, address)?;
        Ok(Vec::new())
    }

    // ---- 実行 ----

    /// `G [until [skip,len|skip:end]]`
    fn cmd_go<T: DebugTarget + ?Sized>(&mut self, target: &mut T, args: &[&str], full_speed: bool) -> Result<Vec<String>> {
        let until = args.first().map(|arg| parse_address(arg)).transpose()?;
        let skip = match args.get(1) {
            Some(arg) => {
                let (start, tail) = parse_range(arg)?;
                Some(match tail {
                    Some(RangeTail::Length(len)) => SkipRange::with_length(start, len),
                    Some(RangeTail::End(end)) => SkipRange::with_end(start, end),
                    None => return Err(DebugError::Syntax("skip range needs ,len or :end".to_string())),
                })
            }
            None => None,
        };
        self.go(until, skip, full_speed);
        Ok(self.run_to_halt(target, StepReport::default()).reasons)
    }

    /// 停止するまで回す。上限に達したら止めて、その旨を停止理由に足す
    fn run_to_halt<T: DebugTarget + ?Sized>(&mut self, target: &mut T, first: StepReport) -> StepReport {
        let mut report = first;
        report.merge(self.run_until_halt(target, self.run_limit));
        if self.is_stepping() {
            self.stop_stepping();
            report.merge(self.continue_stepping(target));
            report.reasons.push(format!("Stopped after {} instructions.", report.executed));
        }
        report
    }

    /// `R reg value`
    fn cmd_register<T: DebugTarget + ?Sized>(&mut self, target: &mut T, args: &[&str]) -> Result<Vec<String>> {
        let [reg, value] = args else {
            return Ok(vec![super::format_registers(target.registers())]);
        };
        let value = parse_hex(value)?;
        let source: BreakpointSource = reg.parse()?;
        let byte = || {
            u8::try_from(value)
                .map_err(|_| DebugError::InvalidRange(format!("Value out of range: ${:X}", value)))
        };
        let regs = target.registers_mut();
        match source {
            BreakpointSource::RegA => regs.a = byte()?,
            BreakpointSource::RegX => regs.x = byte()?,
            BreakpointSource::RegY => regs.y = byte()?,
            BreakpointSource::RegS => regs.sp = byte()?,
            BreakpointSource::RegP => regs.status = byte()?,
            BreakpointSource::RegPc => {
                regs.pc = u16::try_from(value)
                    .map_err(|_| DebugError::InvalidRange(format!("Address out of range: ${:X}", value)))?
            }
            other => return Err(DebugError::Syntax(format!("'{}' is not a register", other))),
        }
        Ok(vec![super::format_registers(target.registers())])
    }

    /// `PROFILE [n|RESET]`
    fn cmd_profile<T: DebugTarget + ?Sized>(&mut self, target: &T, args: &[&str]) -> Result<Vec<String>> {
        if args.first().is_some_and(|arg| arg.eq_ignore_ascii_case("RESET")) {
            self.clear_profile();
            return Ok(Vec::new());
        }
        let count = match args.first() {
            Some(arg) => parse_hex(arg)? as usize,
            None => 10,
        };
        Ok(self
            .hot_opcodes(count)
            .into_iter()
            .map(|(opcode, hits)| {
                let info = opcode_info(target.cpu_type(), opcode);
                format!("  {:02X} {:<4} {:>10}", opcode, info.mnemonic.name(), hits)
            })
            .collect())
    }

    // ---- 保存形式 ----

    /// 全テーブルをコマンド列として書き出す
    pub fn save_lines(&self) -> Vec<String> {
        let mut lines = vec!["// Breakpoints".to_string(), "BPC *".to_string()];
        for (slot, bp) in self.breakpoints.iter() {
            lines.push(format!(
                "BPA {:X} {} {} {:04X},{:04X}",
                slot, bp.source, bp.operator, bp.address, bp.length
            ));
            let mut flags = Vec::new();
            if bp.temp {
                flags.push("T");
            }
            if !bp.stop {
                flags.push("s");
            }
            if !flags.is_empty() {
                lines.push(format!("BPCHANGE {:X} {}", slot, flags.join(" ")));
            }
            if !bp.enabled {
                lines.push(format!("BPD {:X}", slot));
            }
        }

        lines.push("// Watches".to_string());
        lines.push("WC *".to_string());
        for (slot, watch) in self.watches.iter() {
            let target = match watch.target {
                WatchTarget::Memory(address) => format!("{:04X}", address),
                WatchTarget::VideoScanner => "V".to_string(),
                WatchTarget::None => continue,
            };
            lines.push(format!("WA {:X} {}", slot, target));
            if !watch.enabled {
                lines.push(format!("WD {:X}", slot));
            }
        }

        lines.push("// Zero Page Pointers".to_string());
        lines.push("ZPC *".to_string());
        for (slot, zp) in self.zero_page.iter() {
            lines.push(format!("ZPA {:X} {:02X}", slot, zp.address));
            if !zp.enabled {
                lines.push(format!("ZPD {:X}", slot));
            }
        }
        lines
    }
}

/// `xC [slot…|*]`（引数なしは全削除）
fn clear_table<R: SlotRecord, const N: usize>(table: &mut SlotTable<R, N>, args: &[&str]) -> Result<Vec<String>> {
    let slots = parse_slots(args)?;
    if slots.is_empty() {
        table.remove_all();
    } else {
        table.clear(&slots);
    }
    Ok(Vec::new())
}

/// `xD`/`xE slot…|*`
fn enable_table<R: SlotRecord, const N: usize>(
    table: &mut SlotTable<R, N>,
    args: &[&str],
    enabled: bool,
) -> Result<Vec<String>> {
    if table.is_empty() {
        return Err(DebugError::NoneDefined(R::KIND));
    }
    let slots = parse_slots(args)?;
    if slots.is_empty() {
        return Err(DebugError::Syntax("missing slot number".to_string()));
    }
    table.set_enabled(&slots, enabled);
    Ok(Vec::new())
}
