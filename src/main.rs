//! A2DBG - Apple II 6502/65C02 debugger
//!
//! バイナリイメージをメモリに置き、標準入力からデバッガコマンドを読んで実行する。
//!
//! # 使用方法
//! ```text
//! a2dbg program.bin --load 0800 --script breakpoints.txt
//! ```

use a2dbg::apple2::Apple2;
use a2dbg::config::Config;
use a2dbg::cpu::CpuType;
use a2dbg::debugger::{disassemble, format_registers, DebugSession, DebugTarget};
use a2dbg::video::VideoStandard;
use clap::Parser;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// A2DBG - Apple II 6502/65C02 debugger
#[derive(Parser, Debug)]
#[command(name = "a2dbg")]
#[command(author = "A2RS Project")]
#[command(version = "0.2.0")]
#[command(about = "A2DBG - Apple II 6502/65C02 debugger", long_about = None)]
struct Args {
    /// 読み込むバイナリイメージ
    program: Option<PathBuf>,

    /// 読み込みアドレス（16進）
    #[arg(long, default_value = "0300", value_parser = parse_hex_u16)]
    load: u16,

    /// 開始PC（16進、省略時は読み込みアドレス）
    #[arg(long, value_parser = parse_hex_u16)]
    pc: Option<u16>,

    /// CPU種別 (6502, 65c02)
    #[arg(long)]
    cpu: Option<CpuType>,

    /// PAL（312ライン）
    #[arg(long)]
    pal: bool,

    /// プロンプトの前に実行するスクリプト
    #[arg(long)]
    script: Option<PathBuf>,

    /// 設定ファイル
    #[arg(long)]
    config: Option<PathBuf>,

    /// スクリプトを実行したら終了
    #[arg(long)]
    batch: bool,
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches('$'), 16)
        .map_err(|e| format!("invalid hex address '{}': {}", s, e))
}

/// 実行後にレジスタ行を表示するコマンド
const STEPPING_COMMANDS: [&str; 6] = ["G", "GG", "T", "TL", "P", "RET"];

fn main() {
    env_logger::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(cpu) = args.cpu {
        config.cpu_type = cpu;
    }
    if args.pal {
        config.video_standard = VideoStandard::Pal;
    }

    let mut machine = Apple2::new(config.cpu_type, config.video_standard);
    if let Some(path) = &args.program {
        let loaded = fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|data| machine.load_program(args.load, &data));
        if let Err(e) = loaded {
            eprintln!("Failed to load program {:?}: {}", path, e);
            std::process::exit(1);
        }
    }
    machine.set_pc(args.pc.unwrap_or(args.load));

    let mut session = DebugSession::with_config(&config);
    session.enter_debugger();

    if let Some(path) = &args.script {
        match session.load_script(&mut machine, path) {
            Ok(lines) => print_lines(&lines),
            Err(e) => {
                eprintln!("Failed to run script {:?}: {}", path, e);
                if args.batch {
                    std::process::exit(1);
                }
            }
        }
    }
    if args.batch {
        print_status(&machine);
        return;
    }

    print_status(&machine);
    run_prompt(&mut session, &mut machine, &mut config, args.config.as_ref());
}

/// 対話プロンプト
fn run_prompt(
    session: &mut DebugSession,
    machine: &mut Apple2,
    config: &mut Config,
    config_path: Option<&PathBuf>,
) {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let Some(Ok(line)) = lines.next() else {
            break;
        };
        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or("").to_ascii_uppercase();
        let arg = words.next();

        match (name.as_str(), arg) {
            ("Q" | "QUIT" | "EXIT", _) => break,
            // SAVE FILE / RUN FILE はスクリプトファイルを扱う
            ("SAVE", Some(file)) => {
                let path = config.script_path(file);
                match session.save_script(&path) {
                    Ok(()) => {
                        println!("Saved {:?}", path);
                        config.last_script = Some(file.to_string());
                        save_config(config, config_path);
                    }
                    Err(e) => println!("{}", e),
                }
            }
            ("RUN", file) => {
                let Some(file) = file.map(str::to_string).or_else(|| config.last_script.clone()) else {
                    println!("No script to run.");
                    continue;
                };
                match session.load_script(machine, config.script_path(&file)) {
                    Ok(output) => print_lines(&output),
                    Err(e) => println!("{}", e),
                }
            }
            _ => {
                print_lines(&session.execute(machine, &line));
                if STEPPING_COMMANDS.contains(&name.as_str()) {
                    print_status(machine);
                }
            }
        }
    }
}

fn save_config(config: &Config, path: Option<&PathBuf>) {
    let result = match path {
        Some(path) => config.save_to(path),
        None => config.save(),
    };
    if let Err(e) = result {
        eprintln!("Failed to save config: {}", e);
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

/// 現在の命令とレジスタ
fn print_status(machine: &Apple2) {
    let pc = machine.registers().pc;
    println!("{}", disassemble(machine, pc));
    println!("{}", format_registers(machine.registers()));
}
