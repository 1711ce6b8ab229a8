//! デバッガスクリプトの保存と読み込み
//!
//! 保存形式は `SAVE` の出力に日時のコメント行を付けたもの。読み込みは
//! 各行をコマンドとして実行するだけ。

use std::fs;
use std::path::Path;

use super::{DebugSession, DebugTarget};
use crate::error::Result;

/// スクリプトファイルの既定名
pub const DEFAULT_SCRIPT_FILENAME: &str = "a2dbg_script.txt";

impl DebugSession {
    /// テーブルの内容をスクリプトとして保存
    pub fn save_script<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut text = format!(
            "// a2dbg debugger script saved {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        for line in self.save_lines() {
            text.push_str(&line);
            text.push('\n');
        }
        if let Some(dir) = path.as_ref().parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, text)?;
        log::info!("debugger script saved: {:?}", path.as_ref());
        Ok(())
    }

    /// スクリプトを1行ずつ実行し、出力行を返す
    pub fn load_script<T: DebugTarget + ?Sized, P: AsRef<Path>>(
        &mut self,
        target: &mut T,
        path: P,
    ) -> Result<Vec<String>> {
        let text = fs::read_to_string(&path)?;
        let mut output = Vec::new();
        let mut commands = 0;
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }
            commands += 1;
            output.extend(self.execute(target, trimmed));
        }
        log::info!("debugger script loaded: {:?} ({} commands)", path.as_ref(), commands);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::tests::machine;
    use crate::debugger::WatchTarget;
    use crate::error::DebugError;

    #[test]
    fn test_save_and_load_script() {
        let mut m = machine(&[0xEA]);
        let mut session = DebugSession::new();
        for line in ["BP 300,3", "BPT 310", "BPMR 2000", "BPCHANGE 2 s", "WA 4 V", "ZPA 3C", "ZPD 0"] {
            assert!(session.execute(&mut m, line).is_empty(), "{}", line);
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SCRIPT_FILENAME);
        session.save_script(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("// a2dbg debugger script saved "));
        assert!(text.contains("BPA 1 PC = 0310,0001\nBPCHANGE 1 T\n"));

        let mut restored = DebugSession::new();
        restored.execute(&mut m, "BPM 1234");
        let output = restored.load_script(&mut m, &path).unwrap();
        assert!(output.is_empty(), "{:?}", output);
        assert_eq!(restored.save_lines(), session.save_lines());
        assert_eq!(restored.watches.get(4).unwrap().target, WatchTarget::VideoScanner);
        assert!(!restored.breakpoints.get(2).unwrap().stop);
    }

    #[test]
    fn test_save_creates_script_dir() {
        let m = machine(&[0xEA]);
        let mut session = DebugSession::new();
        session.add_breakpoint(&m, crate::debugger::tests::pc_bp(0x300)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripts").join("nested").join("boot.txt");
        session.save_script(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("BPA 0 PC = 0300,0001"));
    }

    #[test]
    fn test_load_reports_bad_lines() {
        let mut m = machine(&[0xEA]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "// header\n\nBP 300\nBOGUS 1\nWA C000\n").unwrap();

        let mut session = DebugSession::new();
        let output = session.load_script(&mut m, &path).unwrap();
        assert_eq!(
            output,
            vec!["Unknown command: BOGUS", "You cannot watch an I/O location."]
        );
        assert_eq!(session.breakpoints.count(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let mut m = machine(&[0xEA]);
        let dir = tempfile::tempdir().unwrap();
        let mut session = DebugSession::new();
        let err = session.load_script(&mut m, dir.path().join("none.txt")).unwrap_err();
        assert!(matches!(err, DebugError::Io(_)));
    }
}
