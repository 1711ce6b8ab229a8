//! 設定ファイル管理モジュール
//!
//! デバッガの設定をJSON形式で永続化

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cpu::CpuType;
use crate::debugger::{DEFAULT_STEP_OVER_MAX_STEPS, DEFAULT_TRACE_BUFFER_LIMIT};
use crate::video::VideoStandard;

/// 設定ファイルのデフォルトファイル名
const CONFIG_FILENAME: &str = "a2dbg_config.json";

/// 実行ファイルのディレクトリを取得
pub fn get_exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 相対パスを実行ファイルディレクトリからの絶対パスに解決
pub fn resolve_path(relative: &str) -> PathBuf {
    let path = Path::new(relative);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        get_exe_dir().join(relative)
    }
}

/// 設定ファイルのパスを取得
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join(CONFIG_FILENAME)
}

/// デバッガ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// CPU種別
    pub cpu_type: CpuType,
    /// 映像方式（ビデオブレークポイントのライン数）
    pub video_standard: VideoStandard,
    /// ステップオーバーの上限ステップ数
    pub step_over_max_steps: u32,
    /// BRK/非公式命令で停止するクラス（ビット0=BRK、1〜3=INVALID1〜3）
    pub break_on_invalid: u8,
    /// 指定オペコードで停止
    pub break_on_opcode: Option<u8>,
    /// 割り込みで停止
    pub break_on_interrupt: bool,
    /// トレースバッファの行数
    pub trace_buffer_limit: usize,
    /// スクリプトディレクトリ
    pub script_dir: String,
    /// 最後に使用したスクリプト
    pub last_script: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cpu_type: CpuType::Cpu6502,
            video_standard: VideoStandard::Ntsc,
            step_over_max_steps: DEFAULT_STEP_OVER_MAX_STEPS,
            break_on_invalid: 0,
            break_on_opcode: None,
            break_on_interrupt: false,
            trace_buffer_limit: DEFAULT_TRACE_BUFFER_LIMIT,
            script_dir: "scripts".to_string(),
            last_script: None,
        }
    }
}

impl Config {
    /// 設定ファイルを読み込む（実行ファイルと同じディレクトリから）
    pub fn load() -> Self {
        Self::load_from(get_config_path())
    }

    /// 指定したパスから設定を読み込む（無い・壊れている場合はデフォルト）
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Failed to parse config {:?}: {}, using defaults", path.as_ref(), e);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    /// 設定ファイルを保存する（実行ファイルと同じディレクトリに）
    pub fn save(&self) -> Result<(), String> {
        self.save_to(get_config_path())
    }

    /// 指定したパスに設定を保存する
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        if let Some(dir) = path.as_ref().parent() {
            fs::create_dir_all(dir).map_err(|e| format!("Failed to create config directory: {}", e))?;
        }
        fs::write(path, json).map_err(|e| format!("Failed to write config: {}", e))?;
        Ok(())
    }

    /// スクリプトディレクトリの絶対パスを取得
    pub fn script_dir_path(&self) -> PathBuf {
        resolve_path(&self.script_dir)
    }

    /// スクリプトのパスを取得（相対ならスクリプトディレクトリ基準）
    pub fn script_path(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.script_dir_path().join(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let config = Config {
            cpu_type: CpuType::Cpu65C02,
            video_standard: VideoStandard::Pal,
            step_over_max_steps: 0x1000,
            break_on_invalid: 0b0011,
            break_on_opcode: Some(0xEA),
            last_script: Some("boot.txt".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"cpu_type\": \"65c02\""));
        assert!(text.contains("\"video_standard\": \"pal\""));
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_save_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join(CONFIG_FILENAME);
        Config::default().save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_missing_or_broken_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_from(dir.path().join("none.json")), Config::default());

        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "break_on_interrupt": true }"#).unwrap();
        let config = Config::load_from(&path);
        assert!(config.break_on_interrupt);
        assert_eq!(config.step_over_max_steps, DEFAULT_STEP_OVER_MAX_STEPS);
        assert_eq!(config.trace_buffer_limit, DEFAULT_TRACE_BUFFER_LIMIT);
    }

    #[test]
    fn test_script_path() {
        let config = Config { script_dir: "/tmp/scripts".to_string(), ..Config::default() };
        assert_eq!(config.script_path("a.txt"), PathBuf::from("/tmp/scripts/a.txt"));
        assert_eq!(config.script_path("/x/b.txt"), PathBuf::from("/x/b.txt"));
    }

    #[test]
    fn test_session_from_config() {
        use crate::debugger::{BreakOnInvalid, DebugSession};
        let config = Config {
            break_on_invalid: 0b0101,
            break_on_opcode: Some(0x00),
            step_over_max_steps: 10,
            ..Config::default()
        };
        let session = DebugSession::with_config(&config);
        assert_eq!(session.break_on_invalid, BreakOnInvalid::BRK | BreakOnInvalid::INVALID2);
        assert_eq!(session.break_on_opcode, None);
        assert_eq!(session.step_over_max_steps, 10);
    }
}
