//! デバッガのエラー型
//!
//! ユーザー入力に起因するエラーはすべてここに集約し、コマンド層で
//! 表示用の1行に変換する。ステップ実行ループからは返さない。

/// デバッガ操作のエラー
#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    /// 空きスロットがない
    #[error("All {kind} slots are currently in use.  (Max: {capacity})")]
    TableFull { kind: &'static str, capacity: usize },

    /// 範囲外または未使用のスロット
    #[error("Invalid {kind} slot #{slot:X}.  (Max: {max})")]
    InvalidSlot { kind: &'static str, slot: usize, max: usize },

    #[error("{0}")]
    InvalidRange(String),

    /// 定義済みのエントリがない
    #[error("There are no {0} defined.")]
    NoneDefined(&'static str),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DebugError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = DebugError::TableFull { kind: "breakpoints", capacity: 16 };
        assert_eq!(err.to_string(), "All breakpoints slots are currently in use.  (Max: 16)");

        let err = DebugError::InvalidSlot { kind: "watch", slot: 0x0A, max: 6 };
        assert_eq!(err.to_string(), "Invalid watch slot #A.  (Max: 6)");

        let err = DebugError::NoneDefined("watches");
        assert_eq!(err.to_string(), "There are no watches defined.");
    }
}
