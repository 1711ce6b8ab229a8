//! Apple II ビデオスキャナ
//!
//! 描画は行わず、CPUサイクルからスキャナ位置（垂直/水平）を計算する。
//! 位置はサイクル数から都度計算するので、フルスピード実行中でも常に最新になる。

use serde::{Deserialize, Serialize};

/// 1スキャンラインあたりのCPUサイクル
pub const CYCLES_PER_LINE: u64 = 65;
/// 水平方向で表示が始まる位置（これ以前は水平ブランキング）
const VISIBLE_HPOS_START: u64 = 25;

/// 映像方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStandard {
    Ntsc,
    Pal,
}

impl VideoStandard {
    /// 1フレームのライン数
    pub fn line_count(self) -> u16 {
        match self {
            VideoStandard::Ntsc => 262,
            VideoStandard::Pal => 312,
        }
    }
}

/// スキャナ位置の計算器
#[derive(Debug, Clone)]
pub struct VideoScanner {
    pub standard: VideoStandard,
}

impl VideoScanner {
    pub fn new(standard: VideoStandard) -> Self {
        VideoScanner { standard }
    }

    pub fn line_count(&self) -> u16 {
        self.standard.line_count()
    }

    /// 垂直位置（0 〜 ライン数-1）
    pub fn vertical_position(&self, total_cycles: u64) -> u16 {
        ((total_cycles / CYCLES_PER_LINE) % self.line_count() as u64) as u16
    }

    /// 水平位置（0 〜 64）
    pub fn horizontal_position(&self, total_cycles: u64) -> u16 {
        (total_cycles % CYCLES_PER_LINE) as u16
    }

    /// ビデオ回路がいま読んでいるテキストページのアドレス
    ///
    /// フローティングバスの値はこのアドレスの内容になる。
    pub fn scan_address(&self, total_cycles: u64, page2: bool) -> u16 {
        let vpos = self.vertical_position(total_cycles) % 192;
        let hpos = self.horizontal_position(total_cycles) as u64;
        let column = hpos.saturating_sub(VISIBLE_HPOS_START).min(39) as u16;
        let base = if page2 { 0x0800 } else { 0x0400 };
        base + Self::text_row_offset((vpos / 8) as usize) as u16 + column
    }

    /// 行0-7:   $400, $480, $500, $580, $600, $680, $700, $780
    /// 行8-15:  $428, $4A8, $528, $5A8, $628, $6A8, $728, $7A8
    /// 行16-23: $450, $4D0, $550, $5D0, $650, $6D0, $750, $7D0
    fn text_row_offset(row: usize) -> usize {
        let group = row / 8;
        let line = row % 8;
        group * 0x28 + line * 0x80
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_counts() {
        assert_eq!(VideoStandard::Ntsc.line_count(), 262);
        assert_eq!(VideoStandard::Pal.line_count(), 312);
    }

    #[test]
    fn test_vertical_position_wraps() {
        let scanner = VideoScanner::new(VideoStandard::Ntsc);
        assert_eq!(scanner.vertical_position(0), 0);
        assert_eq!(scanner.vertical_position(64), 0);
        assert_eq!(scanner.vertical_position(65), 1);
        assert_eq!(scanner.vertical_position(65 * 262), 0);
        assert_eq!(scanner.vertical_position(65 * 263 + 3), 1);
    }

    #[test]
    fn test_scan_address() {
        let scanner = VideoScanner::new(VideoStandard::Ntsc);
        // ライン0、水平ブランキング中は列0
        assert_eq!(scanner.scan_address(0, false), 0x0400);
        // ライン8（テキスト行1）の列2
        assert_eq!(scanner.scan_address(65 * 8 + 27, false), 0x0482);
        assert_eq!(scanner.scan_address(65 * 8 + 27, true), 0x0882);
    }
}
