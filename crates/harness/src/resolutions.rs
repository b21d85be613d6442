//! Common display resolutions for sizing the browser window
//!
//! Taken mostly from the Wikipedia list of common display resolutions.
//! Generally it's better to test the given app's responsive breakpoints
//! specifically instead of relying on such standard resolutions.

use serde::{Deserialize, Serialize};

/// A browser window size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub const QVGA: Resolution = Resolution::new(320, 240);
pub const HVGA: Resolution = Resolution::new(480, 320);
pub const NHD: Resolution = Resolution::new(640, 360);
pub const VGA: Resolution = Resolution::new(640, 480);
pub const SVGA: Resolution = Resolution::new(800, 600);
pub const QHD: Resolution = Resolution::new(960, 540);
pub const XGA: Resolution = Resolution::new(1024, 768);
pub const HD: Resolution = Resolution::new(1280, 720);
pub const SXGA: Resolution = Resolution::new(1280, 1024);
pub const WXGA_PLUS: Resolution = Resolution::new(1440, 900);
pub const HD_PLUS: Resolution = Resolution::new(1600, 900);
pub const WSXGA_PLUS: Resolution = Resolution::new(1680, 1050);
pub const FHD: Resolution = Resolution::new(1920, 1080);
pub const WUXGA: Resolution = Resolution::new(1920, 1200);
pub const DCI_2K: Resolution = Resolution::new(2048, 1080);
pub const QWXGA: Resolution = Resolution::new(2048, 1152);
pub const WQHD: Resolution = Resolution::new(2560, 1440);
pub const UWQHD: Resolution = Resolution::new(3440, 1440);
pub const FOUR_K_UHD: Resolution = Resolution::new(3840, 2160);
pub const FIVE_K: Resolution = Resolution::new(5120, 2880);
pub const EIGHT_K_UHD: Resolution = Resolution::new(7680, 4320);
