//! 白底配色：按图层名称匹配颜色。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#RRGGBB` 形式。
    pub fn hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

const LAYER_COLORS: [(&str, Rgb); 12] = [
    ("WALL", Rgb::new(0xCC, 0x00, 0x00)),
    ("S_WALL", Rgb::new(0xCC, 0x00, 0x00)),
    ("COLUMN", Rgb::new(0xFF, 0x66, 0x00)),
    ("WINDOW", Rgb::new(0x00, 0x99, 0xCC)),
    ("E_WINDOW", Rgb::new(0x00, 0x99, 0xCC)),
    ("DIM", Rgb::new(0x00, 0x00, 0xCC)),
    ("PUB_DIM", Rgb::new(0x00, 0x00, 0xCC)),
    ("TEXT", Rgb::new(0x00, 0x88, 0x00)),
    ("PUB_TEXT", Rgb::new(0x00, 0x88, 0x00)),
    ("AXIS", Rgb::new(0xCC, 0x88, 0x00)),
    ("STAIR", Rgb::new(0xCC, 0x00, 0xCC)),
    ("E_STAIR", Rgb::new(0xCC, 0x00, 0xCC)),
];

pub const DEFAULT_COLOR: Rgb = Rgb::BLACK;

/// 图层颜色：先按大写全名精确匹配，再按表顺序做子串匹配，都不命中取黑色。
pub fn layer_color(layer: &str) -> Rgb {
    let upper = layer.to_uppercase();
    LAYER_COLORS
        .iter()
        .find(|(name, _)| *name == upper)
        .or_else(|| LAYER_COLORS.iter().find(|(name, _)| upper.contains(name)))
        .map_or(DEFAULT_COLOR, |(_, color)| *color)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    #[default]
    ByLayer,
    Monochrome,
}

impl ColorMode {
    #[inline]
    pub fn color_for(self, layer: &str) -> Rgb {
        match self {
            ColorMode::ByLayer => layer_color(layer),
            ColorMode::Monochrome => DEFAULT_COLOR,
        }
    }
}
