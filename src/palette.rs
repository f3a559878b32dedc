// Series colours

use plotters::style::RGBColor;

/// Categorical palette, cycled per series.
const SERIES: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

pub fn series_color(index: usize) -> RGBColor {
    SERIES[index % SERIES.len()]
}

/// Colour for series `index`, honouring an override when there is only one series.
pub fn pick(index: usize, series_count: usize, color: Option<&str>) -> RGBColor {
    match color.and_then(parse_color) {
        Some(c) if series_count == 1 => c,
        _ => series_color(index),
    }
}

/// Parse a named colour or `#rrggbb`.
pub fn parse_color(color: &str) -> Option<RGBColor> {
    let color = color.trim();
    if let Some(hex) = color.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return Some(RGBColor(channel(0)?, channel(2)?, channel(4)?));
    }
    match color.to_lowercase().as_str() {
        "red" => Some(RGBColor(214, 39, 40)),
        "green" => Some(RGBColor(44, 160, 44)),
        "blue" => Some(RGBColor(31, 119, 180)),
        "orange" => Some(RGBColor(255, 127, 14)),
        "purple" => Some(RGBColor(148, 103, 189)),
        "brown" => Some(RGBColor(140, 86, 75)),
        "pink" => Some(RGBColor(227, 119, 194)),
        "gray" | "grey" => Some(RGBColor(127, 127, 127)),
        "black" => Some(RGBColor(0, 0, 0)),
        "yellow" => Some(RGBColor(255, 255, 0)),
        "cyan" => Some(RGBColor(0, 255, 255)),
        "magenta" => Some(RGBColor(255, 0, 255)),
        "white" => Some(RGBColor(255, 255, 255)),
        _ => None,
    }
}

/// CSS form of a colour, for the document backend.
pub fn to_hex(color: RGBColor) -> String {
    format!("#{:02x}{:02x}{:02x}", color.0, color.1, color.2)
}
