use colored::{Color, Colorize};
use serde::Serialize;

/// Terminal tints used by the reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tint {
    Red,
    Green,
    Yellow,
    Blue,
    Orange,
    Magenta,
    Cyan,
}

impl Tint {
    pub fn color(&self) -> Color {
        match self {
            Tint::Red => Color::BrightRed,
            Tint::Green => Color::BrightGreen,
            Tint::Yellow => Color::BrightYellow,
            Tint::Blue => Color::BrightBlue,
            Tint::Orange => Color::TrueColor {
                r: 255,
                g: 165,
                b: 0,
            },
            Tint::Magenta => Color::BrightMagenta,
            Tint::Cyan => Color::BrightCyan,
        }
    }

    /// Maps an airfocus item colour onto a tint; unknown colours stay plain.
    pub fn for_item_color(item_color: &str) -> Option<Tint> {
        match item_color {
            "yellow" => Some(Tint::Yellow),
            "orange" => Some(Tint::Orange),
            "great" => Some(Tint::Green),
            "blue" => Some(Tint::Blue),
            _ => None,
        }
    }
}

pub fn paint(text: &str, tint: Option<Tint>) -> String {
    match tint {
        Some(tint) => text.color(tint.color()).to_string(),
        None => text.to_string(),
    }
}

pub fn red(text: &str) -> String {
    paint(text, Some(Tint::Red))
}

/// `text` in `tint` followed by a red ` (Wrong)`; untinted text turns red as a whole.
pub fn wrong(text: &str, tint: Option<Tint>) -> String {
    match tint {
        Some(_) => format!("{}{}", paint(text, tint), red(" (Wrong)")),
        None => red(&format!("{text} (Wrong)")),
    }
}
