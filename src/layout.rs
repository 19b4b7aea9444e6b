//! Overlay text layout inside redaction rectangles

use crate::geometry::Rectangle;

/// Horizontal alignment of overlay text, from an annotation's `Q` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    /// `0` left, `1` centred, `2` right; anything else is left
    pub fn from_quadding(q: i64) -> Self {
        match q {
            1 => Alignment::Center,
            2 => Alignment::Right,
            _ => Alignment::Left,
        }
    }
}

/// One line of overlay text: baseline origin and how many copies of the text it holds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextLine {
    pub x: f64,
    pub y: f64,
    pub repetitions: usize,
}

/// Font size used when the default appearance asks for auto-sizing (`0 Tf`)
pub const AUTO_FONT_SIZE: f64 = 12.0;

/// Resolve a requested font size against the available height
pub fn effective_font_size(requested: f64, area: &Rectangle) -> f64 {
    if requested > 0.0 {
        requested
    } else {
        AUTO_FONT_SIZE.min(area.height()).max(1.0)
    }
}

/// Place overlay text inside `area`, top-aligned.
///
/// `text_width` is the width of one copy of the text at `font_size`; `ascent` is per
/// unit font size. Without `repeat` a single copy is placed on the first line. With
/// `repeat` each line holds as many copies as fit and lines continue downwards for as
/// long as they fit, always producing at least one line.
pub fn layout_overlay_text(
    area: &Rectangle,
    text_width: f64,
    font_size: f64,
    ascent: f64,
    alignment: Alignment,
    repeat: bool,
) -> Vec<TextLine> {
    let first_baseline = area.ury - ascent * font_size;
    let (repetitions, line_count) = if repeat {
        let per_line = if text_width > 0.0 {
            (area.width() / text_width).floor() as usize
        } else {
            1
        };
        let lines = if font_size > 0.0 {
            (area.height() / font_size).floor() as usize
        } else {
            1
        };
        (per_line.max(1), lines.max(1))
    } else {
        (1, 1)
    };

    let line_width = text_width * repetitions as f64;
    let x = match alignment {
        Alignment::Left => area.llx,
        Alignment::Center => area.llx + (area.width() - line_width) / 2.0,
        Alignment::Right => area.urx - line_width,
    };

    (0..line_count)
        .map(|i| TextLine {
            x,
            y: first_baseline - font_size * i as f64,
            repetitions,
        })
        .collect()
}
