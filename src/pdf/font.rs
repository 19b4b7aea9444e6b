//! Glyph metrics for the fonts a content stream selects with `Tf`

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use super::objects::{dict_name, dict_number, dict_number_array, number, resolve, resolve_dict, resolve_key};
use crate::error::Result;

/// Ascent/descent (in 1/1000 em) used when neither the descriptor nor a known base font helps
const DEFAULT_ASCENT: f64 = 750.0;
const DEFAULT_DESCENT: f64 = -250.0;

/// Helvetica widths for codes 32..=126
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Times (Liberation Serif metrics) widths for codes 32..=126
#[rustfmt::skip]
const TIMES_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

/// Standard-14 families with built-in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    Times,
    Courier,
}

impl StandardFont {
    /// Recognise a base font name, ignoring subset prefixes and style suffixes
    pub fn from_base_font(base_font: &[u8]) -> Option<Self> {
        let name = String::from_utf8_lossy(base_font);
        let name = name.split_once('+').map_or(name.as_ref(), |(_, rest)| rest);
        if name.starts_with("Courier") {
            Some(StandardFont::Courier)
        } else if name.starts_with("Times") {
            Some(StandardFont::Times)
        } else if name.starts_with("Helvetica") || name.starts_with("Arial") {
            Some(StandardFont::Helvetica)
        } else {
            None
        }
    }

    fn width(self, code: u32) -> Option<f64> {
        let table = match self {
            StandardFont::Courier => return Some(600.0),
            StandardFont::Helvetica => &HELVETICA_WIDTHS,
            StandardFont::Times => &TIMES_WIDTHS,
        };
        let index = code.checked_sub(32)? as usize;
        table.get(index).map(|w| *w as f64)
    }

    fn ascent_descent(self) -> (f64, f64) {
        match self {
            StandardFont::Helvetica => (718.0, -207.0),
            StandardFont::Times => (683.0, -217.0),
            StandardFont::Courier => (629.0, -157.0),
        }
    }
}

/// Metrics of one font resource
#[derive(Debug, Clone)]
pub struct Font {
    /// Type0 fonts read two-byte codes
    composite: bool,
    first_char: u32,
    widths: Vec<f64>,
    cid_widths: HashMap<u32, f64>,
    standard: Option<StandardFont>,
    missing_width: f64,
    /// Glyph units to text space (1/1000, or FontMatrix[0] for Type3)
    glyph_scale: f64,
    /// Text space per unit font size
    ascent: f64,
    descent: f64,
}

impl Font {
    /// One of the standard-14 fonts, as an unembedded font dictionary would select it
    pub fn standard(base_font: &[u8]) -> Self {
        let standard = StandardFont::from_base_font(base_font);
        let (ascent, descent) = standard.map_or((DEFAULT_ASCENT, DEFAULT_DESCENT), |s| s.ascent_descent());
        Self {
            composite: false,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            standard,
            missing_width: 500.0,
            glyph_scale: 0.001,
            ascent: ascent / 1000.0,
            descent: descent / 1000.0,
        }
    }

    /// Read metrics from a font dictionary
    pub fn from_dictionary(doc: &Document, dict: &Dictionary) -> Result<Self> {
        let subtype = dict_name(doc, dict, b"Subtype").unwrap_or(b"Type1");
        match subtype {
            b"Type0" => Self::composite(doc, dict),
            b"Type3" => Ok(Self::type3(doc, dict)),
            _ => Self::simple(doc, dict),
        }
    }

    fn simple(doc: &Document, dict: &Dictionary) -> Result<Self> {
        let base_font = dict_name(doc, dict, b"BaseFont").unwrap_or(b"");
        let mut font = Self::standard(base_font);
        font.first_char = dict_number(doc, dict, b"FirstChar").unwrap_or(0.0).max(0.0) as u32;
        font.widths = dict_number_array(doc, dict, b"Widths").unwrap_or_default();
        if !font.widths.is_empty() {
            font.missing_width = 0.0;
        }
        if let Some(descriptor) = resolve_dict(doc, dict, b"FontDescriptor")? {
            font.apply_descriptor(doc, descriptor, 0.001);
        }
        Ok(font)
    }

    fn type3(doc: &Document, dict: &Dictionary) -> Self {
        let matrix = dict_number_array(doc, dict, b"FontMatrix")
            .filter(|m| m.len() == 6)
            .unwrap_or_else(|| vec![0.001, 0.0, 0.0, 0.001, 0.0, 0.0]);
        let mut font = Self::standard(b"");
        font.first_char = dict_number(doc, dict, b"FirstChar").unwrap_or(0.0).max(0.0) as u32;
        font.widths = dict_number_array(doc, dict, b"Widths").unwrap_or_default();
        font.missing_width = 0.0;
        font.glyph_scale = matrix[0];
        if let Some(bbox) = dict_number_array(doc, dict, b"FontBBox").filter(|b| b.len() == 4) {
            let (ascent, descent) = (bbox[3] * matrix[3], bbox[1] * matrix[3]);
            if ascent > descent {
                font.ascent = ascent;
                font.descent = descent;
            }
        }
        font
    }

    fn composite(doc: &Document, dict: &Dictionary) -> Result<Self> {
        let mut font = Self::standard(b"");
        font.composite = true;
        font.missing_width = 1000.0;

        let descendant = match resolve_key(doc, dict, b"DescendantFonts")? {
            Some(Object::Array(items)) => match items.first() {
                Some(first) => match resolve(doc, first)? {
                    Object::Dictionary(d) => Some(d),
                    _ => None,
                },
                None => None,
            },
            _ => None,
        };
        let Some(cid_font) = descendant else {
            return Ok(font);
        };

        if let Some(dw) = dict_number(doc, cid_font, b"DW") {
            font.missing_width = dw;
        }
        if let Some(Object::Array(w)) = resolve_key(doc, cid_font, b"W")? {
            font.cid_widths = parse_cid_widths(doc, w)?;
        }
        if let Some(descriptor) = resolve_dict(doc, cid_font, b"FontDescriptor")? {
            font.apply_descriptor(doc, descriptor, 0.001);
            // DW wins over the descriptor's MissingWidth for CID fonts
            font.missing_width = dict_number(doc, cid_font, b"DW").unwrap_or(1000.0);
        }
        Ok(font)
    }

    fn apply_descriptor(&mut self, doc: &Document, descriptor: &Dictionary, scale: f64) {
        if let Some(missing) = dict_number(doc, descriptor, b"MissingWidth") {
            self.missing_width = missing;
        }
        let ascent = dict_number(doc, descriptor, b"Ascent").filter(|a| *a != 0.0);
        let descent = dict_number(doc, descriptor, b"Descent").filter(|d| *d != 0.0);
        let bbox = dict_number_array(doc, descriptor, b"FontBBox").filter(|b| b.len() == 4);
        let ascent = ascent.or_else(|| bbox.as_ref().map(|b| b[3]));
        let descent = descent.or_else(|| bbox.as_ref().map(|b| b[1]));
        if let (Some(ascent), Some(descent)) = (ascent, descent) {
            if ascent > descent {
                self.ascent = ascent * scale;
                self.descent = descent.min(0.0) * scale;
            }
        }
    }

    pub fn is_composite(&self) -> bool {
        self.composite
    }

    /// Split a shown string into character codes
    pub fn codes<'b>(&self, bytes: &'b [u8]) -> Vec<&'b [u8]> {
        let size = if self.composite { 2 } else { 1 };
        bytes.chunks(size).collect()
    }

    /// Horizontal displacement w0 of a code, in text space per unit font size
    pub fn glyph_width(&self, code: &[u8]) -> f64 {
        let value = code.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
        let units = if self.composite {
            self.cid_widths.get(&value).copied().unwrap_or(self.missing_width)
        } else {
            value
                .checked_sub(self.first_char)
                .and_then(|i| self.widths.get(i as usize).copied())
                .or_else(|| {
                    if self.widths.is_empty() {
                        self.standard.and_then(|s| s.width(value))
                    } else {
                        None
                    }
                })
                .unwrap_or(self.missing_width)
        };
        units * self.glyph_scale
    }

    /// Word spacing applies to the single-byte code 32 only
    pub fn is_word_space(&self, code: &[u8]) -> bool {
        code == b" "
    }

    pub fn ascent(&self) -> f64 {
        self.ascent
    }

    pub fn descent(&self) -> f64 {
        self.descent
    }

    /// Unscaled width of a whole string at `font_size`, without spacing
    pub fn string_width(&self, bytes: &[u8], font_size: f64) -> f64 {
        self.codes(bytes)
            .iter()
            .map(|code| self.glyph_width(code))
            .sum::<f64>()
            * font_size
    }
}

/// `W` array of a CIDFont: `c [w1 w2 ...]` and `c_first c_last w` forms
fn parse_cid_widths(doc: &Document, w: &[Object]) -> Result<HashMap<u32, f64>> {
    let mut widths = HashMap::new();
    let items: Vec<&Object> = w.iter().map(|o| resolve(doc, o)).collect::<Result<_>>()?;
    let mut i = 0;
    while i < items.len() {
        let Some(first) = number(items[i]) else {
            break;
        };
        let first = first.max(0.0) as u32;
        match items.get(i + 1) {
            Some(Object::Array(list)) => {
                for (offset, entry) in list.iter().enumerate() {
                    let Some(cid) = u32::try_from(offset).ok().and_then(|o| first.checked_add(o)) else {
                        break;
                    };
                    if let Some(width) = resolve(doc, entry).ok().and_then(number) {
                        widths.insert(cid, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let last = number(last).unwrap_or(first as f64).max(0.0) as u32;
                let width = items.get(i + 2).and_then(|o| number(o)).unwrap_or(1000.0);
                // Guard against absurd ranges in broken files
                for cid in first..=last.min(first.saturating_add(0xFFFF)) {
                    widths.insert(cid, width);
                }
                i += 3;
            }
            None => break,
        }
    }
    Ok(widths)
}
