//! Redaction annotations: regions, fill colour and overlay, and their removal

use std::collections::BTreeSet;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::warn;

use super::cleanup::{CleanupLocation, Color};
use super::objects::{dict_name, dict_number, dict_number_array, number, resolve};
use crate::error::{Error, Result};
use crate::geometry::{Point, Rectangle};
use crate::layout::Alignment;

/// Text state from an annotation's `DA` string
#[derive(Debug, Clone, Default)]
pub struct DefaultAppearance {
    /// Font resource name from `Tf`
    pub font: Option<Vec<u8>>,
    /// `0` asks for auto-sizing
    pub font_size: f64,
    /// Colour operators (`g`, `rg`, `k` and their stroking forms)
    pub color: Vec<Operation>,
}

/// Text drawn over the cleaned area
#[derive(Debug, Clone)]
pub struct OverlayText {
    pub text: Vec<u8>,
    pub appearance: DefaultAppearance,
    pub alignment: Alignment,
    pub repeat: bool,
}

#[derive(Debug, Clone)]
pub enum Overlay {
    /// `RO`: a form XObject mapped onto the annotation rectangle
    Appearance(Stream),
    Text(OverlayText),
}

/// A `/Redact` annotation of a page
#[derive(Debug, Clone)]
pub struct RedactAnnotation {
    /// Position in the page's `Annots` array
    pub index: usize,
    /// Object ID when the annotation is an indirect object
    pub id: Option<ObjectId>,
    pub rect: Option<Rectangle>,
    /// One per `QuadPoints` group, or the `Rect`
    pub regions: Vec<Rectangle>,
    pub fill_color: Option<Color>,
    pub overlay: Option<Overlay>,
    pub popup: Option<ObjectId>,
}

impl RedactAnnotation {
    pub fn from_dictionary(doc: &Document, dict: &Dictionary, index: usize, id: Option<ObjectId>) -> Result<Self> {
        let rect = dict_number_array(doc, dict, b"Rect")
            .filter(|values| values.len() == 4)
            .map(|v| Rectangle::new(v[0], v[1], v[2], v[3]));

        let quads: Vec<Rectangle> = dict_number_array(doc, dict, b"QuadPoints")
            .filter(|values| !values.is_empty() && values.len() % 8 == 0)
            .map(|values| {
                values
                    .chunks_exact(8)
                    .filter_map(|q| {
                        let points: Vec<Point> = q.chunks_exact(2).map(|p| Point::new(p[0], p[1])).collect();
                        Rectangle::bounding(&points)
                    })
                    .collect()
            })
            .unwrap_or_default();
        let regions = if quads.is_empty() {
            rect.into_iter().collect()
        } else {
            quads
        };
        if regions.is_empty() {
            return Err(Error::AnnotationGeometryMissing);
        }

        let fill_color = dict_number_array(doc, dict, b"IC").and_then(|c| Color::from_components(&c));
        let popup = match dict.get(b"Popup") {
            Ok(Object::Reference(popup)) => Some(*popup),
            _ => None,
        };

        Ok(Self {
            index,
            id,
            rect,
            regions,
            fill_color,
            overlay: overlay(doc, dict)?,
            popup,
        })
    }

    /// The rectangle overlays are drawn into
    pub fn overlay_area(&self) -> Option<Rectangle> {
        self.rect
            .or_else(|| self.regions.iter().copied().reduce(|a, b| a.union(&b)))
    }

    /// One clean-up location per region, all sharing the fill colour
    pub fn locations(&self, page: u32) -> Vec<CleanupLocation> {
        self.regions
            .iter()
            .map(|region| CleanupLocation {
                page,
                region: *region,
                fill_color: self.fill_color,
            })
            .collect()
    }
}

fn overlay(doc: &Document, dict: &Dictionary) -> Result<Option<Overlay>> {
    if let Ok(entry) = dict.get(b"RO") {
        if let Object::Stream(stream) = resolve(doc, entry)? {
            return Ok(Some(Overlay::Appearance(stream.clone())));
        }
    }

    let text = match dict.get(b"OverlayText").map(|entry| resolve(doc, entry)) {
        Ok(Ok(Object::String(text, _))) => text_string(text),
        _ => return Ok(None),
    };
    let appearance = match dict.get(b"DA").map(|entry| resolve(doc, entry)) {
        Ok(Ok(Object::String(da, _))) => parse_default_appearance(da),
        _ => DefaultAppearance::default(),
    };
    let alignment = dict_number(doc, dict, b"Q").map_or(Alignment::Left, |q| Alignment::from_quadding(q as i64));
    let repeat = matches!(dict.get(b"Repeat"), Ok(Object::Boolean(true)));

    Ok(Some(Overlay::Text(OverlayText {
        text,
        appearance,
        alignment,
        repeat,
    })))
}

/// Text strings may be UTF-16BE; overlay text is shown with a simple font, so
/// characters outside Latin-1 become `?`
fn text_string(bytes: &[u8]) -> Vec<u8> {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest.chunks_exact(2).map(|u| u16::from_be_bytes([u[0], u[1]])).collect();
            char::decode_utf16(units)
                .map(|c| match c {
                    Ok(c) if (c as u32) < 256 => c as u8,
                    _ => b'?',
                })
                .collect()
        }
        _ => bytes.to_vec(),
    }
}

/// Parse a `DA` string such as `/Helv 12 Tf 1 0 0 rg`
pub fn parse_default_appearance(da: &[u8]) -> DefaultAppearance {
    let mut appearance = DefaultAppearance::default();
    let Ok(content) = Content::decode(da) else {
        warn!("Unparsable default appearance {:?}", String::from_utf8_lossy(da));
        return appearance;
    };
    for operation in content.operations {
        match operation.operator.as_str() {
            "Tf" => {
                if let [Object::Name(font), size] = &operation.operands[..] {
                    appearance.font = Some(font.clone());
                    appearance.font_size = number(size).unwrap_or(0.0);
                }
            }
            "g" | "rg" | "k" | "G" | "RG" | "K" => appearance.color.push(operation),
            _ => {}
        }
    }
    appearance
}

/// The page's redaction annotations. Annotations without usable geometry are
/// skipped with a warning.
pub fn redact_annotations(doc: &Document, page_id: ObjectId) -> Result<Vec<RedactAnnotation>> {
    let page = doc.get_dictionary(page_id)?;
    let entries = match page.get(b"Annots").map(|annots| resolve(doc, annots)) {
        Ok(Ok(Object::Array(entries))) => entries,
        _ => return Ok(Vec::new()),
    };

    let mut annotations = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let id = match entry {
            Object::Reference(id) => Some(*id),
            _ => None,
        };
        let Ok(Object::Dictionary(dict)) = resolve(doc, entry) else {
            continue;
        };
        if dict_name(doc, dict, b"Subtype") != Some(&b"Redact"[..]) {
            continue;
        }
        match RedactAnnotation::from_dictionary(doc, dict, index, id) {
            Ok(annotation) => annotations.push(annotation),
            Err(Error::AnnotationGeometryMissing) => {
                warn!("Redaction annotation {} has neither QuadPoints nor Rect; skipped", index);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(annotations)
}

/// Remove `annotations` and their popups from the page's `Annots`; returns how many
/// entries were removed
pub fn remove_annotations(doc: &mut Document, page_id: ObjectId, annotations: &[RedactAnnotation]) -> Result<usize> {
    let indices: BTreeSet<usize> = annotations.iter().map(|a| a.index).collect();
    let ids: BTreeSet<ObjectId> = annotations
        .iter()
        .flat_map(|a| a.id.into_iter().chain(a.popup))
        .collect();

    let annots_ref = match doc.get_dictionary(page_id)?.get(b"Annots") {
        Ok(Object::Reference(id)) => Some(*id),
        Ok(Object::Array(_)) => None,
        _ => return Ok(0),
    };
    let entries = match annots_ref {
        Some(id) => doc.get_object(id)?.as_array()?.clone(),
        None => doc.get_dictionary(page_id)?.get(b"Annots")?.as_array()?.clone(),
    };

    let before = entries.len();
    let kept: Vec<Object> = entries
        .into_iter()
        .enumerate()
        .filter(|(index, entry)| {
            let consumed = indices.contains(index);
            let referenced = matches!(entry, Object::Reference(id) if ids.contains(id));
            !consumed && !referenced
        })
        .map(|(_, entry)| entry)
        .collect();
    let removed = before - kept.len();

    match annots_ref {
        Some(id) if !kept.is_empty() => {
            doc.objects.insert(id, Object::Array(kept));
        }
        _ => {
            let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
            if kept.is_empty() {
                page.remove(b"Annots");
            } else {
                page.set("Annots", Object::Array(kept));
            }
        }
    }
    Ok(removed)
}
