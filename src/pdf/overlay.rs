//! Content painted after cleaning: fill rectangles and annotation overlays

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::{debug, warn};

use super::annotations::{Overlay, OverlayText, RedactAnnotation};
use super::cleanup::{CleanupLocation, Color};
use super::font::Font;
use super::objects::{
    dict_number_array, inline_resource_categories, name_object, page_resources, real, resolve, resolve_dict,
    set_resource, unique_resource_name,
};
use crate::error::Result;
use crate::geometry::{Matrix, Rectangle};
use crate::layout::{effective_font_size, layout_overlay_text};

fn rect_operation(rect: &Rectangle) -> Operation {
    Operation::new(
        "re",
        vec![real(rect.llx), real(rect.lly), real(rect.width()), real(rect.height())],
    )
}

fn fill_color_operation(color: Color) -> Operation {
    Operation::new(
        "rg",
        vec![real(color.r as f64), real(color.g as f64), real(color.b as f64)],
    )
}

/// `q r g b rg x y w h re f Q` for every location that has a fill colour
pub fn fill_content(locations: &[CleanupLocation]) -> Result<Vec<u8>> {
    let mut operations = Vec::new();
    for location in locations {
        let Some(color) = location.fill_color else { continue };
        operations.extend([
            Operation::new("q", vec![]),
            fill_color_operation(color),
            rect_operation(&location.region),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }
    if operations.is_empty() {
        return Ok(Vec::new());
    }
    Ok(Content { operations }.encode()?)
}

/// Clip to the union of the annotation's regions
fn clip_operations(regions: &[Rectangle]) -> Vec<Operation> {
    let mut operations: Vec<Operation> = regions.iter().map(rect_operation).collect();
    operations.push(Operation::new("W", vec![]));
    operations.push(Operation::new("n", vec![]));
    operations
}

/// Content drawing the annotation's overlay, registering what it needs in the page
/// resources. `None` when the annotation has no overlay or it cannot be placed.
pub fn draw_overlay(doc: &mut Document, page_id: ObjectId, annotation: &RedactAnnotation) -> Result<Option<Vec<u8>>> {
    let (Some(overlay), Some(area)) = (&annotation.overlay, annotation.overlay_area()) else {
        return Ok(None);
    };
    let body = match overlay {
        Overlay::Appearance(form) => appearance_operations(doc, page_id, form, &area)?,
        Overlay::Text(text) => text_operations(doc, page_id, text, &area)?,
    };
    let Some(body) = body else { return Ok(None) };

    let mut operations = vec![Operation::new("q", vec![])];
    operations.extend(clip_operations(&annotation.regions));
    operations.extend(body);
    operations.push(Operation::new("Q", vec![]));
    Ok(Some(Content { operations }.encode()?))
}

/// Map the form's transformed `BBox` onto `area` and invoke it
fn appearance_operations(
    doc: &mut Document,
    page_id: ObjectId,
    form: &Stream,
    area: &Rectangle,
) -> Result<Option<Vec<Operation>>> {
    let Some(bbox) = dict_number_array(doc, &form.dict, b"BBox").filter(|b| b.len() == 4) else {
        warn!("Overlay appearance has no BBox; not drawn");
        return Ok(None);
    };
    let bbox = Rectangle::new(bbox[0], bbox[1], bbox[2], bbox[3]);
    let matrix = dict_number_array(doc, &form.dict, b"Matrix")
        .and_then(|m| Matrix::from_slice(&m))
        .unwrap_or_default();
    let placed = match Rectangle::bounding(&matrix.transform_rect(&bbox)) {
        Some(placed) if placed.width() > f64::EPSILON && placed.height() > f64::EPSILON => placed,
        _ => {
            warn!("Overlay appearance has an empty bounding box; not drawn");
            return Ok(None);
        }
    };

    let fit = Matrix::translate(-placed.llx, -placed.lly)
        .multiply(&Matrix::scale(area.width() / placed.width(), area.height() / placed.height()))
        .multiply(&Matrix::translate(area.llx, area.lly));

    let form_id = doc.add_object(form.clone());
    let name = with_page_resources(doc, page_id, |resources| {
        let name = unique_resource_name(resources, b"XObject", b"RO");
        set_resource(resources, b"XObject", &name, Object::Reference(form_id));
        name
    })?;
    debug!("Overlay appearance registered as /{}", String::from_utf8_lossy(&name));

    Ok(Some(vec![
        Operation::new("cm", fit.to_array().iter().map(|v| real(*v)).collect()),
        Operation::new("Do", vec![name_object(&name)]),
    ]))
}

fn text_operations(
    doc: &mut Document,
    page_id: ObjectId,
    overlay: &OverlayText,
    area: &Rectangle,
) -> Result<Option<Vec<Operation>>> {
    if overlay.text.is_empty() {
        return Ok(None);
    }
    let (font_name, font) = overlay_font(doc, page_id, overlay.appearance.font.as_deref())?;
    let font_size = effective_font_size(overlay.appearance.font_size, area);
    let text_width = font.string_width(&overlay.text, font_size);
    let lines = layout_overlay_text(
        area,
        text_width,
        font_size,
        font.ascent(),
        overlay.alignment,
        overlay.repeat,
    );

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![name_object(&font_name), real(font_size)]),
    ];
    operations.extend(overlay.appearance.color.iter().cloned());
    for line in lines {
        operations.push(Operation::new(
            "Tm",
            vec![real(1.0), real(0.0), real(0.0), real(1.0), real(line.x), real(line.y)],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(overlay.text.repeat(line.repetitions), StringFormat::Literal)],
        ));
    }
    operations.push(Operation::new("ET", vec![]));
    Ok(Some(operations))
}

/// The font named by the default appearance: from the page resources, else the
/// AcroForm default resources, else a newly added Helvetica
fn overlay_font(doc: &mut Document, page_id: ObjectId, requested: Option<&[u8]>) -> Result<(Vec<u8>, Font)> {
    if let Some(name) = requested {
        let resources = page_resources(doc, page_id)?;
        if let Some(font) = page_font(doc, &resources, name)? {
            return Ok((name.to_vec(), font));
        }
        if let Some(entry) = acroform_font(doc, name)? {
            let font = font_metrics(doc, &entry);
            with_page_resources(doc, page_id, |resources| set_resource(resources, b"Font", name, entry))?;
            return Ok((name.to_vec(), font));
        }
        warn!(
            "Overlay font /{} not found; using Helvetica",
            String::from_utf8_lossy(name)
        );
    }

    let font_id = use_helvetica_font(doc);
    let name = with_page_resources(doc, page_id, |resources| {
        let name = unique_resource_name(resources, b"Font", b"Helv");
        set_resource(resources, b"Font", &name, Object::Reference(font_id));
        name
    })?;
    Ok((name, Font::standard(b"Helvetica")))
}

fn page_font(doc: &Document, resources: &Dictionary, name: &[u8]) -> Result<Option<Font>> {
    let Some(fonts) = resolve_dict(doc, resources, b"Font")? else {
        return Ok(None);
    };
    Ok(fonts.get(name).ok().map(|entry| font_metrics(doc, entry)))
}

fn acroform_font(doc: &Document, name: &[u8]) -> Result<Option<Object>> {
    let catalog = match doc.trailer.get(b"Root").map(|root| resolve(doc, root)) {
        Ok(Ok(Object::Dictionary(catalog))) => catalog,
        _ => return Ok(None),
    };
    let Some(acroform) = resolve_dict(doc, catalog, b"AcroForm")? else {
        return Ok(None);
    };
    let Some(dr) = resolve_dict(doc, acroform, b"DR")? else {
        return Ok(None);
    };
    let Some(fonts) = resolve_dict(doc, dr, b"Font")? else {
        return Ok(None);
    };
    Ok(fonts.get(name).ok().cloned())
}

/// Metrics for a font resource entry; unreadable fonts fall back to Helvetica
fn font_metrics(doc: &Document, entry: &Object) -> Font {
    match resolve(doc, entry) {
        Ok(Object::Dictionary(dict)) => Font::from_dictionary(doc, dict).unwrap_or_else(|err| {
            warn!("Overlay font unreadable ({}); measuring as Helvetica", err);
            Font::standard(b"Helvetica")
        }),
        _ => Font::standard(b"Helvetica"),
    }
}

/// Type1 Helvetica, one of the standard 14 fonts, so nothing is embedded
fn use_helvetica_font(doc: &mut Document) -> ObjectId {
    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    doc.add_object(Object::Dictionary(font))
}

/// Edit the page's effective resources and store them directly on the page
fn with_page_resources<T>(doc: &mut Document, page_id: ObjectId, edit: impl FnOnce(&mut Dictionary) -> T) -> Result<T> {
    let mut resources = page_resources(doc, page_id)?;
    inline_resource_categories(doc, &mut resources)?;
    let result = edit(&mut resources);
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", Object::Dictionary(resources));
    Ok(result)
}
