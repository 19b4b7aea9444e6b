//! Operator-by-operator rewriting of content streams
//!
//! Every operation is parsed into an [`Operator`], applied to the interpreter state,
//! and then either passed through, suppressed, or replaced by synthesized operators.
//! Chunks describing what an operation showed live only for that operation.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, StringFormat};
use tracing::{debug, warn};

use super::chunk::{all_visible, ContentChunk};
use super::cleanup::CleanupOptions;
use super::graphics_state::{GraphicsState, RenderContext, RenderOutput, TextObject};
use super::listener::{RenderListener, TextRun};
use super::objects::{
    canonical, dict_name, dict_number_array, encode_content, page_content, page_resources, real, resolve_dict,
    stream_content, PendingObjects,
};
use super::operator::{FillRule, Operator, PaintOperator, TextItem};
use super::path::PathBuilder;
use super::region_filter::RegionFilter;
use crate::error::{Error, Result};
use crate::geometry::Matrix;

/// Rewritten page content plus the objects it needs
#[derive(Debug)]
pub struct PageRewrite {
    pub output: RenderOutput,
    /// New XObjects, to be committed only if the page as a whole succeeds
    pub pending: PendingObjects,
}

/// Drives the interpreter over a page and decides what each operator becomes
pub struct ContentOperatorInterceptor<'d> {
    doc: &'d Document,
    listener: RenderListener,
    pending: PendingObjects,
    max_form_depth: usize,
}

impl<'d> ContentOperatorInterceptor<'d> {
    pub fn new(doc: &'d Document, filter: RegionFilter, page: RenderContext, options: &CleanupOptions) -> Self {
        Self {
            doc,
            listener: RenderListener::new(filter, page, options.cleaned_area_color, options.jpeg_quality),
            pending: PendingObjects::new(doc),
            max_form_depth: options.max_form_depth,
        }
    }

    /// Rewrite one page's content against `filter`
    pub fn clean_page(
        doc: &'d Document,
        page_id: ObjectId,
        filter: RegionFilter,
        options: &CleanupOptions,
    ) -> Result<PageRewrite> {
        let resources = page_resources(doc, page_id)?;
        let content = page_content(doc, page_id)?;
        let operations = Content::decode(&content)?.operations;
        let page = RenderContext::new(doc, resources, GraphicsState::default())?;

        let mut interceptor = Self::new(doc, filter, page, options);
        interceptor.run(&operations)?;
        interceptor.finish()
    }

    /// Interpret `operations` in the active context
    pub fn run(&mut self, operations: &[Operation]) -> Result<()> {
        for operation in operations {
            self.intercept(operation)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Result<PageRewrite> {
        let page = self.listener.into_page_context()?;
        Ok(PageRewrite {
            output: page.finish(),
            pending: self.pending,
        })
    }

    fn intercept(&mut self, operation: &Operation) -> Result<()> {
        let operator = Operator::parse(operation)?;
        let doc = self.doc;

        let withholds_path = operator.is_path_construction()
            || matches!(operator, Operator::Paint(_) | Operator::Clip(_));
        if !withholds_path {
            self.flush_unpainted_path();
        }

        let ctx = self.listener.context();
        match operator {
            Operator::Save => {
                ctx.save();
                ctx.emit(operation.clone());
            }
            Operator::Restore => {
                ctx.restore()?;
                ctx.emit(operation.clone());
            }
            Operator::Transform(matrix) => {
                let state = ctx.state_mut();
                state.ctm = matrix.multiply(&state.ctm);
                ctx.emit(operation.clone());
            }

            Operator::MoveTo(p) => self.construct(operation, |path| path.move_to(p)),
            Operator::LineTo(p) => self.construct(operation, |path| path.line_to(p)),
            Operator::CurveTo(c1, c2, to) => self.construct(operation, |path| path.curve_to(c1, c2, to)),
            Operator::CurveV(c2, to) => self.construct(operation, |path| path.curve_v(c2, to)),
            Operator::CurveY(c1, to) => self.construct(operation, |path| path.curve_y(c1, to)),
            Operator::ClosePath => self.construct(operation, |path| path.close()),
            Operator::Rectangle(x, y, w, h) => self.construct(operation, |path| path.rectangle(x, y, w, h)),
            Operator::Paint(paint) => self.paint(operation, paint),
            Operator::Clip(rule) => ctx.pending_clip = Some(rule),

            Operator::BeginText => {
                ctx.text = TextObject::default();
                ctx.emit(operation.clone());
            }
            Operator::EndText => ctx.emit(operation.clone()),
            Operator::CharSpacing(value) => {
                ctx.state_mut().character_spacing = value;
                ctx.emit(operation.clone());
            }
            Operator::WordSpacing(value) => {
                ctx.state_mut().word_spacing = value;
                ctx.emit(operation.clone());
            }
            Operator::HorizontalScaling(value) => {
                ctx.state_mut().horizontal_scaling = value;
                ctx.emit(operation.clone());
            }
            Operator::Leading(value) => {
                ctx.state_mut().leading = value;
                ctx.emit(operation.clone());
            }
            Operator::Rise(value) => {
                ctx.state_mut().rise = value;
                ctx.emit(operation.clone());
            }
            Operator::RenderMode(_) => ctx.emit(operation.clone()),
            Operator::Font(name, size) => {
                let font = ctx.font(doc, &name)?;
                let state = ctx.state_mut();
                state.font = Some(font);
                state.font_size = size;
                ctx.emit(operation.clone());
            }

            Operator::MoveText(tx, ty) => {
                ctx.text.move_line(tx, ty);
                ctx.emit(operation.clone());
            }
            Operator::MoveTextSetLeading(tx, ty) => {
                ctx.state_mut().leading = -ty;
                ctx.text.move_line(tx, ty);
                ctx.emit(operation.clone());
            }
            Operator::TextMatrix(matrix) => {
                ctx.text.set(matrix);
                ctx.emit(operation.clone());
            }
            Operator::NextLine => {
                let leading = ctx.state().leading;
                ctx.text.move_line(0.0, -leading);
                ctx.emit(operation.clone());
            }

            Operator::ShowText(text, format) => {
                self.show_text(operation, vec![TextItem::Text(text, format)], Vec::new())?;
            }
            Operator::ShowTextArray(items) => self.show_text(operation, items, Vec::new())?,
            Operator::NextLineShowText(text, format) => {
                let leading = ctx.state().leading;
                ctx.text.move_line(0.0, -leading);
                let prefix = vec![Operation::new("T*", vec![])];
                self.show_text(operation, vec![TextItem::Text(text, format)], prefix)?;
            }
            Operator::NextLineSpacingShowText {
                word_spacing,
                char_spacing,
                text,
                format,
            } => {
                let state = ctx.state_mut();
                state.word_spacing = word_spacing;
                state.character_spacing = char_spacing;
                let leading = state.leading;
                ctx.text.move_line(0.0, -leading);
                let prefix = vec![
                    Operation::new("Tw", vec![operation.operands[0].clone()]),
                    Operation::new("Tc", vec![operation.operands[1].clone()]),
                    Operation::new("T*", vec![]),
                ];
                self.show_text(operation, vec![TextItem::Text(text, format)], prefix)?;
            }

            Operator::InvokeXObject(name) => self.invoke_xobject(operation, &name)?,
            Operator::InlineImage => {
                let ctm = ctx.state().ctm;
                if self.listener.filter().intersects_unit_square(&ctm) {
                    debug!("Inline image intersects a cleaned region; removing");
                    self.listener.context().mark_modified();
                } else {
                    self.listener.context().emit(operation.clone());
                }
            }

            Operator::Other => ctx.emit(Operation::new(
                &operation.operator,
                operation.operands.iter().map(canonical).collect(),
            )),
        }
        Ok(())
    }

    /// Record a construction operator; nothing is emitted until the path is painted
    fn construct(&mut self, operation: &Operation, build: impl FnOnce(&mut PathBuilder)) {
        let ctx = self.listener.context();
        build(&mut ctx.path);
        ctx.construction.push(operation.clone());
    }

    /// Construction operators never followed by a painting operator are written back as is
    fn flush_unpainted_path(&mut self) {
        let ctx = self.listener.context();
        if ctx.construction.is_empty() && ctx.pending_clip.is_none() {
            return;
        }
        ctx.path.take();
        let construction = std::mem::take(&mut ctx.construction);
        ctx.emit_all(construction);
        if let Some(rule) = ctx.pending_clip.take() {
            ctx.emit(clip_operation(rule));
        }
    }

    fn paint(&mut self, operation: &Operation, paint: PaintOperator) {
        let (mut path, construction, clip, ctm) = {
            let ctx = self.listener.context();
            (
                ctx.path.take(),
                std::mem::take(&mut ctx.construction),
                ctx.pending_clip.take(),
                ctx.state().ctm,
            )
        };
        if paint.closes() {
            path.close_last();
        }

        let filter = self.listener.filter();
        let fill = paint
            .fill_rule()
            .map(|rule| (rule, filter.filter_path(&path, &ctm, false)));
        let stroke = paint.strokes().then(|| filter.filter_path(&path, &ctm, true));
        let changed = fill.as_ref().is_some_and(|(_, filled)| *filled != path)
            || stroke.as_ref().is_some_and(|stroked| *stroked != path);

        let ctx = self.listener.context();
        if !changed {
            ctx.emit_all(construction);
            if let Some(rule) = clip {
                ctx.emit(clip_operation(rule));
            }
            ctx.emit(operation.clone());
            return;
        }

        ctx.mark_modified();
        if let Some((rule, filled)) = fill {
            if !filled.is_empty() {
                ctx.emit_all(filled.to_operations());
                let op = match rule {
                    FillRule::NonZero => "f",
                    FillRule::EvenOdd => "f*",
                };
                ctx.emit(Operation::new(op, vec![]));
            }
        }
        if let Some(stroked) = stroke {
            if !stroked.is_empty() {
                ctx.emit_all(stroked.to_operations());
                ctx.emit(Operation::new("S", vec![]));
            }
        }
        // Clipping geometry is invisible and stays exactly as written
        if let Some(rule) = clip {
            ctx.emit_all(construction);
            ctx.emit(clip_operation(rule));
            ctx.emit(Operation::new("n", vec![]));
        }
    }

    fn show_text(&mut self, operation: &Operation, items: Vec<TextItem>, prefix: Vec<Operation>) -> Result<()> {
        let doc_font = self.listener.context().state().font.clone();
        let font = doc_font.ok_or_else(|| Error::malformed(&operation.operator, "no font selected"))?;
        let state = self.listener.context().state().clone();

        let mut chunks: Vec<ContentChunk> = Vec::new();
        let mut runs: Vec<Option<usize>> = Vec::with_capacity(items.len());
        for item in &items {
            match item {
                TextItem::Text(bytes, _) => {
                    let before = chunks.len();
                    let run = TextRun {
                        bytes,
                        font: &font,
                        state: &state,
                        text_matrix: self.listener.context().text.matrix,
                    };
                    let index = self.listener.on_text_shown(&run, &mut chunks);
                    let advance = match chunks[before..].last() {
                        Some(ContentChunk::Text { end_x, .. }) => *end_x,
                        _ => 0.0,
                    };
                    self.listener.context().text.advance(advance);
                    runs.push(index);
                }
                TextItem::Adjustment(n) => {
                    let shift = -n / 1000.0 * state.font_size * state.scaling();
                    self.listener.context().text.advance(shift);
                    runs.push(None);
                }
            }
        }

        let ctx = self.listener.context();
        if all_visible(&chunks) {
            ctx.emit(operation.clone());
            return Ok(());
        }

        ctx.mark_modified();
        ctx.emit_all(prefix);
        let array = rewrite_text_array(&items, &runs, &chunks, &state);
        if !array.is_empty() {
            ctx.emit(Operation::new("TJ", vec![Object::Array(array)]));
        }
        Ok(())
    }

    fn invoke_xobject(&mut self, operation: &Operation, name: &[u8]) -> Result<()> {
        let doc = self.doc;
        let stream = self.listener.context().xobject(doc, name)?;
        match dict_name(doc, &stream.dict, b"Subtype") {
            Some(b"Image") => self.invoke_image(operation, name, &stream),
            Some(b"Form") => self.invoke_form(operation, name, &stream),
            _ => {
                self.listener.context().emit(operation.clone());
                Ok(())
            }
        }
    }

    fn invoke_image(&mut self, operation: &Operation, name: &[u8], image: &Stream) -> Result<()> {
        let ctm = self.listener.context().state().ctm;
        let chunk = self.listener.on_image_shown(self.doc, name, image, &ctm);
        let ctx = self.listener.context();
        match chunk {
            ContentChunk::Image { visible: false, .. } => ctx.drop_xobject(name),
            ContentChunk::Image {
                replacement: Some(replacement),
                ..
            } => {
                let id = self.pending.add(Object::Stream(replacement.stream));
                let new_name = ctx.substitute_xobject(name, id);
                debug!(
                    "Image /{} replaced by /{} ({:?})",
                    String::from_utf8_lossy(name),
                    String::from_utf8_lossy(&new_name),
                    id
                );
                ctx.emit(Operation::new("Do", vec![Object::Name(new_name)]));
            }
            _ => ctx.emit(operation.clone()),
        }
        Ok(())
    }

    /// Interpret a form in its own context; a changed form is written as a new copy
    fn invoke_form(&mut self, operation: &Operation, name: &[u8], form: &Stream) -> Result<()> {
        if self.listener.form_depth() >= self.max_form_depth {
            return Err(Error::RecursionLimit(self.max_form_depth));
        }
        let doc = self.doc;
        let matrix = dict_number_array(doc, &form.dict, b"Matrix")
            .and_then(|values| Matrix::from_slice(&values))
            .unwrap_or_default();

        let (state, resources) = {
            let ctx = self.listener.context();
            let parent = ctx.state().clone();
            let state = GraphicsState {
                ctm: matrix.multiply(&parent.ctm),
                ..parent
            };
            let resources = match resolve_dict(doc, &form.dict, b"Resources")? {
                Some(own) => own.clone(),
                None => ctx.resources().clone(),
            };
            (state, resources)
        };

        let content = stream_content(form)?;
        let operations = Content::decode(&content)?.operations;
        self.listener.begin_form(RenderContext::new(doc, resources, state)?);
        let result = self.run(&operations);
        let finished = self.listener.end_form()?;
        result?;

        let output = finished.finish();
        let ctx = self.listener.context();
        if !output.modified {
            ctx.emit(operation.clone());
            return Ok(());
        }

        let mut dict = form.dict.clone();
        dict.remove(b"Filter");
        dict.remove(b"DecodeParms");
        dict.remove(b"Length");
        dict.set("Resources", Object::Dictionary(output.resources));
        let bytes = encode_content(output.operations)?;
        let id = self.pending.add(Object::Stream(Stream::new(dict, bytes)));
        let new_name = ctx.substitute_xobject(name, id);
        debug!(
            "Form /{} rewritten as /{}",
            String::from_utf8_lossy(name),
            String::from_utf8_lossy(&new_name)
        );
        ctx.emit(Operation::new("Do", vec![Object::Name(new_name)]));
        Ok(())
    }
}

fn clip_operation(rule: FillRule) -> Operation {
    match rule {
        FillRule::NonZero => Operation::new("W", vec![]),
        FillRule::EvenOdd => Operation::new("W*", vec![]),
    }
}

/// A string being rebuilt from the visible glyphs of one original string
struct PartialString {
    bytes: Vec<u8>,
    format: StringFormat,
    run: usize,
}

/// `TJ` operand keeping only visible glyphs, each at its original position.
///
/// Dropped glyphs turn into displacements of `-(w0·Tfs + Tc + Tw)·1000/Tfs` which are
/// merged with the original adjustments and written before the next surviving glyph.
fn rewrite_text_array(
    items: &[TextItem],
    runs: &[Option<usize>],
    chunks: &[ContentChunk],
    state: &GraphicsState,
) -> Vec<Object> {
    let scale = state.font_size * state.scaling();
    let representable = scale.abs() > f64::EPSILON;
    let mut out = Vec::new();
    let mut pending: Option<f64> = None;
    let mut current: Option<PartialString> = None;
    let mut warned = false;

    for (item, run) in items.iter().zip(runs) {
        match item {
            TextItem::Adjustment(n) => *pending.get_or_insert(0.0) += n,
            TextItem::Text(_, format) => {
                let Some(run) = *run else { continue };
                for chunk in chunks.iter().filter(|chunk| chunk.in_run(run)) {
                    let ContentChunk::Text {
                        bytes,
                        start_x,
                        end_x,
                        visible,
                        ..
                    } = chunk
                    else {
                        continue;
                    };
                    if *visible {
                        let continues = pending.is_none()
                            && current.as_ref().is_some_and(|partial| partial.run == run);
                        if !continues {
                            out.extend(current.take().map(into_string));
                            out.extend(pending.take().map(real));
                        }
                        current
                            .get_or_insert_with(|| PartialString {
                                bytes: Vec::new(),
                                format: format.clone(),
                                run,
                            })
                            .bytes
                            .extend_from_slice(bytes);
                    } else if representable {
                        *pending.get_or_insert(0.0) -= (end_x - start_x) * 1000.0 / scale;
                    } else if !warned && end_x != start_x {
                        warn!("Font size is zero; removed glyph spacing cannot be preserved");
                        warned = true;
                    }
                }
            }
        }
    }
    out.extend(current.take().map(into_string));
    out.extend(pending.map(real));
    out
}

fn into_string(partial: PartialString) -> Object {
    Object::String(partial.bytes, partial.format)
}
