//! Observes shown text and images, classifies them against the regions and owns the
//! stack of render contexts

use lopdf::{Document, Stream};
use tracing::{debug, warn};

use super::chunk::ContentChunk;
use super::cleanup::Color;
use super::font::Font;
use super::graphics_state::{GraphicsState, RenderContext};
use super::raster::{clean_image, unit_areas};
use super::region_filter::{GlyphGeometry, RegionFilter};
use crate::error::{Error, Result};
use crate::geometry::Matrix;

/// A string about to be shown with the current text state
#[derive(Debug, Clone, Copy)]
pub struct TextRun<'a> {
    pub bytes: &'a [u8],
    pub font: &'a Font,
    pub state: &'a GraphicsState,
    pub text_matrix: Matrix,
}

impl TextRun<'_> {
    /// Baseline displacement of one glyph, scaled text space
    pub fn glyph_advance(&self, code: &[u8]) -> f64 {
        let state = self.state;
        let mut advance = self.font.glyph_width(code) * state.font_size + state.character_spacing;
        if self.font.is_word_space(code) {
            advance += state.word_spacing;
        }
        advance * state.scaling()
    }

    fn geometry(&self, code: &[u8], offset: f64) -> GlyphGeometry {
        let state = self.state;
        let text_space = Matrix::new(
            state.font_size * state.scaling(),
            0.0,
            0.0,
            state.font_size,
            0.0,
            state.rise,
        );
        let origin = Matrix::translate(offset, 0.0).multiply(&self.text_matrix);
        GlyphGeometry {
            rendering_matrix: text_space.multiply(&origin).multiply(&state.ctm),
            width: self.font.glyph_width(code),
            ascent: self.font.ascent(),
            descent: self.font.descent(),
        }
    }
}

/// Region tests plus the context stack for nested forms
#[derive(Debug)]
pub struct RenderListener {
    filter: RegionFilter,
    contexts: Vec<RenderContext>,
    next_run: usize,
    cleaned_color: Color,
    jpeg_quality: u8,
}

impl RenderListener {
    pub fn new(filter: RegionFilter, page: RenderContext, cleaned_color: Color, jpeg_quality: u8) -> Self {
        Self {
            filter,
            contexts: vec![page],
            next_run: 0,
            cleaned_color,
            jpeg_quality,
        }
    }

    pub fn filter(&self) -> &RegionFilter {
        &self.filter
    }

    /// Number of nested form scopes currently open
    pub fn form_depth(&self) -> usize {
        self.contexts.len() - 1
    }

    /// The scope whose content is being interpreted
    pub fn context(&mut self) -> &mut RenderContext {
        let top = self.contexts.len() - 1;
        &mut self.contexts[top]
    }

    /// Classify each glyph of `run`; returns the run index, or `None` for empty strings
    pub fn on_text_shown(&mut self, run: &TextRun<'_>, chunks: &mut Vec<ContentChunk>) -> Option<usize> {
        if run.bytes.is_empty() {
            return None;
        }
        let run_index = self.next_run;
        self.next_run += 1;

        let mut x = 0.0;
        for code in run.font.codes(run.bytes) {
            let advance = run.glyph_advance(code);
            let visible = self.filter.allows_text(&run.geometry(code, x));
            chunks.push(ContentChunk::Text {
                bytes: code.to_vec(),
                start_x: x,
                end_x: x + advance,
                visible,
                run_index,
            });
            x += advance;
        }
        Some(run_index)
    }

    /// Classify an image XObject placed by `ctm`
    pub fn on_image_shown(&mut self, doc: &Document, name: &[u8], image: &Stream, ctm: &Matrix) -> ContentChunk {
        let name = String::from_utf8_lossy(name);
        let Some(coverage) = self.filter.image_coverage(ctm) else {
            warn!("Image /{} has a degenerate transformation; left untouched", name);
            return ContentChunk::Image { visible: true, replacement: None };
        };
        if coverage.fully_covered {
            debug!("Image /{} is fully covered; removing", name);
            return ContentChunk::Image { visible: false, replacement: None };
        }
        if coverage.rect.is_none() {
            return ContentChunk::Image { visible: true, replacement: None };
        }

        let cleaned = unit_areas(ctm, &coverage.areas)
            .and_then(|areas| clean_image(doc, image, &areas, self.cleaned_color, self.jpeg_quality));
        match cleaned {
            Ok(replacement) => {
                debug!("Image /{} partially covered; samples repainted", name);
                ContentChunk::Image {
                    visible: true,
                    replacement: Some(replacement),
                }
            }
            Err(err @ (Error::UnsupportedImageCodec(_) | Error::DegenerateTransform)) => {
                warn!("Image /{} cannot be cleaned ({}); left untouched", name, err);
                ContentChunk::Image { visible: true, replacement: None }
            }
            Err(err) => {
                warn!("Image /{} failed to decode ({}); left untouched", name, err);
                ContentChunk::Image { visible: true, replacement: None }
            }
        }
    }

    /// Enter a form: its content is interpreted in a fresh context
    pub fn begin_form(&mut self, context: RenderContext) {
        self.contexts.push(context);
    }

    /// Leave the innermost form, handing back its finished context
    pub fn end_form(&mut self) -> Result<RenderContext> {
        if self.contexts.len() <= 1 {
            return Err(Error::General("No form context to close".to_string()));
        }
        self.contexts
            .pop()
            .ok_or_else(|| Error::General("No form context to close".to_string()))
    }

    /// Consume the listener, returning the page context
    pub fn into_page_context(mut self) -> Result<RenderContext> {
        if self.contexts.len() != 1 {
            return Err(Error::General("Form context left open".to_string()));
        }
        self.contexts
            .pop()
            .ok_or_else(|| Error::General("Missing page context".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rectangle;
    use lopdf::Dictionary;

    fn listener(regions: Vec<Rectangle>) -> RenderListener {
        let doc = Document::with_version("1.5");
        let page = RenderContext::new(&doc, Dictionary::new(), GraphicsState::default()).unwrap();
        RenderListener::new(RegionFilter::new(regions), page, Color::WHITE, 90)
    }

    #[test]
    fn test_glyphs_split_and_classified() {
        let mut listener = listener(vec![Rectangle::new(110.0, 690.0, 116.0, 720.0)]);
        let font = Font::standard(b"Helvetica");
        let state = GraphicsState {
            font_size: 12.0,
            ..GraphicsState::default()
        };
        let run = TextRun {
            bytes: b"ABC",
            font: &font,
            state: &state,
            text_matrix: Matrix::translate(100.0, 700.0),
        };
        let mut chunks = Vec::new();
        assert_eq!(listener.on_text_shown(&run, &mut chunks), Some(0));
        let visibility: Vec<bool> = chunks.iter().map(|c| c.is_visible()).collect();
        // A spans 100..108.004, B 108.004..116.008, C from 116.008
        assert_eq!(visibility, vec![true, false, true]);
        if let ContentChunk::Text { start_x, end_x, .. } = &chunks[1] {
            assert!((start_x - 8.004).abs() < 1e-9);
            assert!((end_x - 16.008).abs() < 1e-9);
        }

        let empty = TextRun { bytes: b"", ..run };
        assert_eq!(listener.on_text_shown(&empty, &mut chunks), None);
        assert_eq!(listener.on_text_shown(&run, &mut chunks), Some(1));
    }

    #[test]
    fn test_form_contexts_are_lifo() {
        let doc = Document::with_version("1.5");
        let mut listener = listener(vec![]);
        assert!(listener.end_form().is_err());
        let form = RenderContext::new(&doc, Dictionary::new(), GraphicsState::default()).unwrap();
        listener.begin_form(form);
        assert_eq!(listener.form_depth(), 1);
        assert!(listener.end_form().is_ok());
        assert!(listener.into_page_context().is_ok());
    }
}
