//! Interpreter state: graphics state stack and per-scope render context

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::font::Font;
use super::objects::{inline_resource_categories, resolve, set_resource, unique_resource_name};
use super::operator::FillRule;
use super::path::PathBuilder;
use crate::error::{Error, Result};
use crate::geometry::Matrix;

/// The part of the PDF graphics state that affects glyph placement
#[derive(Debug, Clone)]
pub struct GraphicsState {
    pub ctm: Matrix,
    pub font: Option<Rc<Font>>,
    pub font_size: f64,
    /// Percent, as set by `Tz`
    pub horizontal_scaling: f64,
    pub character_spacing: f64,
    pub word_spacing: f64,
    pub leading: f64,
    pub rise: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::identity(),
            font: None,
            font_size: 1.0,
            horizontal_scaling: 100.0,
            character_spacing: 0.0,
            word_spacing: 0.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

impl GraphicsState {
    /// Th as a factor
    pub fn scaling(&self) -> f64 {
        self.horizontal_scaling / 100.0
    }
}

/// Text matrix and text line matrix of the current `BT`/`ET` block
#[derive(Debug, Clone, Copy, Default)]
pub struct TextObject {
    pub matrix: Matrix,
    pub line_matrix: Matrix,
}

impl TextObject {
    /// `Td`: offset from the start of the current line
    pub fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translate(tx, ty).multiply(&self.line_matrix);
        self.matrix = self.line_matrix;
    }

    pub fn set(&mut self, matrix: Matrix) {
        self.matrix = matrix;
        self.line_matrix = matrix;
    }

    /// Move along the baseline after showing glyphs
    pub fn advance(&mut self, tx: f64) {
        self.matrix = Matrix::translate(tx, 0.0).multiply(&self.matrix);
    }
}

/// Finished output of one content scope
#[derive(Debug)]
pub struct RenderOutput {
    pub operations: Vec<Operation>,
    pub resources: Dictionary,
    pub modified: bool,
    /// `q` operators left open at the end of the stream
    pub open_saves: usize,
}

/// State of one content stream being rewritten: the page, or a form entered with `Do`
#[derive(Debug)]
pub struct RenderContext {
    states: Vec<GraphicsState>,
    resources: Dictionary,
    output: Vec<Operation>,
    pub text: TextObject,
    pub path: PathBuilder,
    /// Construction operators withheld until the path is painted
    pub construction: Vec<Operation>,
    pub pending_clip: Option<FillRule>,
    modified: bool,
    replaced: BTreeSet<Vec<u8>>,
    fonts: HashMap<Vec<u8>, Rc<Font>>,
}

impl RenderContext {
    pub fn new(doc: &Document, mut resources: Dictionary, state: GraphicsState) -> Result<Self> {
        inline_resource_categories(doc, &mut resources)?;
        Ok(Self {
            states: vec![state],
            resources,
            output: Vec::new(),
            text: TextObject::default(),
            path: PathBuilder::default(),
            construction: Vec::new(),
            pending_clip: None,
            modified: false,
            replaced: BTreeSet::new(),
            fonts: HashMap::new(),
        })
    }

    /// Current graphics state
    pub fn state(&self) -> &GraphicsState {
        // The stack always holds the scope's initial state
        &self.states[self.states.len() - 1]
    }

    pub fn state_mut(&mut self) -> &mut GraphicsState {
        let top = self.states.len() - 1;
        &mut self.states[top]
    }

    /// `q`
    pub fn save(&mut self) {
        let current = self.state().clone();
        self.states.push(current);
    }

    /// `Q`; the scope's initial state cannot be popped
    pub fn restore(&mut self) -> Result<()> {
        if self.states.len() <= 1 {
            return Err(Error::UnbalancedRestore);
        }
        self.states.pop();
        Ok(())
    }

    pub fn resources(&self) -> &Dictionary {
        &self.resources
    }

    pub fn emit(&mut self, operation: Operation) {
        self.output.push(operation);
    }

    pub fn emit_all(&mut self, operations: impl IntoIterator<Item = Operation>) {
        self.output.extend(operations);
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Font metrics for a `Tf` name, loaded once per scope
    pub fn font(&mut self, doc: &Document, name: &[u8]) -> Result<Rc<Font>> {
        if let Some(font) = self.fonts.get(name) {
            return Ok(Rc::clone(font));
        }
        let fonts = match self.resources.get(b"Font") {
            Ok(Object::Dictionary(fonts)) => fonts,
            _ => return Err(Error::unresolvable("font", name)),
        };
        let entry = fonts.get(name).map_err(|_| Error::unresolvable("font", name))?;
        let font = match resolve(doc, entry)? {
            Object::Dictionary(dict) => Font::from_dictionary(doc, dict)?,
            _ => return Err(Error::unresolvable("font", name)),
        };
        let font = Rc::new(font);
        self.fonts.insert(name.to_vec(), Rc::clone(&font));
        Ok(font)
    }

    /// The XObject stream registered under `name`
    pub fn xobject(&self, doc: &Document, name: &[u8]) -> Result<Stream> {
        let xobjects = match self.resources.get(b"XObject") {
            Ok(Object::Dictionary(xobjects)) => xobjects,
            _ => return Err(Error::unresolvable("XObject", name)),
        };
        let entry = xobjects.get(name).map_err(|_| Error::unresolvable("XObject", name))?;
        match resolve(doc, entry) {
            Ok(Object::Stream(stream)) => Ok(stream.clone()),
            _ => Err(Error::unresolvable("XObject", name)),
        }
    }

    /// Register a substituted XObject under a fresh name and remember that `original`
    /// may no longer be needed
    pub fn substitute_xobject(&mut self, original: &[u8], id: ObjectId) -> Vec<u8> {
        let name = unique_resource_name(&self.resources, b"XObject", original);
        set_resource(&mut self.resources, b"XObject", &name, Object::Reference(id));
        self.replaced.insert(original.to_vec());
        self.modified = true;
        name
    }

    /// `original` was suppressed without a substitute
    pub fn drop_xobject(&mut self, original: &[u8]) {
        self.replaced.insert(original.to_vec());
        self.modified = true;
    }

    /// Close the scope: prune replaced XObject names the output no longer invokes
    pub fn finish(mut self) -> RenderOutput {
        // Withheld path construction without a painting operator is kept as written
        let construction = std::mem::take(&mut self.construction);
        self.output.extend(construction);

        let used: BTreeSet<Vec<u8>> = self
            .output
            .iter()
            .filter(|op| op.operator == "Do")
            .filter_map(|op| match op.operands.first() {
                Some(Object::Name(name)) => Some(name.clone()),
                _ => None,
            })
            .collect();
        let unused: Vec<&Vec<u8>> = self.replaced.iter().filter(|name| !used.contains(*name)).collect();
        if !unused.is_empty() {
            if let Ok(Object::Dictionary(xobjects)) = self.resources.get_mut(b"XObject") {
                for name in unused {
                    xobjects.remove(name);
                }
            }
        }

        RenderOutput {
            operations: self.output,
            resources: self.resources,
            modified: self.modified,
            open_saves: self.states.len() - 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RenderContext {
        let doc = Document::with_version("1.5");
        RenderContext::new(&doc, Dictionary::new(), GraphicsState::default()).unwrap()
    }

    #[test]
    fn test_restore_at_depth_one_fails() {
        let mut ctx = context();
        ctx.save();
        ctx.state_mut().font_size = 12.0;
        assert!(ctx.restore().is_ok());
        assert_eq!(ctx.state().font_size, 1.0);
        assert!(matches!(ctx.restore(), Err(Error::UnbalancedRestore)));
    }

    #[test]
    fn test_text_object_moves() {
        let mut text = TextObject::default();
        text.set(Matrix::translate(100.0, 700.0));
        text.advance(10.0);
        text.move_line(0.0, -14.0);
        assert_eq!(text.matrix, Matrix::translate(100.0, 686.0));
    }

    #[test]
    fn test_missing_font_is_unresolvable() {
        let doc = Document::with_version("1.5");
        let mut ctx = context();
        let err = ctx.font(&doc, b"F9").unwrap_err();
        assert!(matches!(err, Error::UnresolvableResource { category: "font", .. }));
    }

    #[test]
    fn test_finish_prunes_unused_replaced_names() {
        let doc = Document::with_version("1.5");
        let mut resources = Dictionary::new();
        set_resource(&mut resources, b"XObject", b"Im1", Object::Reference((1, 0)));
        set_resource(&mut resources, b"XObject", b"Im2", Object::Reference((2, 0)));
        let mut ctx = RenderContext::new(&doc, resources, GraphicsState::default()).unwrap();
        let name = ctx.substitute_xobject(b"Im1", (9, 0));
        ctx.emit(Operation::new("Do", vec![Object::Name(name.clone())]));
        ctx.save();

        let output = ctx.finish();
        assert!(output.modified);
        assert_eq!(output.open_saves, 1);
        let Ok(Object::Dictionary(xobjects)) = output.resources.get(b"XObject") else {
            panic!("expected XObject dictionary")
        };
        assert!(!xobjects.has(b"Im1"));
        assert!(xobjects.has(b"Im2"));
        assert!(xobjects.has(&name));
    }
}
