//! Per-operator records of what the listener saw

use super::raster::ImageReplacement;

/// One observed primitive. Chunks live in a vector owned by a single operator
/// invocation and are dropped with it.
#[derive(Debug, Clone)]
pub enum ContentChunk {
    /// A single glyph of a shown string
    Text {
        bytes: Vec<u8>,
        /// Displacement along the baseline from the string's origin, text space
        start_x: f64,
        end_x: f64,
        visible: bool,
        run_index: usize,
    },
    Image {
        visible: bool,
        replacement: Option<ImageReplacement>,
    },
}

impl ContentChunk {
    pub fn is_visible(&self) -> bool {
        match self {
            ContentChunk::Text { visible, .. } | ContentChunk::Image { visible, .. } => *visible,
        }
    }

    /// Text chunks belonging to the string with `run_index`
    pub fn in_run(&self, index: usize) -> bool {
        matches!(self, ContentChunk::Text { run_index, .. } if *run_index == index)
    }
}

/// True when nothing in `chunks` needs rewriting
pub fn all_visible(chunks: &[ContentChunk]) -> bool {
    chunks.iter().all(|chunk| match chunk {
        ContentChunk::Text { visible, .. } => *visible,
        ContentChunk::Image { visible, replacement } => *visible && replacement.is_none(),
    })
}
