//! Error types for the PDF clean-up library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the PDF clean-up library
#[derive(Error, Debug)]
pub enum Error {
    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image codec error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// A known operator was invoked with the wrong number or type of operands
    #[error("Malformed operator `{operator}`: {reason}")]
    MalformedOperator { operator: String, reason: String },

    /// A font or XObject referenced by the content is missing from the resources
    #[error("Unresolvable {category} resource /{name}")]
    UnresolvableResource { category: &'static str, name: String },

    /// `Q` without a matching `q`
    #[error("Unbalanced graphics state restore (Q without q)")]
    UnbalancedRestore,

    /// Form XObjects nested deeper than the configured limit
    #[error("Form XObject nesting exceeds {0} levels")]
    RecursionLimit(usize),

    /// Non-invertible transformation where an inverse is required
    #[error("Degenerate transformation matrix")]
    DegenerateTransform,

    /// Image samples cannot be decoded for pixel-level cleaning
    #[error("Unsupported image codec: {0}")]
    UnsupportedImageCodec(String),

    /// Redaction annotation without Rect or usable QuadPoints
    #[error("Redaction annotation has no usable geometry")]
    AnnotationGeometryMissing,

    /// Page number not present in the document
    #[error("Page {0} not found")]
    PageNotFound(u32),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Malformed clean-up location specification
    #[error("Invalid clean-up location: {0}")]
    InvalidLocation(String),

    /// Invalid glob pattern
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// No files matched pattern
    #[error("No PDF files found matching pattern: {0}")]
    NoFilesMatched(String),

    /// Some pages could not be cleaned; output was not written
    #[error("Clean-up failed on page(s) {failed:?}; output not written")]
    Incomplete { failed: Vec<u32> },

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    pub(crate) fn malformed(operator: &str, reason: impl Into<String>) -> Self {
        Error::MalformedOperator {
            operator: operator.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unresolvable(category: &'static str, name: &[u8]) -> Self {
        Error::UnresolvableResource {
            category,
            name: String::from_utf8_lossy(name).into_owned(),
        }
    }

    /// Whether this error aborts the page being processed.
    ///
    /// Degradations (codec, degenerate transform, annotation geometry) leave content
    /// untouched instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::DegenerateTransform
                | Error::UnsupportedImageCodec(_)
                | Error::AnnotationGeometryMissing
        )
    }
}
