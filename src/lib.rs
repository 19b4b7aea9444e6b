//! PDF Clean-up Library
//!
//! Removes the content under rectangular regions of PDF pages by rewriting the
//! pages' content streams. This library provides functionality to:
//! - Drop glyphs under a region while keeping the remaining text in place
//! - Remove path segments and fills under a region
//! - Remove covered images, or repaint the covered pixels of partially covered ones
//! - Rewrite Form XObjects as cleaned copies
//! - Apply `/Redact` annotations, including fill colours and overlay text
//!
//! # Example
//!
//! ```no_run
//! use pdf_cleanup::geometry::Rectangle;
//! use pdf_cleanup::pdf::{clean_up_file, CleanupLocation, CleanupOptions, Color};
//! use std::path::Path;
//!
//! let locations = vec![
//!     CleanupLocation::new(1, Rectangle::new(72.0, 700.0, 300.0, 720.0)).with_fill(Color::BLACK),
//! ];
//!
//! clean_up_file(
//!     Path::new("contract.pdf"),
//!     Path::new("contract-redacted.pdf"),
//!     &locations,
//!     &CleanupOptions::default(),
//! )
//! .expect("Failed to clean up PDF");
//! ```

pub mod error;
pub mod geometry;
pub mod layout;
pub mod pdf;

// Re-export commonly used items
pub use error::{Error, Result};
