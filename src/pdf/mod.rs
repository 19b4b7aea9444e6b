//! PDF content clean-up

pub mod annotations;
pub mod chunk;
pub mod cleanup;
pub mod font;
pub mod graphics_state;
pub mod interceptor;
pub mod listener;
pub mod objects;
pub mod operator;
pub mod overlay;
pub mod path;
pub mod raster;
pub mod region_filter;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used items
pub use annotations::{redact_annotations, RedactAnnotation};
pub use cleanup::{
    clean_up_annotations_file, clean_up_file, CleanupLocation, CleanupOptions, CleanupProcessor, CleanupReport,
    Color, PageFailure, PageStage, PageSummary,
};
pub use interceptor::ContentOperatorInterceptor;
pub use region_filter::RegionFilter;
