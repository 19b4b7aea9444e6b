//! Page clean-up: regions in, rewritten pages out
//!
//! A [`CleanupProcessor`] takes caller-supplied [`CleanupLocation`]s (or the page's
//! redaction annotations), rewrites each affected page's content, and then paints
//! fill colours and overlays. Content rewriting is atomic per page: a page whose
//! content cannot be interpreted is left as it was and reported in
//! [`CleanupReport::failed`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use lopdf::{Document, Object, ObjectId};
use tracing::{debug, info, warn};

use super::annotations::{redact_annotations, remove_annotations, RedactAnnotation};
use super::interceptor::ContentOperatorInterceptor;
use super::objects::{
    append_content_to_page, encode_content, page_content, prepend_content_to_page, set_page_content,
};
use super::overlay::{draw_overlay, fill_content};
use super::region_filter::RegionFilter;
use crate::error::{Error, Result};
use crate::geometry::Rectangle;

/// RGB colour with components in `0..=1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0 };

    /// Parse `#rrggbb` (the leading `#` is optional)
    pub fn from_hex(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || Error::InvalidLocation(format!("invalid colour '{}'", s));
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| invalid())
        };
        Ok(Color {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    /// Colour from a PDF colour array: gray, RGB or CMYK. An empty array means
    /// transparent and yields `None`.
    pub fn from_components(values: &[f64]) -> Option<Self> {
        let c = |v: f64| v.clamp(0.0, 1.0) as f32;
        match values {
            [gray] => Some(Color { r: c(*gray), g: c(*gray), b: c(*gray) }),
            [r, g, b] => Some(Color { r: c(*r), g: c(*g), b: c(*b) }),
            [cyan, magenta, yellow, black] => {
                let k = 1.0 - c(*black);
                Some(Color {
                    r: (1.0 - c(*cyan)) * k,
                    g: (1.0 - c(*magenta)) * k,
                    b: (1.0 - c(*yellow)) * k,
                })
            }
            _ => None,
        }
    }

    /// 8-bit samples
    pub fn to_rgb8(self) -> [u8; 3] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b)]
    }
}

/// Options for a clean-up run
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    /// Colour painted over the covered pixels of partially cleaned images
    pub cleaned_area_color: Color,
    /// Paint each location's fill colour under the page content
    pub fill_regions: bool,
    /// Remove consumed redaction annotations and their popups
    pub remove_annotations: bool,
    /// Draw annotation overlays (`RO` or `OverlayText`)
    pub draw_overlays: bool,
    /// Form XObject nesting limit
    pub max_form_depth: usize,
    /// Quality for re-encoded DCT images
    pub jpeg_quality: u8,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            cleaned_area_color: Color::WHITE,
            fill_regions: true,
            remove_annotations: true,
            draw_overlays: true,
            max_form_depth: 32,
            jpeg_quality: 90,
        }
    }
}

/// A region of one page to clean
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupLocation {
    /// 1-based page number
    pub page: u32,
    /// Default user space of the page
    pub region: Rectangle,
    pub fill_color: Option<Color>,
}

impl CleanupLocation {
    pub fn new(page: u32, region: Rectangle) -> Self {
        Self {
            page,
            region,
            fill_color: None,
        }
    }

    pub fn with_fill(mut self, color: Color) -> Self {
        self.fill_color = Some(color);
        self
    }
}

impl FromStr for CleanupLocation {
    type Err = Error;

    /// `PAGE:LLX,LLY,URX,URY[:#RRGGBB]`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| Error::InvalidLocation(format!("{} in '{}'", why, s));
        let mut parts = s.trim().splitn(3, ':');
        let page: u32 = parts
            .next()
            .and_then(|p| p.trim().parse().ok())
            .filter(|p| *p >= 1)
            .ok_or_else(|| invalid("expected a page number >= 1"))?;

        let coords = parts
            .next()
            .ok_or_else(|| invalid("missing rectangle"))?
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|_| invalid("non-numeric coordinate"))?;
        let [llx, lly, urx, ury] = coords[..] else {
            return Err(invalid("expected four coordinates"));
        };

        let fill_color = parts.next().map(Color::from_hex).transpose()?;
        Ok(CleanupLocation {
            page,
            region: Rectangle::new(llx, lly, urx, ury),
            fill_color,
        })
    }
}

/// How far a page got before it finished or failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStage {
    Idle,
    FilterBuilt,
    Interpreting,
    Rewritten,
    AnnotationsUpdated,
    Done,
}

impl fmt::Display for PageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageStage::Idle => "idle",
            PageStage::FilterBuilt => "filter built",
            PageStage::Interpreting => "interpreting",
            PageStage::Rewritten => "rewritten",
            PageStage::AnnotationsUpdated => "annotations updated",
            PageStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// What was done to a page that was cleaned successfully
#[derive(Debug, Clone, PartialEq)]
pub struct PageSummary {
    pub page: u32,
    pub regions: usize,
    pub content_modified: bool,
    pub annotations_removed: usize,
    pub overlays_drawn: usize,
}

/// A page left unchanged because of an error
#[derive(Debug)]
pub struct PageFailure {
    pub page: u32,
    pub stage: PageStage,
    pub error: Error,
}

/// Outcome of a clean-up run
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub pages: Vec<PageSummary>,
    pub failed: Vec<PageFailure>,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_pages(&self) -> Vec<u32> {
        self.failed.iter().map(|f| f.page).collect()
    }
}

/// Cleans regions out of the pages of a document
pub struct CleanupProcessor<'d> {
    doc: &'d mut Document,
    options: CleanupOptions,
}

impl<'d> CleanupProcessor<'d> {
    pub fn new(doc: &'d mut Document) -> Self {
        Self::with_options(doc, CleanupOptions::default())
    }

    pub fn with_options(doc: &'d mut Document, options: CleanupOptions) -> Self {
        Self { doc, options }
    }

    pub fn options(&self) -> &CleanupOptions {
        &self.options
    }

    /// Clean the given locations. Every location must name an existing page; this is
    /// checked before anything is modified.
    pub fn clean_up(&mut self, locations: &[CleanupLocation]) -> Result<CleanupReport> {
        let pages = self.doc.get_pages();
        let mut by_page: BTreeMap<u32, Vec<CleanupLocation>> = BTreeMap::new();
        for location in locations {
            if !pages.contains_key(&location.page) {
                return Err(Error::PageNotFound(location.page));
            }
            by_page.entry(location.page).or_default().push(location.clone());
        }

        let mut report = CleanupReport::default();
        for (page, locations) in by_page {
            let page_id = pages[&page];
            self.record(&mut report, page, page_id, &locations, &[]);
        }
        Ok(report)
    }

    /// Clean every page under its `/Redact` annotations
    pub fn clean_up_redact_annotations(&mut self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        for (page, page_id) in self.doc.get_pages() {
            let annotations = match redact_annotations(self.doc, page_id) {
                Ok(annotations) => annotations,
                Err(error) => {
                    warn!("Page {}: cannot read annotations: {}", page, error);
                    report.failed.push(PageFailure {
                        page,
                        stage: PageStage::FilterBuilt,
                        error,
                    });
                    continue;
                }
            };
            if annotations.is_empty() {
                continue;
            }
            let locations: Vec<CleanupLocation> =
                annotations.iter().flat_map(|a| a.locations(page)).collect();
            self.record(&mut report, page, page_id, &locations, &annotations);
        }
        Ok(report)
    }

    fn record(
        &mut self,
        report: &mut CleanupReport,
        page: u32,
        page_id: ObjectId,
        locations: &[CleanupLocation],
        annotations: &[RedactAnnotation],
    ) {
        match self.clean_page(page, page_id, locations, annotations) {
            Ok(summary) => {
                info!(
                    "Page {}: {} region(s), content {}, {} annotation(s) removed",
                    page,
                    summary.regions,
                    if summary.content_modified { "rewritten" } else { "unchanged" },
                    summary.annotations_removed
                );
                report.pages.push(summary);
            }
            Err(failure) => {
                warn!("Page {} failed while {}: {}", page, failure.stage, failure.error);
                report.failed.push(failure);
            }
        }
    }

    fn clean_page(
        &mut self,
        page: u32,
        page_id: ObjectId,
        locations: &[CleanupLocation],
        annotations: &[RedactAnnotation],
    ) -> std::result::Result<PageSummary, PageFailure> {
        let fail = |stage: PageStage| move |error: Error| PageFailure { page, stage, error };

        let filter = RegionFilter::new(locations.iter().map(|l| l.region).collect());
        debug!("Page {}: filter built from {} region(s)", page, locations.len());

        let rewrite = ContentOperatorInterceptor::clean_page(self.doc, page_id, filter, &self.options)
            .map_err(fail(PageStage::Interpreting))?;
        let output = rewrite.output;
        if output.modified {
            let content = encode_content(output.operations).map_err(fail(PageStage::Interpreting))?;
            rewrite.pending.commit(self.doc);
            set_page_content(self.doc, page_id, content).map_err(fail(PageStage::Rewritten))?;
            self.doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map(|dict| dict.set("Resources", Object::Dictionary(output.resources)))
                .map_err(|e| fail(PageStage::Rewritten)(e.into()))?;
            debug!("Page {}: content rewritten", page);
        }

        let mut summary = PageSummary {
            page,
            regions: locations.len(),
            content_modified: output.modified,
            annotations_removed: 0,
            overlays_drawn: 0,
        };

        if !annotations.is_empty() {
            if self.options.draw_overlays {
                summary.overlays_drawn = self
                    .draw_overlays(page_id, annotations, output.open_saves)
                    .map_err(fail(PageStage::AnnotationsUpdated))?;
            }
            if self.options.remove_annotations {
                summary.annotations_removed = remove_annotations(self.doc, page_id, annotations)
                    .map_err(fail(PageStage::AnnotationsUpdated))?;
            }
            debug!("Page {}: annotations updated", page);
        }

        if self.options.fill_regions {
            let fills = fill_content(locations).map_err(fail(PageStage::Done))?;
            if !fills.is_empty() {
                prepend_content_to_page(self.doc, page_id, fills).map_err(fail(PageStage::Done))?;
            }
        }

        Ok(summary)
    }

    /// Wrap the page content in `q`…`Q` and append the overlays on top
    fn draw_overlays(&mut self, page_id: ObjectId, annotations: &[RedactAnnotation], open_saves: usize) -> Result<usize> {
        let mut layers = Vec::new();
        for annotation in annotations {
            if let Some(layer) = draw_overlay(self.doc, page_id, annotation)? {
                layers.push(layer);
            }
        }
        if layers.is_empty() {
            return Ok(0);
        }

        let mut wrapped = b"q\n".to_vec();
        wrapped.extend(page_content(self.doc, page_id)?);
        // Close any q the content left open, then the wrapper itself
        for _ in 0..=open_saves {
            wrapped.extend_from_slice(b"Q\n");
        }
        set_page_content(self.doc, page_id, wrapped)?;

        let count = layers.len();
        for layer in layers {
            append_content_to_page(self.doc, page_id, layer)?;
        }
        Ok(count)
    }
}

/// Clean `locations` out of `input` and save the result to `output`.
///
/// Nothing is written unless every page succeeds.
pub fn clean_up_file(
    input: &Path,
    output: &Path,
    locations: &[CleanupLocation],
    options: &CleanupOptions,
) -> Result<CleanupReport> {
    let mut doc = load(input)?;
    let report = CleanupProcessor::with_options(&mut doc, options.clone()).clean_up(locations)?;
    save(doc, &report, output)?;
    Ok(report)
}

/// Apply the redaction annotations of `input` and save the result to `output`
pub fn clean_up_annotations_file(input: &Path, output: &Path, options: &CleanupOptions) -> Result<CleanupReport> {
    let mut doc = load(input)?;
    let report = CleanupProcessor::with_options(&mut doc, options.clone()).clean_up_redact_annotations()?;
    save(doc, &report, output)?;
    Ok(report)
}

fn load(input: &Path) -> Result<Document> {
    if !input.exists() {
        return Err(Error::FileNotFound(input.to_path_buf()));
    }
    Ok(Document::load(input)?)
}

fn save(mut doc: Document, report: &CleanupReport, output: &Path) -> Result<()> {
    if !report.is_complete() {
        return Err(Error::Incomplete {
            failed: report.failed_pages(),
        });
    }
    // Drop the replaced streams so the removed content is not left in the file
    doc.prune_objects();
    doc.compress();
    doc.save(output)?;
    Ok(())
}
