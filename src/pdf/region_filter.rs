//! Geometry tests of glyphs, images and paths against the regions being cleaned

use super::path::{Path, Subpath};
use crate::geometry::{Matrix, Point, Rectangle};

/// A single glyph positioned on the page
#[derive(Debug, Clone, Copy)]
pub struct GlyphGeometry {
    /// Text rendering matrix at the glyph origin: `[Tfs·Th 0 0 Tfs 0 Trise] × Tm × CTM`
    pub rendering_matrix: Matrix,
    /// Horizontal displacement w0, unscaled text space
    pub width: f64,
    pub ascent: f64,
    pub descent: f64,
}

/// How much of an image the regions cover, in device space
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCoverage {
    /// Bounding rectangle of all covered areas, `None` when nothing is covered
    pub rect: Option<Rectangle>,
    /// Each region's intersection with the image's bounding rectangle
    pub areas: Vec<Rectangle>,
    pub fully_covered: bool,
}

/// Regions to erase, in default user space
#[derive(Debug, Clone, Default)]
pub struct RegionFilter {
    regions: Vec<Rectangle>,
}

impl RegionFilter {
    pub fn new(regions: Vec<Rectangle>) -> Self {
        Self { regions }
    }

    pub fn regions(&self) -> &[Rectangle] {
        &self.regions
    }

    /// True when the glyph box touches no region; partially covered glyphs are not allowed
    pub fn allows_text(&self, glyph: &GlyphGeometry) -> bool {
        if !glyph.rendering_matrix.is_invertible() {
            return true;
        }
        let glyph_box = Rectangle::new(0.0, glyph.descent, glyph.width, glyph.ascent);
        let quad = glyph.rendering_matrix.transform_rect(&glyph_box);
        !self.regions.iter().any(|region| region.intersects_quad(&quad))
    }

    /// Coverage of the unit image square placed by `ctm`; `None` when `ctm` is singular
    pub fn image_coverage(&self, ctm: &Matrix) -> Option<ImageCoverage> {
        if !ctm.is_invertible() {
            return None;
        }
        let quad = ctm.transform_rect(&Rectangle::new(0.0, 0.0, 1.0, 1.0));
        let bounds = Rectangle::bounding(&quad)?;
        let areas: Vec<Rectangle> = self
            .regions
            .iter()
            .filter_map(|region| region.intersection(&bounds))
            .collect();
        let rect = areas.iter().copied().reduce(|acc, r| acc.union(&r));
        let fully_covered = self.regions.iter().any(|region| region.contains_all(&quad));
        Some(ImageCoverage {
            rect,
            areas,
            fully_covered,
        })
    }

    /// True when the device quadrilateral of a unit-square object touches any region
    pub fn intersects_unit_square(&self, ctm: &Matrix) -> bool {
        if !ctm.is_invertible() {
            return false;
        }
        let quad = ctm.transform_rect(&Rectangle::new(0.0, 0.0, 1.0, 1.0));
        self.regions.iter().any(|region| region.intersects_quad(&quad))
    }

    /// Subpaths that remain visible after removing covered geometry.
    ///
    /// Strokes lose every segment whose control points all sit inside one region and
    /// the remaining runs become open subpaths. Fills are removed only when a single
    /// region contains the whole subpath; there is no polygon clipping.
    pub fn filter_subpath(&self, subpath: &Subpath, ctm: &Matrix, is_stroke: bool) -> Vec<Subpath> {
        if !ctm.is_invertible() {
            return vec![subpath.clone()];
        }
        if subpath.is_degenerate() || !is_stroke {
            let points: Vec<Point> = subpath.points().into_iter().map(|p| ctm.transform(p)).collect();
            return if self.covered(&points) {
                vec![]
            } else {
                vec![subpath.clone()]
            };
        }

        let pairs = subpath.segments_with_start();
        let covered: Vec<bool> = pairs
            .iter()
            .map(|(from, segment)| {
                let points: Vec<Point> = segment
                    .control_points(*from)
                    .into_iter()
                    .map(|p| ctm.transform(p))
                    .collect();
                self.covered(&points)
            })
            .collect();
        if !covered.contains(&true) {
            return vec![subpath.clone()];
        }

        let mut runs: Vec<Subpath> = Vec::new();
        let mut current: Option<Subpath> = None;
        for ((from, segment), dropped) in pairs.iter().zip(&covered) {
            if *dropped {
                runs.extend(current.take());
                continue;
            }
            current
                .get_or_insert_with(|| Subpath::new(*from))
                .segments
                .push(*segment);
        }
        runs.extend(current);

        // The run ending at the start point continues into the first run
        let wraps = subpath.closed && !covered[0] && covered.last() == Some(&false);
        if wraps && runs.len() > 1 {
            let first = runs.remove(0);
            if let Some(last) = runs.last_mut() {
                last.segments.extend(first.segments);
            }
        }
        runs
    }

    /// Apply [`RegionFilter::filter_subpath`] to every subpath
    pub fn filter_path(&self, path: &Path, ctm: &Matrix, is_stroke: bool) -> Path {
        Path::new(
            path.subpaths
                .iter()
                .flat_map(|subpath| self.filter_subpath(subpath, ctm, is_stroke))
                .collect(),
        )
    }

    fn covered(&self, points: &[Point]) -> bool {
        self.regions.iter().any(|region| region.contains_all(points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::path::PathBuilder;

    fn rect_path(x: f64, y: f64, w: f64, h: f64) -> Path {
        let mut builder = PathBuilder::default();
        builder.rectangle(x, y, w, h);
        builder.take()
    }

    #[test]
    fn test_glyph_partially_inside_is_not_allowed() {
        let filter = RegionFilter::new(vec![Rectangle::new(110.0, 690.0, 116.0, 720.0)]);
        // 12pt glyph at x=100 spanning 8 units
        let glyph = GlyphGeometry {
            rendering_matrix: Matrix::new(12.0, 0.0, 0.0, 12.0, 100.0, 700.0),
            width: 0.667,
            ascent: 0.718,
            descent: -0.207,
        };
        assert!(filter.allows_text(&glyph));
        let shifted = GlyphGeometry {
            rendering_matrix: Matrix::new(12.0, 0.0, 0.0, 12.0, 105.0, 700.0),
            ..glyph
        };
        assert!(!filter.allows_text(&shifted));
    }

    #[test]
    fn test_degenerate_text_matrix_is_allowed() {
        let filter = RegionFilter::new(vec![Rectangle::new(0.0, 0.0, 1000.0, 1000.0)]);
        let glyph = GlyphGeometry {
            rendering_matrix: Matrix::new(0.0, 0.0, 0.0, 0.0, 10.0, 10.0),
            width: 0.5,
            ascent: 0.7,
            descent: -0.2,
        };
        assert!(filter.allows_text(&glyph));
    }

    #[test]
    fn test_image_coverage() {
        let filter = RegionFilter::new(vec![Rectangle::new(0.0, 0.0, 100.0, 100.0)]);
        let partial = filter
            .image_coverage(&Matrix::new(100.0, 0.0, 0.0, 100.0, 50.0, 0.0))
            .unwrap();
        assert_eq!(partial.rect, Some(Rectangle::new(50.0, 0.0, 100.0, 100.0)));
        assert!(!partial.fully_covered);

        let full = filter
            .image_coverage(&Matrix::new(20.0, 0.0, 0.0, 20.0, 10.0, 10.0))
            .unwrap();
        assert!(full.fully_covered);

        let clear = filter
            .image_coverage(&Matrix::new(20.0, 0.0, 0.0, 20.0, 200.0, 10.0))
            .unwrap();
        assert_eq!(clear.rect, None);
        assert!(clear.areas.is_empty());

        assert!(filter.image_coverage(&Matrix::new(0.0, 0.0, 0.0, 0.0, 1.0, 1.0)).is_none());
    }

    #[test]
    fn test_fully_covered_fill_is_dropped() {
        let filter = RegionFilter::new(vec![Rectangle::new(-10.0, -10.0, 110.0, 110.0)]);
        let path = rect_path(0.0, 0.0, 100.0, 100.0);
        assert!(filter.filter_path(&path, &Matrix::identity(), false).is_empty());
    }

    #[test]
    fn test_partially_covered_fill_is_kept_whole() {
        let filter = RegionFilter::new(vec![Rectangle::new(-10.0, 90.0, 110.0, 110.0)]);
        let path = rect_path(0.0, 0.0, 100.0, 100.0);
        assert_eq!(filter.filter_path(&path, &Matrix::identity(), false), path);
    }

    #[test]
    fn test_stroke_keeps_uncovered_edges() {
        // Top edge of the square lies in the region
        let filter = RegionFilter::new(vec![Rectangle::new(-10.0, 90.0, 110.0, 110.0)]);
        let path = rect_path(0.0, 0.0, 100.0, 100.0);
        let filtered = filter.filter_path(&path, &Matrix::identity(), true);
        // Left, bottom and right edges survive as one open run through the start point
        assert_eq!(filtered.subpaths.len(), 1);
        let run = &filtered.subpaths[0];
        assert_eq!(run.start, Point::new(0.0, 100.0));
        assert!(!run.closed);
        let ends: Vec<Point> = run.segments.iter().map(|s| s.end()).collect();
        assert_eq!(
            ends,
            vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0), Point::new(100.0, 100.0)]
        );
    }

    #[test]
    fn test_stroke_gap_splits_open_subpath() {
        let filter = RegionFilter::new(vec![Rectangle::new(40.0, -5.0, 60.0, 5.0)]);
        let mut builder = PathBuilder::default();
        builder.move_to(Point::new(0.0, 0.0));
        builder.line_to(Point::new(45.0, 0.0));
        builder.line_to(Point::new(55.0, 0.0));
        builder.line_to(Point::new(100.0, 0.0));
        let filtered = filter.filter_path(&builder.take(), &Matrix::identity(), true);
        assert_eq!(filtered.subpaths.len(), 2);
        assert_eq!(filtered.subpaths[1].start, Point::new(55.0, 0.0));
    }

    #[test]
    fn test_stroke_edges_in_device_space() {
        let filter = RegionFilter::new(vec![Rectangle::new(190.0, 0.0, 400.0, 400.0)]);
        let mut builder = PathBuilder::default();
        builder.move_to(Point::new(0.0, 0.0));
        builder.line_to(Point::new(50.0, 0.0));
        builder.line_to(Point::new(100.0, 0.0));
        let path = builder.take();
        // Doubling moves the second segment (100..200) partly into the region: kept
        let filtered = filter.filter_path(&path, &Matrix::scale(2.0, 2.0), true);
        assert_eq!(filtered, path);
        let filtered = filter.filter_path(&path, &Matrix::scale(4.0, 4.0), true);
        assert_eq!(filtered.subpaths.len(), 1);
        assert_eq!(filtered.subpaths[0].segments.len(), 1);
    }

    #[test]
    fn test_degenerate_point_subpath() {
        let filter = RegionFilter::new(vec![Rectangle::new(0.0, 0.0, 10.0, 10.0)]);
        let inside = Path::new(vec![Subpath::new(Point::new(5.0, 5.0))]);
        assert!(filter.filter_path(&inside, &Matrix::identity(), true).is_empty());
        let outside = Path::new(vec![Subpath::new(Point::new(50.0, 5.0))]);
        assert_eq!(filter.filter_path(&outside, &Matrix::identity(), true), outside);
    }
}
