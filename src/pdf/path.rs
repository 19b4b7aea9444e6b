//! Path model for the construction operators (`m`, `l`, `c`, `v`, `y`, `h`, `re`)

use lopdf::content::Operation;

use super::objects::real;
use crate::geometry::Point;

/// One drawn piece of a subpath; the start point is the previous segment's end
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    Line { to: Point },
    Curve { c1: Point, c2: Point, to: Point },
}

impl Segment {
    pub fn end(&self) -> Point {
        match self {
            Segment::Line { to } | Segment::Curve { to, .. } => *to,
        }
    }

    /// Start point plus every control point
    pub fn control_points(&self, from: Point) -> Vec<Point> {
        match self {
            Segment::Line { to } => vec![from, *to],
            Segment::Curve { c1, c2, to } => vec![from, *c1, *c2, *to],
        }
    }
}

/// A connected run of segments; no segments means a single-point subpath
#[derive(Debug, Clone, PartialEq)]
pub struct Subpath {
    pub start: Point,
    pub segments: Vec<Segment>,
    pub closed: bool,
}

impl Subpath {
    pub fn new(start: Point) -> Self {
        Self {
            start,
            segments: Vec::new(),
            closed: false,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn end(&self) -> Point {
        self.segments.last().map_or(self.start, Segment::end)
    }

    /// Segments paired with their start points; closed subpaths include the implicit
    /// closing line when it has length
    pub fn segments_with_start(&self) -> Vec<(Point, Segment)> {
        let mut from = self.start;
        let mut pairs = Vec::with_capacity(self.segments.len() + 1);
        for segment in &self.segments {
            pairs.push((from, *segment));
            from = segment.end();
        }
        if self.closed && !self.segments.is_empty() && from != self.start {
            pairs.push((from, Segment::Line { to: self.start }));
        }
        pairs
    }

    /// Every point the subpath touches
    pub fn points(&self) -> Vec<Point> {
        let mut points = vec![self.start];
        for segment in &self.segments {
            match segment {
                Segment::Line { to } => points.push(*to),
                Segment::Curve { c1, c2, to } => points.extend([*c1, *c2, *to]),
            }
        }
        points
    }

    fn write_operations(&self, out: &mut Vec<Operation>) {
        out.push(Operation::new("m", vec![real(self.start.x), real(self.start.y)]));
        for segment in &self.segments {
            match segment {
                Segment::Line { to } => out.push(Operation::new("l", vec![real(to.x), real(to.y)])),
                Segment::Curve { c1, c2, to } => out.push(Operation::new(
                    "c",
                    vec![real(c1.x), real(c1.y), real(c2.x), real(c2.y), real(to.x), real(to.y)],
                )),
            }
        }
        if self.closed {
            out.push(Operation::new("h", vec![]));
        }
    }
}

/// The current path between construction and painting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    pub subpaths: Vec<Subpath>,
}

impl Path {
    pub fn new(subpaths: Vec<Subpath>) -> Self {
        Self { subpaths }
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.is_empty()
    }

    /// Close the last subpath, as `s`, `b` and `b*` do before painting
    pub fn close_last(&mut self) {
        if let Some(last) = self.subpaths.last_mut() {
            last.closed = true;
        }
    }

    /// Construction operators reproducing this path
    pub fn to_operations(&self) -> Vec<Operation> {
        let mut out = Vec::new();
        for subpath in &self.subpaths {
            subpath.write_operations(&mut out);
        }
        out
    }
}

/// Accumulates construction operators into a [`Path`]
#[derive(Debug, Default)]
pub struct PathBuilder {
    subpaths: Vec<Subpath>,
}

impl PathBuilder {
    pub fn is_empty(&self) -> bool {
        self.subpaths.is_empty()
    }

    pub fn move_to(&mut self, p: Point) {
        // A bare `m` followed by another `m` is superseded
        if let Some(last) = self.subpaths.last() {
            if last.is_degenerate() && !last.closed {
                self.subpaths.pop();
            }
        }
        self.subpaths.push(Subpath::new(p));
    }

    pub fn line_to(&mut self, to: Point) {
        self.open_subpath().segments.push(Segment::Line { to });
    }

    pub fn curve_to(&mut self, c1: Point, c2: Point, to: Point) {
        self.open_subpath().segments.push(Segment::Curve { c1, c2, to });
    }

    /// `v`: first control point is the current point
    pub fn curve_v(&mut self, c2: Point, to: Point) {
        let current = self.current_point();
        self.curve_to(current, c2, to);
    }

    /// `y`: second control point is the end point
    pub fn curve_y(&mut self, c1: Point, to: Point) {
        self.curve_to(c1, to, to);
    }

    pub fn close(&mut self) {
        if let Some(last) = self.subpaths.last_mut() {
            last.closed = true;
        }
    }

    /// `re`: a closed subpath of three explicit lines plus the closing edge
    pub fn rectangle(&mut self, x: f64, y: f64, width: f64, height: f64) {
        let mut subpath = Subpath::new(Point::new(x, y));
        subpath.segments = vec![
            Segment::Line { to: Point::new(x + width, y) },
            Segment::Line { to: Point::new(x + width, y + height) },
            Segment::Line { to: Point::new(x, y + height) },
        ];
        subpath.closed = true;
        self.subpaths.push(subpath);
    }

    pub fn take(&mut self) -> Path {
        Path::new(std::mem::take(&mut self.subpaths))
    }

    fn current_point(&self) -> Point {
        match self.subpaths.last() {
            Some(last) if last.closed => last.start,
            Some(last) => last.end(),
            None => Point::new(0.0, 0.0),
        }
    }

    /// Subpath that new segments extend; after `h` a new one starts at the old start
    fn open_subpath(&mut self) -> &mut Subpath {
        let needs_new = match self.subpaths.last() {
            Some(last) => last.closed,
            None => true,
        };
        if needs_new {
            let start = self.current_point();
            self.subpaths.push(Subpath::new(start));
        }
        let last = self.subpaths.len() - 1;
        &mut self.subpaths[last]
    }
}
