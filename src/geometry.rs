//! Affine geometry in PDF user space
//!
//! Matrices follow the PDF row-vector convention: a point `p` maps to `p × M`, so
//! `a.multiply(&b)` applies `a` first and `b` second.

/// A point in some PDF coordinate space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Represents a PDF transformation matrix [a b c d e f]
/// where: x' = a*x + c*y + e, y' = b*x + d*y + f
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Identity matrix (no transformation)
    pub fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: tx, f: ty }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self { a: sx, b: 0.0, c: 0.0, d: sy, e: 0.0, f: 0.0 }
    }

    /// Build from a 6-element operand list
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [a, b, c, d, e, f] => Some(Self::new(*a, *b, *c, *d, *e, *f)),
            _ => None,
        }
    }

    /// `self` followed by `other`
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn is_invertible(&self) -> bool {
        self.determinant().abs() > 1e-12
    }

    /// Calculate the inverse of this transformation matrix
    ///
    /// Returns `None` for singular matrices.
    pub fn inverse(&self) -> Option<Self> {
        // | a  c  e |        | d/det   -c/det   (c*f - d*e)/det |
        // | b  d  f |  ==>   | -b/det   a/det   (b*e - a*f)/det |
        // | 0  0  1 |        |   0       0            1         |
        let det = self.determinant();
        if det.abs() <= 1e-12 {
            return None;
        }

        Some(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }

    /// Check if this is (approximately) the identity matrix
    pub fn is_identity(&self) -> bool {
        (self.a - 1.0).abs() < 0.001
            && self.b.abs() < 0.001
            && self.c.abs() < 0.001
            && (self.d - 1.0).abs() < 0.001
            && self.e.abs() < 0.001
            && self.f.abs() < 0.001
    }

    pub fn transform(&self, p: Point) -> Point {
        Point {
            x: self.a * p.x + self.c * p.y + self.e,
            y: self.b * p.x + self.d * p.y + self.f,
        }
    }

    /// Corners of `rect` mapped through this matrix, counter-clockwise from lower-left
    pub fn transform_rect(&self, rect: &Rectangle) -> [Point; 4] {
        [
            self.transform(Point::new(rect.llx, rect.lly)),
            self.transform(Point::new(rect.urx, rect.lly)),
            self.transform(Point::new(rect.urx, rect.ury)),
            self.transform(Point::new(rect.llx, rect.ury)),
        ]
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

/// Axis-aligned rectangle, always normalised so `llx <= urx` and `lly <= ury`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl Rectangle {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            llx: x1.min(x2),
            lly: y1.min(y2),
            urx: x1.max(x2),
            ury: y1.max(y2),
        }
    }

    /// Rectangle from origin and size, as the `re` operator describes it
    pub fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Bounding box of a point set; `None` when empty
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut rect = Self::new(first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            rect.llx = rect.llx.min(p.x);
            rect.lly = rect.lly.min(p.y);
            rect.urx = rect.urx.max(p.x);
            rect.ury = rect.ury.max(p.y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }

    /// Inclusive containment
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.llx && p.x <= self.urx && p.y >= self.lly && p.y <= self.ury
    }

    pub fn contains_all(&self, points: &[Point]) -> bool {
        points.iter().all(|p| self.contains(*p))
    }

    /// Overlap with positive area; rectangles sharing only an edge do not intersect
    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let llx = self.llx.max(other.llx);
        let lly = self.lly.max(other.lly);
        let urx = self.urx.min(other.urx);
        let ury = self.ury.min(other.ury);
        if llx < urx && lly < ury {
            Some(Rectangle { llx, lly, urx, ury })
        } else {
            None
        }
    }

    pub fn union(&self, other: &Rectangle) -> Rectangle {
        Rectangle {
            llx: self.llx.min(other.llx),
            lly: self.lly.min(other.lly),
            urx: self.urx.max(other.urx),
            ury: self.ury.max(other.ury),
        }
    }

    /// Whether a convex quadrilateral (possibly degenerate) overlaps this rectangle.
    ///
    /// Separating-axis test over the rectangle axes and the quad's edge normals.
    /// Shapes that only touch are not considered overlapping.
    pub fn intersects_quad(&self, quad: &[Point; 4]) -> bool {
        let corners = [
            Point::new(self.llx, self.lly),
            Point::new(self.urx, self.lly),
            Point::new(self.urx, self.ury),
            Point::new(self.llx, self.ury),
        ];

        let mut axes = vec![Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        for i in 0..4 {
            let from = quad[i];
            let to = quad[(i + 1) % 4];
            let (dx, dy) = (to.x - from.x, to.y - from.y);
            if dx.abs() > 1e-12 || dy.abs() > 1e-12 {
                axes.push(Point::new(-dy, dx));
            }
        }

        axes.iter().all(|axis| {
            let (q_min, q_max) = project(quad, axis);
            let (r_min, r_max) = project(&corners, axis);
            q_max > r_min && r_max > q_min
        })
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.llx, self.lly, self.urx, self.ury]
    }
}

fn project(points: &[Point], axis: &Point) -> (f64, f64) {
    points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        let d = p.x * axis.x + p.y * axis.y;
        (lo.min(d), hi.max(d))
    })
}
