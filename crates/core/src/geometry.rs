//! The polygon kernel that shading is computed with. The shading engine never
//! touches polygons directly, it only goes through the [Footprint] trait, so
//! any polygon library (or a much dumber stand-in for tests) can be plugged
//! in. The default implementation is backed by [geo].

use geo::{
    algorithm::line_intersection::line_intersection, Area, BooleanOps, Coord,
    Line, LineString, MultiPolygon, Polygon, Rect, Translate,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A planar (possibly multi-part) region that can be moved, cut and measured.
/// This is everything the shading engine needs to know about a collector
/// shape.
pub trait Footprint: Clone + Send + Sync {
    /// Rigidly translate the region by `(dx, dy)`.
    fn translate(&self, dx: f64, dy: f64) -> Self;

    /// The part of `self` that is not covered by `other`.
    fn difference(&self, other: &Self) -> Self;

    /// Total enclosed area. Must be non-negative.
    fn area(&self) -> f64;

    /// All boundary vertices of the region, in no particular order.
    fn vertices(&self) -> Vec<Point2<f64>>;

    /// Is this a usable collector geometry? A valid geometry is a set of
    /// simple (non-self-intersecting) polygons.
    fn is_valid(&self) -> bool;
}

impl Footprint for MultiPolygon<f64> {
    fn translate(&self, dx: f64, dy: f64) -> Self {
        Translate::translate(self, dx, dy)
    }

    fn difference(&self, other: &Self) -> Self {
        BooleanOps::difference(self, other)
    }

    fn area(&self) -> f64 {
        self.unsigned_area()
    }

    fn vertices(&self) -> Vec<Point2<f64>> {
        self.iter()
            .flat_map(|polygon| {
                std::iter::once(polygon.exterior())
                    .chain(polygon.interiors())
                    .flat_map(|ring| ring.coords())
            })
            .map(|coord| Point2::new(coord.x, coord.y))
            .collect()
    }

    fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.iter().all(|polygon| {
                std::iter::once(polygon.exterior())
                    .chain(polygon.interiors())
                    .all(is_simple_ring)
            })
            && self.iter().all(holes_inside_exterior)
            && parts_disjoint(&self.0)
    }
}

/// Relative area below which an overlap counts as rounding noise, e.g. two
/// parts that share an edge
const OVERLAP_TOLERANCE: f64 = 1e-9;

fn ring_polygon(ring: &LineString<f64>) -> Polygon<f64> {
    Polygon::new(ring.clone(), Vec::new())
}

/// Check that every hole of a polygon lies within its exterior ring
fn holes_inside_exterior(polygon: &Polygon<f64>) -> bool {
    let exterior = ring_polygon(polygon.exterior());
    polygon.interiors().iter().all(|interior| {
        let hole = ring_polygon(interior);
        hole.difference(&exterior).unsigned_area()
            <= OVERLAP_TOLERANCE * hole.unsigned_area()
    })
}

/// Check that no two parts of a multipolygon overlap. Parts may touch.
fn parts_disjoint(parts: &[Polygon<f64>]) -> bool {
    parts.iter().enumerate().all(|(i, a)| {
        parts[i + 1..].iter().all(|b| {
            let smaller = a.unsigned_area().min(b.unsigned_area());
            a.intersection(b).unsigned_area() <= OVERLAP_TOLERANCE * smaller
        })
    })
}

/// Check that a closed ring has at least three distinct points and that no
/// two non-adjacent edges touch.
fn is_simple_ring(ring: &LineString<f64>) -> bool {
    if !ring.is_closed() {
        return false;
    }
    let edges: Vec<Line<f64>> = ring
        .lines()
        .filter(|line| line.start != line.end)
        .collect();
    let n = edges.len();
    if n < 3 {
        return false;
    }

    for i in 0..n {
        // Skip i+1, and the wraparound pair (first, last), since those share
        // a vertex by construction
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if line_intersection(edges[i], edges[j]).is_some() {
                return false;
            }
        }
    }
    true
}

/// Errors for collector geometries that can't be used in a field.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("{name} collector geometry is not a set of simple polygons")]
    Invalid { name: &'static str },
    #[error("{name} collector geometry has no area")]
    ZeroArea { name: &'static str },
    #[error(
        "active collector geometry extends {excess} area units outside the \
        total collector geometry"
    )]
    ActiveOutsideTotal { excess: f64 },
}

/// A circle in the ground plane. Only used for enclosing-circle math.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Circle {
    pub center: Point2<f64>,
    pub radius: f64,
}

impl Circle {
    /// Relative slack when checking containment, so that points on the
    /// boundary don't trigger a rebuild due to rounding
    const TOLERANCE: f64 = 1e-9;

    fn from_point(point: Point2<f64>) -> Self {
        Self {
            center: point,
            radius: 0.0,
        }
    }

    /// Smallest circle through two points
    fn from_diameter(a: Point2<f64>, b: Point2<f64>) -> Self {
        Self {
            center: nalgebra::center(&a, &b),
            radius: nalgebra::distance(&a, &b) / 2.0,
        }
    }

    /// Circle through three points. Degenerates to the circle on the two
    /// points furthest apart if the points are (nearly) collinear.
    fn from_triangle(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> Self {
        let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        if d.abs() > f64::EPSILON {
            let a2 = a.coords.norm_squared();
            let b2 = b.coords.norm_squared();
            let c2 = c.coords.norm_squared();
            let center = Point2::new(
                (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d,
                (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d,
            );
            return Self {
                center,
                radius: nalgebra::distance(&center, &a),
            };
        }

        [
            Self::from_diameter(a, b),
            Self::from_diameter(b, c),
            Self::from_diameter(a, c),
        ]
        .into_iter()
        .fold(Self::from_point(a), |best, cand| {
            if cand.radius > best.radius {
                cand
            } else {
                best
            }
        })
    }

    pub fn contains(&self, point: Point2<f64>) -> bool {
        nalgebra::distance(&self.center, &point)
            <= self.radius * (1.0 + Self::TOLERANCE) + Self::TOLERANCE
    }

    pub fn diameter(&self) -> f64 {
        self.radius * 2.0
    }
}

/// Smallest circle that contains every given point, via the incremental form
/// of Welzl's algorithm. Returns `None` for an empty point set.
pub fn enclosing_circle(points: &[Point2<f64>]) -> Option<Circle> {
    let (first, rest) = points.split_first()?;
    let mut circle = Circle::from_point(*first);

    for (i, &p) in rest.iter().enumerate() {
        if circle.contains(p) {
            continue;
        }
        // p is on the boundary of the circle for points[..=i+1]
        circle = Circle::from_point(p);
        for (j, &q) in points[..=i].iter().enumerate() {
            if circle.contains(q) {
                continue;
            }
            // p and q are both on the boundary
            circle = Circle::from_diameter(p, q);
            for &r in &points[..j] {
                if !circle.contains(r) {
                    circle = Circle::from_triangle(p, q, r);
                }
            }
        }
    }

    Some(circle)
}

/// Minimum distance between two tracker centers for the trackers not to
/// collide, no matter how they are turned: the diameter of the smallest
/// circle containing the whole footprint. Returns 0 for an empty footprint.
pub fn min_tracker_spacing(footprint: &impl Footprint) -> f64 {
    enclosing_circle(&footprint.vertices())
        .map(|circle| circle.diameter())
        .unwrap_or(0.0)
}

/// An axis-aligned rectangle as a footprint, given its lower-left and
/// upper-right corners.
pub fn rectangle(
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
) -> MultiPolygon<f64> {
    let rect = Rect::new(
        Coord { x: min_x, y: min_y },
        Coord { x: max_x, y: max_y },
    );
    MultiPolygon::new(vec![rect.to_polygon()])
}

/// Serializable definition of a collector shape. All coordinates are in the
/// collector plane, relative to the tracker's rotation center.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Outline of the whole collector, as a list of `[x, y]` vertices. This is
    /// the shape that casts shadows.
    pub total: Vec<[f64; 2]>,

    /// Outlines of the active parts of the collector (e.g. individual
    /// modules), each a list of `[x, y]` vertices. These are the areas whose
    /// shading is measured. If empty, the whole collector is active.
    pub active: Vec<Vec<[f64; 2]>>,
}

impl CollectorConfig {
    /// A single rectangular collector of the given size, centered on the
    /// origin, where the whole area is active.
    pub fn rectangular(width: f64, height: f64) -> Self {
        let (w, h) = (width / 2.0, height / 2.0);
        Self {
            total: vec![[-w, -h], [w, -h], [w, h], [-w, h]],
            active: Vec::new(),
        }
    }

    /// Build the total collector geometry
    pub fn total_geometry(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![ring_to_polygon(&self.total)])
    }

    /// Build the active collector geometry. Falls back to the total geometry
    /// when no active areas are defined.
    pub fn active_geometry(&self) -> MultiPolygon<f64> {
        if self.active.is_empty() {
            self.total_geometry()
        } else {
            MultiPolygon::new(
                self.active.iter().map(|ring| ring_to_polygon(ring)).collect(),
            )
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self::rectangular(4.0, 2.0)
    }
}

fn ring_to_polygon(ring: &[[f64; 2]]) -> Polygon<f64> {
    // Polygon::new closes the ring for us
    Polygon::new(LineString::from(ring.to_vec()), Vec::new())
}
