//! Shaded fraction of the reference collector for a single sun position.
//!
//! Every neighbor that is on the sun side of the reference tracker has its
//! silhouette projected along the sun rays onto the plane of the reference
//! collector. Since all trackers point at the sun, the collectors are parallel
//! and the projection is a pure translation of the collector outline. The
//! union of those translated outlines is cut out of the active area, and
//! whatever is left is unshaded.

use crate::{config::TerrainSlope, field::layout::NeighborRecord, geometry::Footprint};
use serde::{Deserialize, Serialize};

/// Position of the sun in the sky.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolarPosition {
    /// Angle above the horizon, in degrees. Negative when the sun is down.
    pub elevation: f64,
    /// Compass direction of the sun, in degrees clockwise from north
    pub azimuth: f64,
}

impl SolarPosition {
    pub fn new(elevation: f64, azimuth: f64) -> Self {
        Self {
            elevation,
            azimuth,
        }
    }
}

/// Something that wants to see the geometry behind a shading evaluation, e.g.
/// to draw it. Only called for evaluations that get as far as the polygon
/// stage, i.e. not when the result is decided by the sun position alone.
pub trait ShadingObserver<G> {
    /// `shadows` are the projected outlines of every neighbor that was
    /// close enough to overlap the reference collector, in the order they
    /// were subtracted.
    fn observe(
        &mut self,
        sun: SolarPosition,
        active_geometry: &G,
        unshaded_geometry: &G,
        shadows: &[G],
    );
}

/// Elevation of the horizon created by the sloped terrain, looking towards
/// `azimuth`. Looking downhill the terrain drops below the true horizon,
/// which doesn't help anything, so the result is never negative.
pub fn horizon_elevation_angle(azimuth: f64, slope: TerrainSlope) -> f64 {
    let elevation = (-(slope.azimuth - azimuth).to_radians().cos()
        * slope.tilt.to_radians().tan())
    .atan()
    .to_degrees();
    elevation.max(0.0)
}

/// Offset of the shadow that a neighbor casts in the plane of the reference
/// collector. Returns `None` if the neighbor can't cast a shadow towards the
/// reference tracker at all: if it's on the far side of the reference tracker
/// from the sun, or if its relative slope is so steep that the projection
/// degenerates.
pub fn shadow_offset(
    sun: SolarPosition,
    neighbor: &NeighborRecord,
) -> Option<(f64, f64)> {
    /// Anything flatter than this counts as a vertical relative slope
    const MIN_SLOPE_COS: f64 = 1e-9;

    let (difference_sin, difference_cos) =
        (sun.azimuth - neighbor.relative_azimuth).to_radians().sin_cos();
    // Only neighbors within +/-90° of the sun direction
    if difference_cos <= 0.0 {
        return None;
    }
    let slope_cos = neighbor.relative_slope.to_radians().cos();
    if slope_cos.abs() < MIN_SLOPE_COS {
        return None;
    }

    let x_offset = neighbor.distance * difference_sin;
    let y_offset = -neighbor.distance
        * difference_cos
        * (sun.elevation - neighbor.relative_slope).to_radians().sin()
        / slope_cos;
    Some((x_offset, y_offset))
}

/// All the inputs to a shading evaluation, other than the sun position. This
/// is just a bundle of borrows, so it's cheap to build for every evaluation.
#[derive(Debug)]
pub struct ShadingScene<'a, G> {
    /// Outline of a whole collector. This is what casts shadows.
    pub total_geometry: &'a G,
    /// The part of the collector whose shading we measure
    pub active_geometry: &'a G,
    /// Shadows displaced by this much or more can't overlap the collector
    pub min_tracker_spacing: f64,
    pub neighbors: &'a [NeighborRecord],
    pub slope: TerrainSlope,
    /// Sun elevation above which nothing can be shaded
    pub max_shading_elevation: f64,
}

impl<'a, G: Footprint> ShadingScene<'a, G> {
    /// Calculate the fraction of the active collector area that's shaded, for
    /// one sun position. The result is in `[0, 1]`, or `NaN` if the sun is
    /// below the horizon (where shading has no meaning).
    pub fn shaded_fraction(&self, sun: SolarPosition) -> f64 {
        self.evaluate(sun, None)
    }

    /// Same as [Self::shaded_fraction], but also hand the intermediate
    /// geometry to an observer.
    pub fn shaded_fraction_observed(
        &self,
        sun: SolarPosition,
        observer: &mut dyn ShadingObserver<G>,
    ) -> f64 {
        self.evaluate(sun, Some(observer))
    }

    fn evaluate(
        &self,
        sun: SolarPosition,
        observer: Option<&mut dyn ShadingObserver<G>>,
    ) -> f64 {
        if sun.elevation < 0.0 {
            return f64::NAN;
        }
        // Behind the terrain, so everything's in the dark
        if sun.elevation <= horizon_elevation_angle(sun.azimuth, self.slope) {
            return 1.0;
        }
        if sun.elevation > self.max_shading_elevation {
            return 0.0;
        }

        let keep_shadows = observer.is_some();
        let mut shadows = Vec::new();
        let mut unshaded_geometry = self.active_geometry.clone();
        let offsets = self
            .neighbors
            .iter()
            .filter_map(|neighbor| shadow_offset(sun, neighbor))
            // Cheap check before the polygon work
            .filter(|(x, y)| x.hypot(*y) < self.min_tracker_spacing);
        for (x, y) in offsets {
            let shadow = self.total_geometry.translate(x, y);
            unshaded_geometry = unshaded_geometry.difference(&shadow);
            if keep_shadows {
                shadows.push(shadow);
            }
        }

        if let Some(observer) = observer {
            observer.observe(
                sun,
                self.active_geometry,
                &unshaded_geometry,
                &shadows,
            );
        }

        let fraction =
            1.0 - unshaded_geometry.area() / self.active_geometry.area();
        // Boolean ops can leave rounding noise at either end of the range
        fraction.clamp(0.0, 1.0)
    }
}
