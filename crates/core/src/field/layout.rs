//! Generation of a regular field layout. The field is a sheared, stretched and
//! rotated integer lattice, scaled so that each tracker gets exactly as much
//! ground as the ground cover ratio asks for. Only the neighborhood of one
//! reference tracker is generated, since every tracker in an infinite regular
//! field sees the same neighborhood.
//!
//! Field layout parameters and their limits follow Cumpston & Pye, "Shading
//! and land use in regularly-spaced sun-tracking collectors"
//! (<https://doi.org/10.1016/j.solener.2014.06.012>).

use crate::{
    config::{FieldConfig, LayoutType, TerrainSlope},
    util,
};
use log::debug;
use nalgebra::{Matrix2, Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Everything wrong that can be wrong with a field layout definition. Each
/// variant maps to one validation rule.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error(
        "unknown layout type {name:?}, layout type must be one of: {}",
        LayoutType::names()
    )]
    UnknownLayoutType { name: String },

    #[error(
        "aspect_ratio, offset, and rotation need to be specified when no \
        layout type is given"
    )]
    MissingLayoutParameters,

    #[error(
        "layout type {layout_type} cannot be combined with explicit \
        aspect_ratio, offset, or rotation"
    )]
    ConflictingLayoutParameters { layout_type: LayoutType },

    #[error(
        "aspect ratio {aspect_ratio} is too low and not feasible, must be at \
        least {min}"
    )]
    AspectRatioTooLow { aspect_ratio: f64, min: f64 },

    #[error(
        "aspect ratio {aspect_ratio} is too high and not feasible, must be at \
        most {max}"
    )]
    AspectRatioTooHigh { aspect_ratio: f64, max: f64 },

    #[error("offset {offset} is outside the valid range [-0.5, 0.5)")]
    OffsetOutOfRange { offset: f64 },

    #[error("rotation {rotation} is outside the valid range [0, 180)")]
    RotationOutOfRange { rotation: f64 },

    #[error("ground cover ratio {gcr} is outside the valid range (0, {max}]")]
    GcrOutOfRange { gcr: f64, max: f64 },

    #[error(
        "minimum tracker spacing {min_spacing} is not physically possible \
        for a collector area of {area}, must be at least {min}"
    )]
    MinSpacingTooSmall { min_spacing: f64, area: f64, min: f64 },

    #[error("slope azimuth {azimuth} is outside the valid range [0, 360)")]
    SlopeAzimuthOutOfRange { azimuth: f64 },

    #[error("slope tilt {tilt} must be a finite, non-negative angle")]
    NegativeSlopeTilt { tilt: f64 },
}

/// Something about a layout that's suspicious but not wrong. Generation
/// proceeds with the given values.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PlausibilityWarning {
    #[error(
        "slope tilt of {tilt} degrees is probably not realistic (more than \
        {} degrees)",
        TerrainSlope::PLAUSIBLE_TILT_LIMIT
    )]
    SteepSlope { tilt: f64 },
}

/// The fully resolved set of parameters that defines a field layout. Unlike
/// [FieldConfig], every layout parameter is present here, whether it came
/// from a [LayoutType] or was given explicitly.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutParameters {
    /// The standard layout these parameters came from, if any
    pub layout_type: Option<LayoutType>,
    pub gcr: f64,
    pub aspect_ratio: f64,
    pub offset: f64,
    pub rotation: f64,
    pub neighbor_order: u16,
    pub slope: TerrainSlope,
}

impl LayoutParameters {
    /// Resolve the layout parameters from a config, either from the named
    /// layout type or from the explicit parameters. This does **not** check
    /// that the parameters are in range; that happens in
    /// [generate_field_layout].
    pub fn from_config(config: &FieldConfig) -> Result<Self, LayoutError> {
        let explicit = (config.aspect_ratio, config.offset, config.rotation);
        let (layout_type, (aspect_ratio, offset, rotation)) =
            match (&config.layout_type, explicit) {
                (Some(name), (None, None, None)) => {
                    let layout_type =
                        LayoutType::from_str(name).map_err(|_| {
                            LayoutError::UnknownLayoutType { name: name.clone() }
                        })?;
                    (Some(layout_type), layout_type.parameters())
                }
                (Some(name), _) => {
                    // Report an unknown name before complaining about the
                    // extra parameters
                    let layout_type =
                        LayoutType::from_str(name).map_err(|_| {
                            LayoutError::UnknownLayoutType { name: name.clone() }
                        })?;
                    return Err(LayoutError::ConflictingLayoutParameters {
                        layout_type,
                    });
                }
                (None, (Some(aspect_ratio), Some(offset), Some(rotation))) => {
                    (None, (aspect_ratio, offset, rotation))
                }
                (None, _) => return Err(LayoutError::MissingLayoutParameters),
            };

        Ok(Self {
            layout_type,
            gcr: config.gcr,
            aspect_ratio,
            offset,
            rotation,
            neighbor_order: config.neighbor_order,
            slope: config.slope,
        })
    }

    /// Number of trackers along each side of the generated lattice
    pub fn lattice_side(&self) -> usize {
        2 * self.neighbor_order as usize + 1
    }

    /// Number of neighbors the layout will contain: the whole lattice minus
    /// the reference tracker
    pub fn neighbor_count(&self) -> usize {
        self.lattice_side().pow(2) - 1
    }

    /// Check every parameter against the physical and geometric limits of the
    /// layout. `total_footprint_size` is the area of one collector. Limits
    /// that depend on other parameters are checked after those parameters.
    fn validate(
        &self,
        total_footprint_size: f64,
        min_spacing: f64,
    ) -> Result<Vec<PlausibilityWarning>, LayoutError> {
        let Self {
            gcr,
            aspect_ratio,
            offset,
            rotation,
            slope,
            ..
        } = *self;
        let offset_factor = (1.0 - offset.powi(2)).sqrt();

        if !(-0.5..0.5).contains(&offset) {
            return Err(LayoutError::OffsetOutOfRange { offset });
        }
        if !(0.0..180.0).contains(&rotation) {
            return Err(LayoutError::RotationOutOfRange { rotation });
        }
        // No shape of this area fits in a smaller circle than a disc does
        let min_possible_spacing =
            (4.0 * total_footprint_size / std::f64::consts::PI).sqrt();
        // Written so that NaN fails every check
        if !(min_spacing >= min_possible_spacing) {
            return Err(LayoutError::MinSpacingTooSmall {
                min_spacing,
                area: total_footprint_size,
                min: min_possible_spacing,
            });
        }
        let max_gcr = total_footprint_size / (min_spacing.powi(2) * offset_factor);
        if !(gcr > 0.0 && gcr <= max_gcr) {
            return Err(LayoutError::GcrOutOfRange { gcr, max: max_gcr });
        }
        // Rows can't be closer together than the trackers in a row
        if !(aspect_ratio >= offset_factor) {
            return Err(LayoutError::AspectRatioTooLow {
                aspect_ratio,
                min: offset_factor,
            });
        }
        let max_aspect_ratio =
            total_footprint_size / (gcr * min_spacing.powi(2));
        if !(aspect_ratio <= max_aspect_ratio) {
            return Err(LayoutError::AspectRatioTooHigh {
                aspect_ratio,
                max: max_aspect_ratio,
            });
        }
        if !(0.0..360.0).contains(&slope.azimuth) {
            return Err(LayoutError::SlopeAzimuthOutOfRange {
                azimuth: slope.azimuth,
            });
        }
        if !(slope.tilt >= 0.0 && slope.tilt.is_finite()) {
            return Err(LayoutError::NegativeSlopeTilt { tilt: slope.tilt });
        }

        let mut warnings = Vec::new();
        if slope.tilt > TerrainSlope::PLAUSIBLE_TILT_LIMIT {
            warnings.push(PlausibilityWarning::SteepSlope { tilt: slope.tilt });
        }
        Ok(warnings)
    }
}

/// Position of one neighboring tracker relative to the reference tracker.
/// These are always derived together from a lattice position, so they can't
/// be set individually.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    /// Ground-plane offset towards the east
    pub x: f64,
    /// Ground-plane offset towards the north
    pub y: f64,
    /// Height offset caused by the terrain slope. Positive means the
    /// neighbor is higher up.
    pub z: f64,
    /// Horizontal distance between the two trackers
    pub distance: f64,
    /// Compass bearing of the neighbor as seen from the reference tracker,
    /// in `[0, 360)`
    pub relative_azimuth: f64,
    /// Slope angle from the reference tracker up to the neighbor. This is a
    /// simplified projection of the terrain tilt onto the bearing, not an
    /// exact 3D angle.
    pub relative_slope: f64,
}

impl NeighborRecord {
    fn new(x: f64, y: f64, slope: TerrainSlope) -> Self {
        let (azimuth_sin, azimuth_cos) = slope.azimuth.to_radians().sin_cos();
        let tilt_tan = slope.tilt.to_radians().tan();
        let relative_azimuth = util::compass_bearing(x, y);
        Self {
            x,
            y,
            // Downslope neighbors are lower
            z: -x * azimuth_sin * tilt_tan - y * azimuth_cos * tilt_tan,
            distance: x.hypot(y),
            relative_azimuth,
            relative_slope: -(slope.azimuth - relative_azimuth)
                .to_radians()
                .cos()
                * slope.tilt,
        }
    }
}

/// Output of [generate_field_layout]
#[derive(Clone, Debug, PartialEq)]
pub struct FieldLayout {
    pub neighbors: Vec<NeighborRecord>,
    pub warnings: Vec<PlausibilityWarning>,
}

/// Generate the neighbors of the reference tracker for a field layout.
///
/// `total_footprint_size` is the area of one whole collector and
/// `min_spacing` the minimum distance between two tracker centers. Returns an
/// error if any parameter is infeasible. The result always contains exactly
/// [LayoutParameters::neighbor_count] neighbors, ordered row by row from the
/// south-west corner of the untransformed lattice.
pub fn generate_field_layout(
    params: &LayoutParameters,
    total_footprint_size: f64,
    min_spacing: f64,
) -> Result<FieldLayout, LayoutError> {
    let warnings = params.validate(total_footprint_size, min_spacing)?;

    // The shear is applied to the untransformed lattice coordinates, then the
    // primary direction is stretched. Matrix2::new is row-major, so this
    // maps (x, y) to (aspect_ratio * x, y + offset * x)
    let shear_stretch = Matrix2::new(params.aspect_ratio, 0.0, params.offset, 1.0);
    let rotation = Rotation2::new(params.rotation.to_radians());
    // Each tracker now occupies aspect_ratio square units of ground. Scale
    // that to the area dictated by the GCR
    let scaling = (total_footprint_size / (params.gcr * params.aspect_ratio)).sqrt();
    let transform = rotation.matrix() * shear_stretch * scaling;
    debug!(
        "Lattice transform for {:?}: {} (scaling {})",
        params, transform, scaling
    );

    let order = params.neighbor_order as i32;
    let mut neighbors = Vec::with_capacity(params.neighbor_count());
    for j in -order..=order {
        for i in -order..=order {
            // The reference tracker itself
            if i == 0 && j == 0 {
                continue;
            }
            let position = transform * Vector2::new(i as f64, j as f64);
            neighbors.push(NeighborRecord::new(position.x, position.y, params.slope));
        }
    }

    debug_assert_eq!(neighbors.len(), params.neighbor_count());
    Ok(FieldLayout {
        neighbors,
        warnings,
    })
}

/// Highest solar elevation at which any of the neighbors can still cast a
/// shadow on the reference tracker. Above this, a shadow is always displaced
/// by at least `min_spacing` and can't touch the reference collector.
///
/// For a neighbor at distance `d` and relative slope `s`, the shadow offset
/// is at least `d * min(1, sin(e - s) / cos(s))`, so shading requires
/// `sin(e - s) < min_spacing * cos(s) / d`. Neighbors closer than
/// `min_spacing` (or too steep to bound) can shade at any elevation.
pub fn max_shading_elevation(
    min_spacing: f64,
    neighbors: &[NeighborRecord],
) -> f64 {
    neighbors
        .iter()
        .filter_map(|neighbor| {
            let slope = neighbor.relative_slope;
            let slope_cos = slope.to_radians().cos();
            // Degenerate neighbors are skipped during shading too
            if slope_cos <= 0.0 {
                return None;
            }
            if neighbor.distance < min_spacing {
                return Some(90.0);
            }
            let ratio = min_spacing * slope_cos / neighbor.distance;
            if ratio >= 1.0 {
                return Some(90.0);
            }
            let limit = ratio.asin().to_degrees();
            // sin(e - s) climbs back below the ratio once e - s passes
            // 180 - limit, which is reachable for downhill neighbors
            if limit > 90.0 + slope {
                Some(90.0)
            } else {
                Some(slope + limit)
            }
        })
        .fold(0.0, f64::max)
        .clamp(0.0, 90.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Area and min spacing of a 4x2 rectangular collector
    const AREA: f64 = 8.0;
    const MIN_SPACING: f64 = 4.47213595499958; // sqrt(20)

    fn params(aspect_ratio: f64, offset: f64, rotation: f64) -> LayoutParameters {
        LayoutParameters {
            layout_type: None,
            gcr: 0.25,
            aspect_ratio,
            offset,
            rotation,
            neighbor_order: 1,
            slope: TerrainSlope::FLAT,
        }
    }

    fn config_with(
        layout_type: Option<&str>,
        explicit: (Option<f64>, Option<f64>, Option<f64>),
    ) -> FieldConfig {
        FieldConfig {
            layout_type: layout_type.map(String::from),
            aspect_ratio: explicit.0,
            offset: explicit.1,
            rotation: explicit.2,
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_layout_type() {
        let params = LayoutParameters::from_config(&config_with(
            Some("hexagonal_e_w"),
            (None, None, None),
        ))
        .unwrap();
        assert_eq!(params.layout_type, Some(LayoutType::HexagonalEastWest));
        assert_eq!(params.aspect_ratio, 3f64.sqrt() / 2.0);
        assert_eq!(params.offset, -0.5);
        assert_eq!(params.rotation, 90.0);
    }

    #[test]
    fn test_resolve_errors() {
        assert_eq!(
            LayoutParameters::from_config(&config_with(
                Some("this_is_not_a_layout_type"),
                (None, None, None)
            )),
            Err(LayoutError::UnknownLayoutType {
                name: "this_is_not_a_layout_type".into()
            })
        );
        assert_eq!(
            LayoutParameters::from_config(&config_with(
                None,
                (Some(1.0), Some(0.0), None)
            )),
            Err(LayoutError::MissingLayoutParameters)
        );
        assert_eq!(
            LayoutParameters::from_config(&config_with(
                Some("square"),
                (None, None, Some(10.0))
            )),
            Err(LayoutError::ConflictingLayoutParameters {
                layout_type: LayoutType::Square
            })
        );
    }

    #[test]
    fn test_neighbor_count() {
        for order in 0..5 {
            let params = LayoutParameters {
                neighbor_order: order,
                ..params(1.0, 0.0, 0.0)
            };
            let layout =
                generate_field_layout(&params, AREA, MIN_SPACING).unwrap();
            let side = 2 * order as usize + 1;
            assert_eq!(layout.neighbors.len(), side * side - 1);
            assert!(layout.neighbors.iter().all(|n| n.distance > 0.0));
        }
    }

    #[test]
    fn test_square_layout_positions() {
        // gcr 0.25 with area 8 means 32 units of ground per tracker, so the
        // grid spacing is sqrt(32)
        let layout =
            generate_field_layout(&params(1.0, 0.0, 0.0), AREA, MIN_SPACING)
                .unwrap();
        let spacing = 32f64.sqrt();
        let first = layout.neighbors[0];
        assert_approx_eq!(first.x, -spacing);
        assert_approx_eq!(first.y, -spacing);
        assert_approx_eq!(first.relative_azimuth, 225.0);

        // Index 1 is directly south, index 6 directly north (the reference
        // tracker is skipped between 3 and 4)
        assert_approx_eq!(layout.neighbors[1].x, 0.0);
        assert_approx_eq!(layout.neighbors[1].distance, spacing);
        assert_approx_eq!(layout.neighbors[1].relative_azimuth, 180.0);
        assert_approx_eq!(layout.neighbors[6].relative_azimuth, 0.0);
        assert!(layout.warnings.is_empty());
    }

    #[test]
    fn test_offset_precedes_stretch() {
        // The eastern neighbor is shifted north by offset * (unscaled x), not
        // offset * aspect_ratio * x
        let layout =
            generate_field_layout(&params(1.5, 0.25, 0.0), AREA, MIN_SPACING)
                .unwrap();
        let scaling = (AREA / (0.25 * 1.5)).sqrt();
        let east = layout.neighbors[4];
        assert_approx_eq!(east.x, 1.5 * scaling);
        assert_approx_eq!(east.y, 0.25 * scaling);
    }

    #[test]
    fn test_rotation_is_counterclockwise() {
        let layout =
            generate_field_layout(&params(1.0, 0.0, 90.0), AREA, MIN_SPACING)
                .unwrap();
        // The eastern neighbor ends up in the north
        let east = layout.neighbors[4];
        assert_approx_eq!(east.x, 0.0);
        assert_approx_eq!(east.relative_azimuth, 0.0);
    }

    #[test]
    fn test_sloped_layout() {
        let params = LayoutParameters {
            // Slope faces south, so terrain rises towards the north
            slope: TerrainSlope::new(180.0, 10.0),
            ..params(1.0, 0.0, 0.0)
        };
        let layout = generate_field_layout(&params, AREA, MIN_SPACING).unwrap();
        let north = layout.neighbors[6];
        let south = layout.neighbors[1];
        let spacing = 32f64.sqrt();
        assert_approx_eq!(north.z, spacing * 10f64.to_radians().tan());
        assert_approx_eq!(south.z, -spacing * 10f64.to_radians().tan());
        assert_approx_eq!(north.relative_slope, 10.0);
        assert_approx_eq!(south.relative_slope, -10.0);
        // East and west are level
        assert_approx_eq!(layout.neighbors[4].relative_slope, 0.0);
        assert_approx_eq!(layout.neighbors[4].z, 0.0);
    }

    #[test]
    fn test_steep_slope_warning() {
        let params = LayoutParameters {
            slope: TerrainSlope::new(90.0, 25.0),
            ..params(1.0, 0.0, 0.0)
        };
        let layout = generate_field_layout(&params, AREA, MIN_SPACING).unwrap();
        assert_eq!(
            layout.warnings,
            vec![PlausibilityWarning::SteepSlope { tilt: 25.0 }]
        );
    }

    #[test]
    fn test_validation() {
        let check = |params: LayoutParameters, min_spacing: f64| {
            generate_field_layout(&params, AREA, min_spacing).unwrap_err()
        };

        // With offset 0.4, rows may not be closer than sqrt(1 - 0.16)
        assert!(matches!(
            check(params(0.9, 0.4, 0.0), MIN_SPACING),
            LayoutError::AspectRatioTooLow { .. }
        ));
        // Max aspect ratio is 8 / (0.25 * 20) = 1.6
        assert!(matches!(
            check(params(1.7, 0.0, 0.0), MIN_SPACING),
            LayoutError::AspectRatioTooHigh { .. }
        ));
        assert!(matches!(
            check(params(1.0, 0.5, 0.0), MIN_SPACING),
            LayoutError::OffsetOutOfRange { .. }
        ));
        assert!(matches!(
            check(params(1.0, 0.0, 180.0), MIN_SPACING),
            LayoutError::RotationOutOfRange { .. }
        ));
        assert!(matches!(
            check(params(1.0, 0.0, -1.0), MIN_SPACING),
            LayoutError::RotationOutOfRange { .. }
        ));
        // Max GCR is 8 / 20 = 0.4
        assert!(matches!(
            check(
                LayoutParameters {
                    gcr: 0.41,
                    ..params(1.0, 0.0, 0.0)
                },
                MIN_SPACING
            ),
            LayoutError::GcrOutOfRange { .. }
        ));
        assert!(matches!(
            check(
                LayoutParameters {
                    gcr: 0.0,
                    ..params(1.0, 0.0, 0.0)
                },
                MIN_SPACING
            ),
            LayoutError::GcrOutOfRange { .. }
        ));
        // A disc of area 8 has diameter ~3.19
        assert!(matches!(
            check(
                LayoutParameters {
                    gcr: 0.5,
                    ..params(1.0, 0.0, 0.0)
                },
                3.0
            ),
            LayoutError::MinSpacingTooSmall { .. }
        ));
        assert!(matches!(
            check(
                LayoutParameters {
                    slope: TerrainSlope::new(360.0, 5.0),
                    ..params(1.0, 0.0, 0.0)
                },
                MIN_SPACING
            ),
            LayoutError::SlopeAzimuthOutOfRange { .. }
        ));
        assert!(matches!(
            check(
                LayoutParameters {
                    slope: TerrainSlope::new(0.0, -5.0),
                    ..params(1.0, 0.0, 0.0)
                },
                MIN_SPACING
            ),
            LayoutError::NegativeSlopeTilt { .. }
        ));
    }

    #[test]
    fn test_validation_non_finite() {
        let check = |params: LayoutParameters| {
            generate_field_layout(&params, AREA, MIN_SPACING).unwrap_err()
        };
        assert!(matches!(
            check(params(f64::NAN, 0.0, 0.0)),
            LayoutError::AspectRatioTooLow { .. }
        ));
        assert!(matches!(
            check(params(f64::INFINITY, 0.0, 0.0)),
            LayoutError::AspectRatioTooHigh { .. }
        ));
        assert!(matches!(
            check(params(1.0, f64::NAN, 0.0)),
            LayoutError::OffsetOutOfRange { .. }
        ));
        assert!(matches!(
            check(params(1.0, 0.0, f64::NAN)),
            LayoutError::RotationOutOfRange { .. }
        ));
        assert!(matches!(
            check(LayoutParameters {
                gcr: f64::NAN,
                ..params(1.0, 0.0, 0.0)
            }),
            LayoutError::GcrOutOfRange { .. }
        ));
        for tilt in [f64::NAN, f64::INFINITY] {
            assert!(matches!(
                check(LayoutParameters {
                    slope: TerrainSlope::new(180.0, tilt),
                    ..params(1.0, 0.0, 0.0)
                }),
                LayoutError::NegativeSlopeTilt { .. }
            ));
        }
        assert!(matches!(
            generate_field_layout(&params(1.0, 0.0, 0.0), AREA, f64::NAN)
                .unwrap_err(),
            LayoutError::MinSpacingTooSmall { .. }
        ));
    }

    #[test]
    fn test_max_shading_elevation() {
        let layout =
            generate_field_layout(&params(1.0, 0.0, 170.0), AREA, MIN_SPACING)
                .unwrap();
        // Nearest neighbors are sqrt(32) away
        let expected = (MIN_SPACING / 32f64.sqrt()).asin().to_degrees();
        assert_approx_eq!(
            max_shading_elevation(MIN_SPACING, &layout.neighbors),
            expected
        );
        assert_eq!(max_shading_elevation(MIN_SPACING, &[]), 0.0);

        // A neighbor closer than the min spacing can always shade
        let close = NeighborRecord::new(1.0, 0.0, TerrainSlope::FLAT);
        assert_eq!(max_shading_elevation(MIN_SPACING, &[close]), 90.0);
    }
}
