//! Solfield models shading between two-axis sun-tracking collectors in a
//! regular field. This crate contains the field layout generation and the
//! shading calculation. Presentation layers are implemented elsewhere (or
//! behind the `svg` feature).
//!
//! ```
//! use solfield::{CollectorConfig, FieldConfig, TrackerField};
//!
//! let config = FieldConfig::default();
//! let field =
//!     TrackerField::from_collector(config, &CollectorConfig::default())
//!         .unwrap();
//! let fractions = field.shaded_fractions(&[5.0, 30.0], &[180.0, 200.0]);
//! println!("{:?}", fractions.unwrap());
//! ```
//!
//! See [FieldConfig] for details on how the field can be customized.

mod config;
mod field;
pub mod geometry;
#[cfg(feature = "svg")]
mod render;
mod util;

pub use crate::{
    config::{FieldConfig, LayoutType, TerrainSlope},
    field::{
        layout::{
            generate_field_layout, max_shading_elevation, FieldLayout,
            LayoutError, LayoutParameters, NeighborRecord,
            PlausibilityWarning,
        },
        shading::{
            horizon_elevation_angle, shadow_offset, ShadingObserver,
            ShadingScene, SolarPosition,
        },
        FieldSummary, TrackerField,
    },
    geometry::{CollectorConfig, Footprint, GeometryError},
    util::{compass_bearing, normalize_degrees},
};
#[cfg(feature = "svg")]
pub use crate::render::{
    unit::Color3, FieldRenderer, RenderConfig, ShadingRecording, ShadowRecorder,
};
