use serde::{Deserialize, Serialize};
use validator::Validate;

/// Configuration specific to visually rendering a field. These options have
/// absolutely no bearing on the shading calculation, only on the visual
/// presentation.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RenderConfig {
    /// Empty space around the drawing, in the length unit of the collector
    /// geometry.
    #[validate(range(min = 0.0))]
    pub margin: f64,

    /// Width of polygon outlines, in the length unit of the collector
    /// geometry. 0 disables outlines.
    #[validate(range(min = 0.0))]
    pub stroke_width: f64,

    /// Should the individual shadow outlines be drawn on top of the shaded
    /// area? Only applies to shading renders.
    pub show_shadows: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            margin: 1.0,
            stroke_width: 0.05,
            show_shadows: true,
        }
    }
}
