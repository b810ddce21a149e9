pub mod config;
mod svg;
pub mod unit;

pub use crate::render::config::RenderConfig;

use crate::{
    field::{
        layout::NeighborRecord,
        shading::{ShadingObserver, SolarPosition},
    },
    geometry::Footprint,
    render::unit::Color3,
    TrackerField,
};
use geo::MultiPolygon;
use log::debug;
use validator::Validate;

/// A field renderer is used to draw tracker fields as SVG. A renderer is
/// created using a particular [RenderConfig], and from there can be used to
/// render any number of fields any number of times.
///
/// Config options cannot be changed after creating a renderer, but renderers
/// are very cheap to create so if you need to change the config, just create
/// a new renderer.
#[derive(Clone, Debug)]
pub struct FieldRenderer {
    /// Config that determines how rendering is done
    render_config: RenderConfig,
}

impl FieldRenderer {
    const REFERENCE_COLOR: Color3 = Color3::new_int(240, 170, 30);
    const HIGH_COLOR: Color3 = Color3::new_int(200, 40, 40);
    const LOW_COLOR: Color3 = Color3::new_int(40, 80, 200);

    /// Initialize a new renderer with the given options. Returns an error if
    /// the render config is invalid.
    pub fn new(render_config: RenderConfig) -> anyhow::Result<Self> {
        render_config.validate()?;
        Ok(Self { render_config })
    }

    /// Get a reference to the config that this renderer uses
    pub fn render_config(&self) -> &RenderConfig {
        &self.render_config
    }

    /// Color of a neighbor, based on its height relative to the reference
    /// tracker. Higher neighbors are red, lower ones are blue, and neighbors
    /// at the same height are white. `max_height` is the largest absolute
    /// height difference in the field.
    pub fn neighbor_color(
        &self,
        neighbor: &NeighborRecord,
        max_height: f64,
    ) -> Color3 {
        if max_height <= 0.0 {
            return Color3::WHITE;
        }
        let t = (neighbor.z / max_height) as f32;
        if t >= 0.0 {
            Color3::WHITE.lerp(Self::HIGH_COLOR, t)
        } else {
            Color3::WHITE.lerp(Self::LOW_COLOR, -t)
        }
    }

    /// Render the field layout as a top-down SVG. Every tracker is drawn as a
    /// circle with a diameter of the minimum tracker spacing, so touching
    /// circles mean the trackers could touch. Returns the SVG in a string.
    pub fn render_layout_svg<G: Footprint>(
        &self,
        field: &TrackerField<G>,
    ) -> String {
        svg::layout_to_svg(field, self).to_string()
    }

    /// Evaluate the shading for one sun position and render the collector
    /// plane as an SVG: the unshaded part of the active area, and (if
    /// enabled) every shadow that was cut out of it. Returns the shaded
    /// fraction alongside the SVG.
    pub fn render_shading_svg(
        &self,
        field: &TrackerField,
        sun: SolarPosition,
    ) -> (f64, String) {
        let mut recorder = ShadowRecorder::default();
        let fraction = field.shaded_fraction_with(sun, &mut recorder);
        let recording = recorder.recording.unwrap_or_else(|| {
            // The result was decided without any polygon work, so the active
            // area is untouched, completely shaded, or undefined (sun down)
            debug!("No shading geometry for {:?}, fraction {}", sun, fraction);
            let unshaded = if fraction == 0.0 {
                field.active_geometry().clone()
            } else {
                MultiPolygon::new(Vec::new())
            };
            ShadingRecording {
                sun,
                active: field.active_geometry().clone(),
                unshaded,
                shadows: Vec::new(),
            }
        });
        let document =
            svg::shading_to_svg(field, &recording, fraction, self);
        (fraction, document.to_string())
    }
}

/// Geometry captured from a single shading evaluation
#[derive(Clone, Debug)]
pub struct ShadingRecording<G> {
    pub sun: SolarPosition,
    pub active: G,
    pub unshaded: G,
    pub shadows: Vec<G>,
}

/// A [ShadingObserver] that keeps a copy of everything it sees
#[derive(Debug)]
pub struct ShadowRecorder<G> {
    pub recording: Option<ShadingRecording<G>>,
}

// Derive would require G: Default
impl<G> Default for ShadowRecorder<G> {
    fn default() -> Self {
        Self { recording: None }
    }
}

impl<G: Clone> ShadingObserver<G> for ShadowRecorder<G> {
    fn observe(
        &mut self,
        sun: SolarPosition,
        active_geometry: &G,
        unshaded_geometry: &G,
        shadows: &[G],
    ) {
        self.recording = Some(ShadingRecording {
            sun,
            active: active_geometry.clone(),
            unshaded: unshaded_geometry.clone(),
            shadows: shadows.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectorConfig, FieldConfig};

    fn field() -> TrackerField {
        TrackerField::from_collector(
            FieldConfig {
                layout_type: None,
                aspect_ratio: Some(1.0),
                offset: Some(0.0),
                rotation: Some(170.0),
                ..FieldConfig::default()
            },
            &CollectorConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_render_config_validation() {
        let render_config = RenderConfig {
            margin: -1.0,
            ..RenderConfig::default()
        };
        assert!(FieldRenderer::new(render_config).is_err());
    }

    #[test]
    fn test_neighbor_color() {
        let renderer = FieldRenderer::new(RenderConfig::default()).unwrap();
        let neighbor = field().neighbors()[0];
        assert_eq!(renderer.neighbor_color(&neighbor, 0.0), Color3::WHITE);
        let high = NeighborRecord { z: 2.0, ..neighbor };
        assert_eq!(
            renderer.neighbor_color(&high, 2.0),
            FieldRenderer::HIGH_COLOR
        );
        let low = NeighborRecord { z: -1.0, ..neighbor };
        assert_eq!(
            renderer.neighbor_color(&low, 1.0),
            FieldRenderer::LOW_COLOR
        );
    }

    #[test]
    fn test_render_layout() {
        let renderer = FieldRenderer::new(RenderConfig::default()).unwrap();
        let svg = renderer.render_layout_svg(&field());
        // Reference tracker plus 8 neighbors
        assert_eq!(svg.matches("<circle").count(), 9);
    }

    #[test]
    fn test_render_shading() {
        let renderer = FieldRenderer::new(RenderConfig::default()).unwrap();
        let field = field();

        let (fraction, svg) =
            renderer.render_shading_svg(&field, SolarPosition::new(2.0, 120.0));
        assert!(fraction > 0.0 && fraction < 1.0);
        assert!(svg.contains("class=\"shadow\""));
        assert!(svg.contains("class=\"active\""));

        // Terrain horizon, so the whole area is drawn shaded
        let (fraction, svg) =
            renderer.render_shading_svg(&field, SolarPosition::new(0.0, 100.0));
        assert_eq!(fraction, 1.0);
        assert!(svg.contains("class=\"active\""));
        assert!(!svg.contains("class=\"shadow\""));
    }

    #[test]
    fn test_render_shading_sun_down() {
        let renderer = FieldRenderer::new(RenderConfig::default()).unwrap();
        // Nothing is shaded or unshaded, so only the outline is drawn
        let (fraction, svg) = renderer
            .render_shading_svg(&field(), SolarPosition::new(-1.0, 90.0));
        assert!(fraction.is_nan());
        assert!(!svg.contains("class=\"active\""));
        assert!(!svg.contains("class=\"unshaded\""));
        assert!(!svg.contains("class=\"shadow\""));
        assert!(svg.contains("<path"));
    }
}
