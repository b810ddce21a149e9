pub mod layout;
pub mod shading;

use crate::{
    config::{FieldConfig, LayoutType, TerrainSlope},
    field::{
        layout::{
            generate_field_layout, max_shading_elevation, LayoutParameters,
            NeighborRecord, PlausibilityWarning,
        },
        shading::{ShadingObserver, ShadingScene, SolarPosition},
    },
    geometry::{self, CollectorConfig, Footprint, GeometryError},
    timed,
};
use anyhow::{bail, Context};
use geo::MultiPolygon;
use indexmap::IndexMap;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::hash::Hash;
use validator::Validate;

/// A regular field of identical two-axis trackers. The field is built once
/// from a config and a collector shape, which generates and validates the
/// neighborhood of the reference tracker. After that it's immutable, and can
/// be evaluated for any number of sun positions (in parallel, if you like).
///
/// `G` is the polygon type used for the collector geometry. The default is
/// [geo]'s multipolygon, but anything that implements [Footprint] works.
#[derive(Clone, Debug)]
pub struct TrackerField<G = MultiPolygon<f64>> {
    /// The config used to build this field. Building is deterministic based
    /// on config and geometry, so this is never modified afterwards.
    config: FieldConfig,
    layout: LayoutParameters,
    total_geometry: G,
    active_geometry: G,
    min_tracker_spacing: f64,
    max_shading_elevation: f64,
    neighbors: Vec<NeighborRecord>,
    warnings: Vec<PlausibilityWarning>,
}

impl TrackerField {
    /// Build a field from a serializable collector definition, using the
    /// default polygon kernel.
    pub fn from_collector(
        config: FieldConfig,
        collector: &CollectorConfig,
    ) -> anyhow::Result<Self> {
        Self::new(
            config,
            collector.total_geometry(),
            collector.active_geometry(),
        )
    }
}

impl<G: Footprint> TrackerField<G> {
    /// Relative tolerance for the active geometry poking out of the total
    /// geometry, to absorb rounding in the boolean ops
    const CONTAINMENT_TOLERANCE: f64 = 1e-9;

    /// Build a new field. `total_geometry` is the outline of one whole
    /// collector and `active_geometry` is the part of it whose shading we
    /// care about. Returns an error if the config is invalid, if the
    /// geometries aren't usable, or if the layout is infeasible. The
    /// underlying error can be recovered with [anyhow::Error::downcast] as a
    /// [validator::ValidationErrors], [GeometryError] or
    /// [LayoutError](crate::LayoutError).
    pub fn new(
        config: FieldConfig,
        total_geometry: G,
        active_geometry: G,
    ) -> anyhow::Result<Self> {
        info!("Building tracker field with config {:#?}", config);

        config.validate().context("invalid field config")?;
        check_geometry("total", &total_geometry)?;
        check_geometry("active", &active_geometry)?;
        let total_area = total_geometry.area();
        let excess = active_geometry.difference(&total_geometry).area();
        if excess > Self::CONTAINMENT_TOLERANCE * total_area {
            bail!(GeometryError::ActiveOutsideTotal { excess });
        }

        let min_tracker_spacing = match config.min_tracker_spacing {
            Some(min_tracker_spacing) => min_tracker_spacing,
            None => geometry::min_tracker_spacing(&total_geometry),
        };
        debug!(
            "Collector area {}, min tracker spacing {}",
            total_area, min_tracker_spacing
        );

        let layout = LayoutParameters::from_config(&config)
            .context("invalid field layout")?;
        let field_layout = timed!(
            "Field layout generation",
            generate_field_layout(&layout, total_area, min_tracker_spacing)
        )
        .context("invalid field layout")?;
        for warning in &field_layout.warnings {
            warn!("{}", warning);
        }

        let max_shading_elevation = match config.max_shading_elevation {
            Some(max_shading_elevation) => max_shading_elevation,
            None => max_shading_elevation(
                min_tracker_spacing,
                &field_layout.neighbors,
            ),
        };
        debug!("Max shading elevation {}", max_shading_elevation);

        Ok(Self {
            config,
            layout,
            total_geometry,
            active_geometry,
            min_tracker_spacing,
            max_shading_elevation,
            neighbors: field_layout.neighbors,
            warnings: field_layout.warnings,
        })
    }

    /// Get a reference to the config that defines this field.
    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    /// The resolved layout parameters, whether they came from a layout type
    /// or were given explicitly
    pub fn layout(&self) -> &LayoutParameters {
        &self.layout
    }

    pub fn layout_type(&self) -> Option<LayoutType> {
        self.layout.layout_type
    }

    pub fn gcr(&self) -> f64 {
        self.layout.gcr
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.layout.aspect_ratio
    }

    pub fn offset(&self) -> f64 {
        self.layout.offset
    }

    pub fn rotation(&self) -> f64 {
        self.layout.rotation
    }

    pub fn slope(&self) -> TerrainSlope {
        self.layout.slope
    }

    pub fn total_geometry(&self) -> &G {
        &self.total_geometry
    }

    pub fn active_geometry(&self) -> &G {
        &self.active_geometry
    }

    /// Minimum distance between two tracker centers, either from the config
    /// or derived from the collector geometry
    pub fn min_tracker_spacing(&self) -> f64 {
        self.min_tracker_spacing
    }

    /// Sun elevation above which every evaluation returns 0
    pub fn max_shading_elevation(&self) -> f64 {
        self.max_shading_elevation
    }

    /// Every neighbor of the reference tracker. See
    /// [generate_field_layout] for the ordering.
    pub fn neighbors(&self) -> &[NeighborRecord] {
        &self.neighbors
    }

    /// Non-fatal problems found while building the field
    pub fn warnings(&self) -> &[PlausibilityWarning] {
        &self.warnings
    }

    fn scene(&self) -> ShadingScene<'_, G> {
        ShadingScene {
            total_geometry: &self.total_geometry,
            active_geometry: &self.active_geometry,
            min_tracker_spacing: self.min_tracker_spacing,
            neighbors: &self.neighbors,
            slope: self.layout.slope,
            max_shading_elevation: self.max_shading_elevation,
        }
    }

    /// Fraction of the active collector area that's shaded when the sun is
    /// at the given position (degrees). `NaN` if the sun is below the
    /// horizon.
    pub fn shaded_fraction(&self, elevation: f64, azimuth: f64) -> f64 {
        self.scene()
            .shaded_fraction(SolarPosition::new(elevation, azimuth))
    }

    /// Evaluate a single sun position, and hand the resulting geometry to an
    /// observer (e.g. to draw the shadows).
    pub fn shaded_fraction_with(
        &self,
        sun: SolarPosition,
        observer: &mut dyn ShadingObserver<G>,
    ) -> f64 {
        self.scene().shaded_fraction_observed(sun, observer)
    }

    /// Evaluate a batch of sun positions, given as matching sequences of
    /// elevations and azimuths. Every sample is independent, so they're
    /// evaluated in parallel. Returns an error if the sequences have
    /// different lengths.
    pub fn shaded_fractions(
        &self,
        elevations: &[f64],
        azimuths: &[f64],
    ) -> anyhow::Result<Vec<f64>> {
        if elevations.len() != azimuths.len() {
            bail!(
                "got {} solar elevations but {} solar azimuths",
                elevations.len(),
                azimuths.len()
            );
        }
        let scene = self.scene();
        Ok(timed!(
            format!("Shading {} samples", elevations.len()),
            elevations
                .par_iter()
                .zip(azimuths)
                .map(|(&elevation, &azimuth)| {
                    scene.shaded_fraction(SolarPosition::new(elevation, azimuth))
                })
                .collect::<Vec<f64>>()
        ))
    }

    /// Evaluate a batch of sun positions. The output is in the same order as
    /// the input.
    pub fn shaded_fraction_positions(
        &self,
        positions: &[SolarPosition],
    ) -> Vec<f64> {
        let scene = self.scene();
        timed!(
            format!("Shading {} samples", positions.len()),
            positions
                .par_iter()
                .map(|&sun| scene.shaded_fraction(sun))
                .collect::<Vec<f64>>()
        )
    }

    /// Evaluate a labeled series of sun positions, e.g. keyed by timestamp.
    /// The output has the same labels in the same order.
    pub fn shaded_fraction_series<K>(
        &self,
        series: &IndexMap<K, SolarPosition>,
    ) -> IndexMap<K, f64>
    where
        K: Clone + Eq + Hash + Send + Sync,
    {
        let scene = self.scene();
        let fractions: Vec<f64> = timed!(
            format!("Shading {} samples", series.len()),
            series
                .par_values()
                .map(|&sun| scene.shaded_fraction(sun))
                .collect()
        );
        series.keys().cloned().zip(fractions).collect()
    }

    /// A serializable description of the generated field
    pub fn summary(&self) -> FieldSummary<'_> {
        FieldSummary {
            layout: &self.layout,
            min_tracker_spacing: self.min_tracker_spacing,
            max_shading_elevation: self.max_shading_elevation,
            neighbors: &self.neighbors,
            warnings: self
                .warnings
                .iter()
                .map(|warning| warning.to_string())
                .collect(),
        }
    }

    /// Serialize the field summary into JSON.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> String {
        // Panic here indicates an internal bug in the data format
        serde_json::to_string_pretty(&self.summary())
            .expect("error serializing field")
    }
}

fn check_geometry(
    name: &'static str,
    geometry: &impl Footprint,
) -> Result<(), GeometryError> {
    if !geometry.is_valid() {
        return Err(GeometryError::Invalid { name });
    }
    if geometry.area() <= 0.0 {
        return Err(GeometryError::ZeroArea { name });
    }
    Ok(())
}

/// Everything that was derived while building a [TrackerField]. This is the
/// format of the field report.
#[derive(Clone, Debug, Serialize)]
pub struct FieldSummary<'a> {
    pub layout: &'a LayoutParameters,
    pub min_tracker_spacing: f64,
    pub max_shading_elevation: f64,
    pub neighbors: &'a [NeighborRecord],
    pub warnings: Vec<String>,
}
