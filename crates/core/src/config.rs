use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use validator::Validate;

/// Configuration that defines a tracker field. Two fields built from the same
/// config and collector geometry will always be identical.
///
/// The field layout can be given either as a named [LayoutType] **or** by
/// the three individual layout parameters `aspect_ratio`, `offset` and
/// `rotation`. Mixing the two is an error.
///
/// All lengths are in whatever unit the collector geometry uses. All angles
/// are in degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FieldConfig {
    /// Ground cover ratio: collector area divided by the ground area allotted
    /// to each tracker. The upper bound depends on the collector geometry and
    /// the layout, so it's checked during layout generation.
    pub gcr: f64,

    /// Number of rings of neighbors around the reference tracker to consider.
    /// 1 means only the 8 directly adjacent trackers.
    #[validate(range(min = 1, max = 50))]
    pub neighbor_order: u16,

    /// Name of a standard layout. See [LayoutType] for the options.
    pub layout_type: Option<String>,

    /// Ratio of the spacing in the primary direction to the spacing in the
    /// secondary direction.
    pub aspect_ratio: Option<f64>,

    /// Relative row offset in the secondary direction, as a fraction of the
    /// secondary spacing. `-0.5 <= offset < 0.5`
    pub offset: Option<f64>,

    /// Counterclockwise rotation of the whole field. `0 <= rotation < 180`
    pub rotation: Option<f64>,

    /// Minimum distance between the centers of two trackers. If not given,
    /// this is derived from the collector geometry (diameter of the smallest
    /// circle containing the total collector area).
    #[validate(range(min = 0.0))]
    pub min_tracker_spacing: Option<f64>,

    /// Solar elevation above which no shading can occur, so the shaded
    /// fraction is 0 without any polygon work. If not given, this is derived
    /// from the layout.
    #[validate(range(min = 0.0, max = 90.0))]
    pub max_shading_elevation: Option<f64>,

    /// Tilt of the terrain the field is built on
    // Tables go last so the config can be written as TOML
    pub slope: TerrainSlope,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            gcr: 0.25,
            neighbor_order: 1,
            layout_type: Some(LayoutType::Square.to_string()),
            aspect_ratio: None,
            offset: None,
            rotation: None,
            slope: TerrainSlope::default(),
            min_tracker_spacing: None,
            max_shading_elevation: None,
        }
    }
}

/// Direction and steepness of a (planar) terrain slope. The default is flat
/// ground.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSlope {
    /// Compass direction of the horizontal projection of the slope normal,
    /// i.e. the direction the slope faces. `0 <= azimuth < 360`
    pub azimuth: f64,

    /// Angle between the slope and the horizontal plane. Must be positive.
    pub tilt: f64,
}

impl TerrainSlope {
    /// Slopes steeper than this are accepted, but flagged as implausible
    pub const PLAUSIBLE_TILT_LIMIT: f64 = 20.0;

    pub const FLAT: Self = Self {
        azimuth: 0.0,
        tilt: 0.0,
    };

    pub fn new(azimuth: f64, tilt: f64) -> Self {
        Self { azimuth, tilt }
    }
}

/// Standard field layouts, which are fully defined by the ground cover ratio.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LayoutType {
    /// Square grid aligned with north-south
    #[strum(to_string = "square")]
    Square,
    /// The square layout rotated 45 degrees
    #[strum(to_string = "diagonal")]
    Diagonal,
    /// Hexagonal grid with rows running north-south
    #[strum(to_string = "hexagonal_n_s")]
    #[serde(rename = "hexagonal_n_s")]
    HexagonalNorthSouth,
    /// The north-south hexagonal layout rotated 90 degrees
    #[strum(to_string = "hexagonal_e_w")]
    #[serde(rename = "hexagonal_e_w")]
    HexagonalEastWest,
}

impl LayoutType {
    /// Get the `(aspect_ratio, offset, rotation)` that defines this layout
    pub fn parameters(self) -> (f64, f64, f64) {
        // sqrt(3)/2, which is the row spacing of a unit hexagonal grid
        let hex_aspect_ratio = 3f64.sqrt() / 2.0;
        match self {
            Self::Square => (1.0, 0.0, 0.0),
            Self::Diagonal => (1.0, 0.0, 45.0),
            Self::HexagonalNorthSouth => (hex_aspect_ratio, -0.5, 0.0),
            Self::HexagonalEastWest => (hex_aspect_ratio, -0.5, 90.0),
        }
    }

    /// Comma-separated list of every layout type name, for error messages
    pub fn names() -> String {
        Self::iter()
            .map(|layout_type| layout_type.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{assert_tokens, Token};
    use std::str::FromStr;

    #[test]
    fn test_layout_type_names() {
        assert_eq!(
            LayoutType::from_str("hexagonal_n_s").unwrap(),
            LayoutType::HexagonalNorthSouth
        );
        assert_eq!(LayoutType::HexagonalEastWest.to_string(), "hexagonal_e_w");
        assert!(LayoutType::from_str("hexagonal").is_err());
        assert_eq!(
            LayoutType::names(),
            "square, diagonal, hexagonal_n_s, hexagonal_e_w"
        );
    }

    #[test]
    fn test_layout_type_serde() {
        assert_tokens(
            &LayoutType::Diagonal,
            &[Token::UnitVariant {
                name: "LayoutType",
                variant: "diagonal",
            }],
        );
        assert_tokens(
            &LayoutType::HexagonalEastWest,
            &[Token::UnitVariant {
                name: "LayoutType",
                variant: "hexagonal_e_w",
            }],
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(FieldConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_partial_json() {
        // Missing fields fall back to the defaults
        let config: FieldConfig = serde_json::from_str(
            r#"{"gcr": 0.3, "layout_type": null, "aspect_ratio": 1.2,
                "offset": 0.1, "rotation": 10, "slope": {"tilt": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.gcr, 0.3);
        assert_eq!(config.neighbor_order, 1);
        assert_eq!(config.layout_type, None);
        assert_eq!(config.rotation, Some(10.0));
        assert_eq!(config.slope, TerrainSlope::new(0.0, 5.0));
    }
}
