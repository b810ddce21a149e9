use crate::{
    geometry::Footprint,
    render::{unit::Color3, FieldRenderer, ShadingRecording},
    TrackerField,
};
use geo::{BoundingRect, LineString, MultiPolygon};
use svg::{
    node::{
        element::{path::Data, Circle, Group, Path},
        Comment,
    },
    Document,
};

const OUTLINE_COLOR: Color3 = Color3::new_int(64, 64, 64);
const SHADED_COLOR: Color3 = Color3::new_int(90, 90, 110);
const UNSHADED_COLOR: Color3 = Color3::new_int(250, 220, 90);
const SHADOW_COLOR: Color3 = Color3::new_int(20, 20, 20);

/// Build an empty document for the given ground-plane bounds. SVG has y
/// pointing down, so the returned group flips y back to pointing north. All
/// content should be added to that group.
fn document(
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
    margin: f64,
) -> (Document, Group) {
    let document = Document::new().set(
        "viewBox",
        (
            // Top-left corner, after the flip
            min_x - margin,
            -max_y - margin,
            // Width and height
            max_x - min_x + 2.0 * margin,
            max_y - min_y + 2.0 * margin,
        ),
    );
    let group = Group::new().set("transform", "scale(1 -1)");
    (document, group)
}

/// Render a field layout as an SVG. This is a top-down view of the ground
/// plane around the reference tracker.
pub fn layout_to_svg<G: Footprint>(
    field: &TrackerField<G>,
    renderer: &FieldRenderer,
) -> Document {
    let config = renderer.render_config();
    let radius = field.min_tracker_spacing() / 2.0;
    let neighbors = field.neighbors();
    let max_height = neighbors
        .iter()
        .map(|neighbor| neighbor.z.abs())
        .fold(0.0, f64::max);

    // The reference tracker sits at the origin, so start the bounds there
    let bounds = neighbors.iter().fold(
        (-radius, -radius, radius, radius),
        |(min_x, min_y, max_x, max_y), neighbor| {
            (
                min_x.min(neighbor.x - radius),
                min_y.min(neighbor.y - radius),
                max_x.max(neighbor.x + radius),
                max_y.max(neighbor.y + radius),
            )
        },
    );
    let (document, mut group) = document(bounds, config.margin);
    let document =
        document.add(Comment::new(format!("\n{:#?}\n", field.config())));

    let circle = |x: f64, y: f64, color: Color3| {
        Circle::new()
            .set("cx", x)
            .set("cy", y)
            .set("r", radius)
            .set("fill", color.to_html())
            .set("stroke", OUTLINE_COLOR.to_html())
            .set("stroke-width", config.stroke_width)
    };
    group = group.add(circle(0.0, 0.0, FieldRenderer::REFERENCE_COLOR));
    for (i, neighbor) in neighbors.iter().enumerate() {
        group = group
            .add(Comment::new(format!(
                "neighbor {}: distance {:.3}, azimuth {:.2}",
                i, neighbor.distance, neighbor.relative_azimuth
            )))
            .add(circle(
                neighbor.x,
                neighbor.y,
                renderer.neighbor_color(neighbor, max_height),
            ));
    }

    document.add(group)
}

/// Render one shading evaluation as an SVG. This is a view of the reference
/// collector plane, looking back at the sun.
pub fn shading_to_svg(
    field: &TrackerField,
    recording: &ShadingRecording<MultiPolygon<f64>>,
    fraction: f64,
    renderer: &FieldRenderer,
) -> Document {
    let config = renderer.render_config();
    let bounds = match field.total_geometry().bounding_rect() {
        Some(rect) => (rect.min().x, rect.min().y, rect.max().x, rect.max().y),
        None => (0.0, 0.0, 0.0, 0.0),
    };
    let (document, mut group) = document(bounds, config.margin);
    let document = document.add(Comment::new(format!(
        "sun elevation {}, azimuth {}: shaded fraction {}",
        recording.sun.elevation, recording.sun.azimuth, fraction
    )));

    // Draw the whole active area as shaded, then paint the unshaded part
    // back on top of it. With the sun down there's no shading to show, so
    // only the outlines are drawn.
    if !fraction.is_nan() {
        group = group
            .add(
                multipolygon_path(&recording.active)
                    .set("class", "active")
                    .set("fill", SHADED_COLOR.to_html()),
            )
            .add(
                multipolygon_path(&recording.unshaded)
                    .set("class", "unshaded")
                    .set("fill", UNSHADED_COLOR.to_html()),
            );
    }
    group = group.add(
        multipolygon_path(field.total_geometry())
            .set("fill", "none")
            .set("stroke", OUTLINE_COLOR.to_html())
            .set("stroke-width", config.stroke_width),
    );

    if config.show_shadows {
        for shadow in &recording.shadows {
            group = group.add(
                multipolygon_path(shadow)
                    .set("class", "shadow")
                    .set("fill", "none")
                    .set("stroke", SHADOW_COLOR.to_html())
                    .set("stroke-width", config.stroke_width)
                    .set("stroke-dasharray", "0.2 0.1"),
            );
        }
    }

    document.add(group)
}

/// Convert a multipolygon into a single path. Holes are handled by the
/// even-odd fill rule.
fn multipolygon_path(geometry: &MultiPolygon<f64>) -> Path {
    let rings = geometry.iter().flat_map(|polygon| {
        std::iter::once(polygon.exterior()).chain(polygon.interiors())
    });
    let data = rings.fold(Data::new(), add_ring);
    Path::new().set("fill-rule", "evenodd").set("d", data)
}

fn add_ring(data: Data, ring: &LineString<f64>) -> Data {
    // Path data is single precision
    let mut coords = ring.coords().map(|coord| (coord.x as f32, coord.y as f32));
    match coords.next() {
        Some(first) => coords
            .fold(data.move_to(first), |data, coord| data.line_to(coord))
            .close(),
        None => data,
    }
}
