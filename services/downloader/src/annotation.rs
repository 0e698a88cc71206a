//! Georeference annotation parsing and generation.
//!
//! Handles the subset of the Georeference Annotation format the pipeline
//! needs: the image the map is drawn on, the SVG selector polygon used as
//! resource mask, and ground control points as GeoJSON point features with a
//! `resourceCoords` property. The transformation block is carried through
//! unchanged.

use std::sync::OnceLock;

use iiif_common::{GeoreferencedMap, GroundControlPoint, ImageResource, PixelPoint, Provenance};
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::error::AnnotationError;

pub const GEOREF_CONTEXT: &str = "http://iiif.io/api/extension/georef/1/context.json";
pub const PRESENTATION_CONTEXT: &str = "http://iiif.io/api/presentation/3/context.json";

fn points_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"points\s*=\s*"([^"]*)""#).expect("valid regex"))
}

fn svg_width_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"<svg[^>]*\swidth\s*=\s*"(\d+)""#).expect("valid regex"))
}

fn svg_height_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"<svg[^>]*\sheight\s*=\s*"(\d+)""#).expect("valid regex"))
}

fn invalid(message: impl Into<String>) -> AnnotationError {
    AnnotationError(message.into())
}

/// Parse an `Annotation` or `AnnotationPage` into its maps, in order.
pub fn parse_annotation(value: &Value) -> Result<Vec<GeoreferencedMap>, AnnotationError> {
    match value.get("type").and_then(Value::as_str) {
        Some("AnnotationPage") => value
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("annotation page without items"))?
            .iter()
            .map(parse_single)
            .collect(),
        Some("Annotation") | None => Ok(vec![parse_single(value)?]),
        Some(other) => Err(invalid(format!("unexpected type {}", other))),
    }
}

fn parse_single(value: &Value) -> Result<GeoreferencedMap, AnnotationError> {
    let id = value
        .get("id")
        .or_else(|| value.get("@id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let target = value
        .get("target")
        .ok_or_else(|| invalid("annotation without target"))?;
    let selector = target
        .get("selector")
        .and_then(|s| s.get("value"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    let resource = parse_resource(target, selector)?;
    let resource_mask = parse_mask(selector)?;

    let body = value.get("body").unwrap_or(&Value::Null);
    let gcps = body
        .get("features")
        .and_then(Value::as_array)
        .map(|features| features.iter().map(parse_gcp).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();

    Ok(GeoreferencedMap {
        id,
        resource,
        gcps,
        resource_mask,
        transformation: body.get("transformation").cloned(),
    })
}

fn parse_resource(target: &Value, selector: &str) -> Result<ImageResource, AnnotationError> {
    let source = target
        .get("source")
        .ok_or_else(|| invalid("target without source"))?;

    // older annotations give the source as a plain URI with a separate service
    let (id, resource_type, width, height) = match source {
        Value::String(uri) => {
            let service = target
                .get("service")
                .and_then(Value::as_array)
                .and_then(|services| services.first());
            let id = service
                .and_then(|s| s.get("@id").or_else(|| s.get("id")))
                .and_then(Value::as_str)
                .unwrap_or(uri);
            let resource_type = service
                .and_then(|s| s.get("type").or_else(|| s.get("@type")))
                .and_then(Value::as_str);
            (id.to_string(), resource_type, None, None)
        }
        Value::Object(_) => {
            let id = source
                .get("id")
                .or_else(|| source.get("@id"))
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("source without id"))?;
            (
                id.to_string(),
                source.get("type").and_then(Value::as_str),
                source.get("width").and_then(Value::as_u64),
                source.get("height").and_then(Value::as_u64),
            )
        }
        _ => return Err(invalid("source is neither a URI nor an object")),
    };

    let svg_dimension = |pattern: &Regex| {
        pattern
            .captures(selector)
            .and_then(|c| c[1].parse::<u64>().ok())
    };
    let width = width
        .or_else(|| svg_dimension(svg_width_pattern()))
        .ok_or_else(|| invalid(format!("no width for {}", id)))?;
    let height = height
        .or_else(|| svg_dimension(svg_height_pattern()))
        .ok_or_else(|| invalid(format!("no height for {}", id)))?;

    Ok(ImageResource {
        id: id.trim_end_matches('/').to_string(),
        resource_type: resource_type.unwrap_or("ImageService2").to_string(),
        width,
        height,
    })
}

fn parse_mask(selector: &str) -> Result<Vec<PixelPoint>, AnnotationError> {
    let Some(captures) = points_pattern().captures(selector) else {
        return Ok(Vec::new());
    };

    captures[1]
        .split_whitespace()
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| invalid(format!("bad mask point {}", pair)))?;
            let x = x.trim().parse::<f64>().map_err(|_| invalid(format!("bad x in {}", pair)))?;
            let y = y.trim().parse::<f64>().map_err(|_| invalid(format!("bad y in {}", pair)))?;
            Ok(PixelPoint::new(x, y))
        })
        .collect()
}

fn parse_pair(value: Option<&Value>) -> Option<[f64; 2]> {
    let values = value?.as_array()?;
    match values.as_slice() {
        [a, b, ..] => Some([a.as_f64()?, b.as_f64()?]),
        _ => None,
    }
}

fn parse_gcp(feature: &Value) -> Result<GroundControlPoint, AnnotationError> {
    let properties = feature.get("properties");
    let resource = parse_pair(
        properties
            .and_then(|p| p.get("resourceCoords").or_else(|| p.get("pixelCoords"))),
    )
    .ok_or_else(|| invalid("feature without resourceCoords"))?;
    let geo = parse_pair(feature.get("geometry").and_then(|g| g.get("coordinates")))
        .ok_or_else(|| invalid("feature without point coordinates"))?;

    Ok(GroundControlPoint {
        resource: resource.into(),
        geo,
    })
}

/// Emit integral coordinates as JSON integers.
fn coordinate(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

fn format_coordinate(value: f64) -> String {
    coordinate(value).to_string()
}

fn svg_selector(map: &GeoreferencedMap) -> String {
    let points: Vec<String> = map
        .resource_mask
        .iter()
        .map(|p| format!("{},{}", format_coordinate(p.x), format_coordinate(p.y)))
        .collect();

    format!(
        r#"<svg width="{}" height="{}"><polygon points="{}" /></svg>"#,
        map.resource.width,
        map.resource.height,
        points.join(" ")
    )
}

/// Generate a Georeference Annotation for `map`.
pub fn generate_annotation(map: &GeoreferencedMap) -> Value {
    let features: Vec<Value> = map
        .gcps
        .iter()
        .map(|gcp| {
            json!({
                "type": "Feature",
                "properties": {
                    "resourceCoords": [coordinate(gcp.resource.x), coordinate(gcp.resource.y)]
                },
                "geometry": {
                    "type": "Point",
                    "coordinates": gcp.geo
                }
            })
        })
        .collect();

    let mut body = json!({
        "type": "FeatureCollection",
        "features": features
    });
    if let Some(transformation) = &map.transformation {
        body["transformation"] = transformation.clone();
    }

    let mut annotation = json!({
        "@context": [GEOREF_CONTEXT, PRESENTATION_CONTEXT],
        "type": "Annotation",
        "motivation": "georeferencing",
        "target": {
            "type": "SpecificResource",
            "source": {
                "id": map.resource.id,
                "type": map.resource.resource_type,
                "width": map.resource.width,
                "height": map.resource.height
            },
            "selector": {
                "type": "SvgSelector",
                "value": svg_selector(map)
            }
        },
        "body": body
    });
    if let Some(id) = &map.id {
        annotation["id"] = json!(id);
    }

    annotation
}

/// Merge the provenance fields into the top level of a generated annotation.
pub fn with_provenance(annotation: Value, provenance: &Provenance) -> Value {
    let mut object = match annotation {
        Value::Object(object) => object,
        other => {
            let mut object = Map::new();
            object.insert("annotation".to_string(), other);
            object
        }
    };

    if let Ok(Value::Object(fields)) = serde_json::to_value(provenance) {
        object.extend(fields);
    }

    Value::Object(object)
}

/// The map a single-map URL refers to: the one whose id ends in
/// `/maps/{map_id}`, else the first.
pub fn select_map(maps: Vec<GeoreferencedMap>, map_id: &str) -> Option<GeoreferencedMap> {
    let suffix = format!("/maps/{}", map_id);
    let position = maps
        .iter()
        .position(|m| m.id.as_deref().is_some_and(|id| id.ends_with(&suffix)))
        .unwrap_or(0);

    maps.into_iter().nth(position)
}
