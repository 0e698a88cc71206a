//! Builders for the JSON documents the pipeline consumes.

use serde_json::{json, Value};

/// An IIIF Image API 2 information document.
///
/// `tiles` holds `(tile_width, tile_height, scale_factors)` entries.
pub fn info_json(id: &str, width: u64, height: u64, tiles: &[(u64, u64, &[u64])]) -> Value {
    let tiles: Vec<Value> = tiles
        .iter()
        .map(|(tile_width, tile_height, scale_factors)| {
            json!({
                "width": tile_width,
                "height": tile_height,
                "scaleFactors": scale_factors,
            })
        })
        .collect();

    json!({
        "@context": "http://iiif.io/api/image/2/context.json",
        "@id": id,
        "protocol": "http://iiif.io/api/image",
        "width": width,
        "height": height,
        "profile": ["http://iiif.io/api/image/2/level2.json"],
        "tiles": tiles,
    })
}

/// A square-tiled information document with the usual power-of-two ladder.
pub fn pyramid_info_json(id: &str, width: u64, height: u64, tile_size: u64) -> Value {
    let mut factors = vec![1u64];
    while tile_size * factors[factors.len() - 1] < width.max(height) {
        let next = factors[factors.len() - 1] * 2;
        factors.push(next);
    }
    info_json(id, width, height, &[(tile_size, tile_size, &factors)])
}

/// An information document without tile information.
pub fn untiled_info_json(id: &str, width: u64, height: u64) -> Value {
    json!({
        "@context": "http://iiif.io/api/image/2/context.json",
        "@id": id,
        "protocol": "http://iiif.io/api/image",
        "width": width,
        "height": height,
        "profile": ["http://iiif.io/api/image/2/level0.json"],
    })
}

/// A georeference annotation for a single map.
///
/// `gcps` holds `([x, y], [lon, lat])` pairs, `mask` the polygon vertices.
pub fn annotation_json(
    annotation_id: &str,
    image_id: &str,
    width: u64,
    height: u64,
    gcps: &[([f64; 2], [f64; 2])],
    mask: &[[f64; 2]],
) -> Value {
    let points: Vec<String> = mask.iter().map(|[x, y]| format!("{},{}", x, y)).collect();
    let selector = format!(
        r#"<svg width="{}" height="{}"><polygon points="{}" /></svg>"#,
        width,
        height,
        points.join(" ")
    );

    let features: Vec<Value> = gcps
        .iter()
        .map(|(resource, geo)| {
            json!({
                "type": "Feature",
                "properties": { "resourceCoords": resource },
                "geometry": { "type": "Point", "coordinates": geo },
            })
        })
        .collect();

    json!({
        "@context": [
            "http://iiif.io/api/extension/georef/1/context.json",
            "http://iiif.io/api/presentation/3/context.json"
        ],
        "id": annotation_id,
        "type": "Annotation",
        "motivation": "georeferencing",
        "target": {
            "type": "SpecificResource",
            "source": {
                "id": image_id,
                "type": "ImageService2",
                "width": width,
                "height": height,
            },
            "selector": { "type": "SvgSelector", "value": selector },
        },
        "body": {
            "type": "FeatureCollection",
            "transformation": { "type": "polynomial", "options": { "order": 1 } },
            "features": features,
        },
    })
}

/// A rectangular mask covering the whole image.
pub fn full_mask(width: u64, height: u64) -> Vec<[f64; 2]> {
    let (w, h) = (width as f64, height as f64);
    vec![[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
}

/// Three ground control points spread over the image.
pub fn sample_gcps(width: u64, height: u64) -> Vec<([f64; 2], [f64; 2])> {
    let (w, h) = (width as f64, height as f64);
    vec![
        ([w * 0.1, h * 0.1], [4.8897, 52.3740]),
        ([w * 0.9, h * 0.1], [4.9412, 52.3731]),
        ([w * 0.5, h * 0.9], [4.9125, 52.3501]),
    ]
}

/// Wrap annotations in an annotation page.
pub fn annotation_page(items: Vec<Value>) -> Value {
    json!({
        "@context": "http://www.w3.org/ns/anno.jsonld",
        "type": "AnnotationPage",
        "items": items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pyramid_info_json_factors() {
        let info = pyramid_info_json("https://example.org/img", 5_000, 3_000, 512);
        assert_eq!(info["tiles"][0]["scaleFactors"], json!([1, 2, 4, 8, 16]));
    }

    #[test]
    fn test_annotation_json_selector() {
        let annotation = annotation_json(
            "https://annotations.example.org/maps/abc",
            "https://example.org/img",
            100,
            50,
            &[],
            &full_mask(100, 50),
        );
        let selector = annotation["target"]["selector"]["value"].as_str().unwrap();
        assert!(selector.contains(r#"points="0,0 100,0 100,50 0,50""#));
    }
}
