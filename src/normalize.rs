//! Geometry normalization: parse, repair, and stamp stable ordinals.

use geo::{BooleanOps, Geometry, GeometryCollection, MultiPolygon, Validation};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::Result;
use crate::feature::FeatureSet;
use crate::geojson_io::{parse_feature_set, parse_feature_set_str};

/// Property holding a feature's position in the originating set.
pub const ID: &str = "id";

/// Parse a GeoJSON feature collection and normalize it.
pub fn ingest(value: &Value) -> Result<FeatureSet> {
    Ok(normalize(parse_feature_set(value)?))
}

/// Like [`ingest`], from text.
pub fn ingest_str(text: &str) -> Result<FeatureSet> {
    Ok(normalize(parse_feature_set_str(text)?))
}

/// Repair every invalid geometry and (over)write each feature's `id` ordinal.
pub fn normalize(mut set: FeatureSet) -> FeatureSet {
    let mut repaired = 0;
    for (index, feature) in set.features.iter_mut().enumerate() {
        if !feature.geometry.is_valid() {
            trace!("repairing feature {index}");
            let geometry = std::mem::replace(&mut feature.geometry, empty());
            feature.geometry = repair(geometry);
            repaired += 1;
        }
        feature.properties.insert(ID.to_string(), index.into());
    }
    debug!("normalized {} features, repaired {}", set.len(), repaired);
    set
}

/// Return a valid equivalent of `geometry`. Valid input is returned untouched.
///
/// Areal geometries are rebuilt by a boolean union against nothing, which
/// resolves self-intersections the same way a zero-width buffer does.
/// Non-areal kinds have no such repair and come back unchanged.
pub fn repair(geometry: Geometry<f64>) -> Geometry<f64> {
    if geometry.is_valid() {
        return geometry;
    }
    match geometry {
        Geometry::Polygon(polygon) => polygonal(zero_buffer(&MultiPolygon::new(vec![polygon]))),
        Geometry::MultiPolygon(polygons) => polygonal(zero_buffer(&polygons)),
        Geometry::Rect(rect) => Geometry::Polygon(rect.to_polygon()),
        Geometry::Triangle(triangle) => polygonal(zero_buffer(&MultiPolygon::new(vec![triangle.to_polygon()]))),
        Geometry::GeometryCollection(members) => Geometry::GeometryCollection(GeometryCollection(
            members.into_iter().map(repair).collect(),
        )),
        other => other,
    }
}

pub(crate) fn zero_buffer(polygons: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    polygons.union(&MultiPolygon::new(vec![]))
}

/// A single polygon stays a `Polygon`; anything else is a `MultiPolygon`.
pub(crate) fn polygonal(mut polygons: MultiPolygon<f64>) -> Geometry<f64> {
    match polygons.0.len() {
        1 => Geometry::Polygon(polygons.0.remove(0)),
        _ => Geometry::MultiPolygon(polygons),
    }
}

fn empty() -> Geometry<f64> {
    Geometry::GeometryCollection(GeometryCollection(vec![]))
}
