//! Conversion between GeoJSON feature collections and [`FeatureSet`].
//!
//! Geometries are translated by hand so that a malformed coordinate tree is
//! reported against the index of the feature that carries it.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use geojson::{Geometry as GeoJsonGeometry, Value as GeoJsonValue};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::feature::{Feature, FeatureSet, Properties, FEATURE, FEATURE_COLLECTION};

/// Read a feature collection from a JSON value.
pub fn parse_feature_set(value: &Value) -> Result<FeatureSet> {
    let Value::Object(collection) = value else {
        return Err(Error::InputShape {
            field: "payload",
            reason: "must be a JSON object".to_string(),
        });
    };
    let features = match collection.get("features") {
        Some(Value::Array(features)) => features,
        Some(_) => {
            return Err(Error::InputShape {
                field: "features",
                reason: "must be a sequence".to_string(),
            })
        }
        None => {
            return Err(Error::InputShape {
                field: "features",
                reason: "is missing".to_string(),
            })
        }
    };

    let features = features
        .iter()
        .enumerate()
        .map(|(index, feature)| parse_feature(index, feature))
        .collect::<Result<Vec<_>>>()?;
    debug!("parsed {} features", features.len());

    Ok(FeatureSet {
        kind: type_tag(collection, FEATURE_COLLECTION),
        features,
        crs: collection.get("crs").filter(|crs| !crs.is_null()).cloned(),
    })
}

/// Read a feature collection from its textual serialization.
pub fn parse_feature_set_str(text: &str) -> Result<FeatureSet> {
    parse_feature_set(&serde_json::from_str(text)?)
}

/// Load a JSON document from a file.
pub fn read_value(path: &Path) -> Result<Value> {
    debug!("loading file: {}", path.display());
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn type_tag(object: &Map<String, Value>, default: &str) -> String {
    object
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn parse_feature(index: usize, value: &Value) -> Result<Feature> {
    let parse_error = |reason: String| Error::GeometryParse { index, reason };

    let Value::Object(feature) = value else {
        return Err(parse_error("feature is not an object".to_string()));
    };
    let geometry = match feature.get("geometry") {
        None | Some(Value::Null) => return Err(parse_error("feature has no geometry".to_string())),
        Some(geometry) => serde_json::from_value::<GeoJsonGeometry>(geometry.clone())
            .map_err(|e| parse_error(e.to_string()))?,
    };
    let properties = match feature.get("properties") {
        None | Some(Value::Null) => Properties::new(),
        Some(Value::Object(properties)) => properties.clone(),
        Some(_) => {
            return Err(Error::InputShape {
                field: "properties",
                reason: format!("of feature {index} must be a mapping"),
            })
        }
    };

    Ok(Feature {
        geometry: geometry_from_geojson(geometry.value).map_err(parse_error)?,
        properties,
        kind: type_tag(feature, FEATURE),
    })
}

fn coord(position: &[f64]) -> std::result::Result<Coord<f64>, String> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(format!("position {position:?} needs at least two components")),
    }
}

fn line_string(positions: &[Vec<f64>]) -> std::result::Result<LineString<f64>, String> {
    positions
        .iter()
        .map(|position| coord(position))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> std::result::Result<Polygon<f64>, String> {
    let Some((exterior, holes)) = rings.split_first() else {
        return Ok(Polygon::new(LineString::new(vec![]), vec![]));
    };
    let holes = holes
        .iter()
        .map(|ring| line_string(ring))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Polygon::new(line_string(exterior)?, holes))
}

/// Translate a GeoJSON coordinate tree into a `geo` geometry.
pub fn geometry_from_geojson(value: GeoJsonValue) -> std::result::Result<Geometry<f64>, String> {
    let geometry = match value {
        GeoJsonValue::Point(position) => Geometry::Point(Point(coord(&position)?)),
        GeoJsonValue::MultiPoint(positions) => Geometry::MultiPoint(MultiPoint::new(
            positions
                .iter()
                .map(|position| coord(position).map(Point))
                .collect::<std::result::Result<_, _>>()?,
        )),
        GeoJsonValue::LineString(positions) => Geometry::LineString(line_string(&positions)?),
        GeoJsonValue::MultiLineString(lines) => Geometry::MultiLineString(MultiLineString::new(
            lines
                .iter()
                .map(|line| line_string(line))
                .collect::<std::result::Result<_, _>>()?,
        )),
        GeoJsonValue::Polygon(rings) => Geometry::Polygon(polygon(&rings)?),
        GeoJsonValue::MultiPolygon(polygons) => Geometry::MultiPolygon(MultiPolygon::new(
            polygons
                .iter()
                .map(|rings| polygon(rings))
                .collect::<std::result::Result<_, _>>()?,
        )),
        GeoJsonValue::GeometryCollection(members) => {
            Geometry::GeometryCollection(GeometryCollection(
                members
                    .into_iter()
                    .map(|member| geometry_from_geojson(member.value))
                    .collect::<std::result::Result<_, _>>()?,
            ))
        }
    };
    Ok(geometry)
}

fn position(coord: &Coord<f64>) -> Vec<f64> {
    vec![coord.x, coord.y]
}

fn ring(line: &LineString<f64>) -> Vec<Vec<f64>> {
    line.0.iter().map(position).collect()
}

fn rings(polygon: &Polygon<f64>) -> Vec<Vec<Vec<f64>>> {
    let mut rings = vec![ring(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring));
    rings
}

/// Translate a `geo` geometry back into a GeoJSON coordinate tree.
pub fn geometry_to_geojson(geometry: &Geometry<f64>) -> GeoJsonValue {
    match geometry {
        Geometry::Point(point) => GeoJsonValue::Point(position(&point.0)),
        Geometry::Line(line) => {
            GeoJsonValue::LineString(vec![position(&line.start), position(&line.end)])
        }
        Geometry::LineString(line) => GeoJsonValue::LineString(ring(line)),
        Geometry::Polygon(polygon) => GeoJsonValue::Polygon(rings(polygon)),
        Geometry::MultiPoint(points) => {
            GeoJsonValue::MultiPoint(points.iter().map(|point| position(&point.0)).collect())
        }
        Geometry::MultiLineString(lines) => {
            GeoJsonValue::MultiLineString(lines.iter().map(ring).collect())
        }
        Geometry::MultiPolygon(polygons) => {
            GeoJsonValue::MultiPolygon(polygons.iter().map(rings).collect())
        }
        Geometry::GeometryCollection(members) => GeoJsonValue::GeometryCollection(
            members
                .iter()
                .map(|member| GeoJsonGeometry::new(geometry_to_geojson(member)))
                .collect(),
        ),
        Geometry::Rect(rect) => GeoJsonValue::Polygon(rings(&rect.to_polygon())),
        Geometry::Triangle(triangle) => GeoJsonValue::Polygon(rings(&triangle.to_polygon())),
    }
}

/// Serialize a feature set as a GeoJSON feature collection.
pub fn to_value(set: &FeatureSet) -> Value {
    let features: Vec<Value> = set
        .features
        .iter()
        .map(|feature| {
            json!({
                "type": feature.kind,
                "geometry": GeoJsonGeometry::new(geometry_to_geojson(&feature.geometry)),
                "properties": feature.properties,
            })
        })
        .collect();

    let mut collection = json!({
        "type": set.kind,
        "features": features,
    });
    if let Some(crs) = &set.crs {
        collection["crs"] = crs.clone();
    }
    collection
}

pub fn to_string(set: &FeatureSet) -> Result<String> {
    Ok(serde_json::to_string(&to_value(set))?)
}

/// Write a feature set to a GeoJSON file.
pub fn write_feature_set(set: &FeatureSet, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &to_value(set))?;
    debug!("wrote {} features to {}", set.len(), path.display());
    Ok(())
}
