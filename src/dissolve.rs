//! Dissolve: union geometries, keep only attributes every input agrees on.

use geo::{unary_union, Geometry, GeometryCollection, Intersects, MultiPolygon, Polygon};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::feature::{Feature, FeatureSet, Properties};
use crate::normalize::{ingest, polygonal, repair};

/// Property holding the ordinal of a dissolved feature.
pub const DISSOLVE_ID: &str = "dissolve_id";

static NULL: Value = Value::Null;

/// Collapse the whole set into at most one feature.
pub fn dissolve(set: &FeatureSet) -> FeatureSet {
    let members: Vec<&Feature> = set.features.iter().collect();
    let features = if members.is_empty() {
        Vec::new()
    } else {
        vec![dissolve_group(&members, 0)]
    };
    debug!("dissolved {} features into {}", set.len(), features.len());
    set.derive(features)
}

/// Dissolve separately per distinct value of `field`. Features lacking the
/// field group together under null. Groups are emitted in order of first
/// appearance.
pub fn dissolve_by(set: &FeatureSet, field: &str) -> FeatureSet {
    let mut groups: Vec<(&Value, Vec<&Feature>)> = Vec::new();
    for feature in &set.features {
        let key = feature.properties.get(field).unwrap_or(&NULL);
        match groups.iter_mut().find(|(group_key, _)| *group_key == key) {
            Some((_, members)) => members.push(feature),
            None => groups.push((key, vec![feature])),
        }
    }

    let features: Vec<Feature> = groups
        .iter()
        .enumerate()
        .map(|(dissolve_id, (_, members))| dissolve_group(members, dissolve_id))
        .collect();
    debug!("dissolved {} features on `{field}` into {}", set.len(), features.len());
    set.derive(features)
}

/// Validate a raw GeoJSON payload, normalize it, and dissolve it whole.
pub fn dissolve_collection(value: &Value) -> Result<FeatureSet> {
    let reject = |reason: &str| Error::DissolveInput {
        reason: reason.to_string(),
        value: value.clone(),
    };
    let Value::Object(collection) = value else {
        return Err(reject("feature set must be a mapping"));
    };
    match collection.get("features") {
        Some(Value::Array(_)) => {}
        Some(_) => return Err(reject("`features` must be a sequence")),
        None => return Err(reject("feature set has no `features`")),
    }
    Ok(dissolve(&ingest(value)?))
}

fn dissolve_group(members: &[&Feature], dissolve_id: usize) -> Feature {
    let properties: Vec<&Properties> = members.iter().map(|feature| &feature.properties).collect();
    let mut properties = condense_properties(&properties);
    properties.insert(DISSOLVE_ID.to_string(), dissolve_id.into());

    let geometries: Vec<Geometry<f64>> = members
        .iter()
        .map(|feature| repair(feature.geometry.clone()))
        .collect();
    Feature::new(union_geometries(&geometries), properties)
}

/// The first mapping restricted to keys present with an equal value in all others.
pub fn condense_properties(properties: &[&Properties]) -> Properties {
    let Some((first, rest)) = properties.split_first() else {
        return Properties::new();
    };
    first
        .iter()
        .filter(|(key, value)| rest.iter().all(|other| other.get(*key) == Some(*value)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn collect_parts(geometry: &Geometry<f64>, areal: &mut Vec<Polygon<f64>>, other: &mut Vec<Geometry<f64>>) {
    match geometry {
        Geometry::Polygon(polygon) => areal.push(polygon.clone()),
        Geometry::MultiPolygon(polygons) => areal.extend(polygons.iter().cloned()),
        Geometry::Rect(rect) => areal.push(rect.to_polygon()),
        Geometry::Triangle(triangle) => areal.push(triangle.to_polygon()),
        Geometry::MultiPoint(points) => other.extend(points.iter().map(|point| Geometry::Point(*point))),
        Geometry::GeometryCollection(members) => {
            for member in members {
                collect_parts(member, areal, other);
            }
        }
        Geometry::Point(_) | Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
            other.push(geometry.clone())
        }
    }
}

/// Union of all geometries. Areal parts merge into a polygon or multipolygon;
/// points inside that area are absorbed; any other parts ride along in a
/// geometry collection.
pub fn union_geometries(geometries: &[Geometry<f64>]) -> Geometry<f64> {
    let mut areal = Vec::new();
    let mut other = Vec::new();
    for geometry in geometries {
        collect_parts(geometry, &mut areal, &mut other);
    }

    let merged: MultiPolygon<f64> = unary_union(&areal);
    other.retain(|part| match part {
        Geometry::Point(point) => !merged.intersects(point),
        _ => true,
    });

    match (merged.0.is_empty(), other.len()) {
        (_, 0) => polygonal(merged),
        (true, 1) => other.remove(0),
        (true, _) => Geometry::GeometryCollection(GeometryCollection(other)),
        (false, _) => {
            let mut members = vec![polygonal(merged)];
            members.append(&mut other);
            Geometry::GeometryCollection(GeometryCollection(members))
        }
    }
}
