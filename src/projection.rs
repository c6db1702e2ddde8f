//! Per-feature local projection and area measurement.
//!
//! Every feature is reprojected into an azimuthal equidistant projection
//! centered on its own centroid, which keeps distortion negligible across
//! the feature and makes planar area a good estimate of true area.

use geo::{Area, Centroid, Coord, Geometry, MapCoords, Point};
use rayon::prelude::*;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::feature::{geometry_kind, Feature, FeatureSet};

/// CRS name stamped on locally projected feature sets.
pub const LOCAL_CRS_NAME: &str = "urn:ogc:def:uom:EPSG::9102";

/// Radius of the sphere standing in for the WGS84 ellipsoid, in meters.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Property holding the pre-projection centroid as `[x, y]`.
pub const CENTROID: &str = "centroid";

const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// Azimuthal equidistant projection on a sphere, centered on `origin` (lon, lat in degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    origin: Point<f64>,
    radius: f64,
}

impl LocalProjection {
    pub fn centered_on(origin: Point<f64>) -> Self {
        Self {
            origin,
            radius: EARTH_RADIUS,
        }
    }

    pub fn origin(&self) -> Point<f64> {
        self.origin
    }

    /// Equivalent PROJ.4 definition.
    pub fn proj4(&self) -> String {
        format!(
            "+proj=aeqd +lat_0={} +lon_0={} +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs +R={}",
            self.origin.y(),
            self.origin.x(),
            self.radius
        )
    }

    /// Project a lon/lat coordinate to meters east/north of the origin.
    pub fn forward(&self, coord: Coord<f64>) -> std::result::Result<Coord<f64>, String> {
        let (phi0, lam0) = (self.origin.y().to_radians(), self.origin.x().to_radians());
        let (phi, lam) = (coord.y.to_radians(), coord.x.to_radians() - lam0);

        let cos_c = (phi0.sin() * phi.sin() + phi0.cos() * phi.cos() * lam.cos()).clamp(-1.0, 1.0);
        let c = cos_c.acos();
        if std::f64::consts::PI - c < 1e-10 {
            return Err(format!("({}, {}) is antipodal to the projection center", coord.x, coord.y));
        }
        // c / sin(c) tends to 1 at the center
        let k = if c < 1e-12 { 1.0 } else { c / c.sin() };

        Ok(Coord {
            x: self.radius * k * phi.cos() * lam.sin(),
            y: self.radius * k * (phi0.cos() * phi.sin() - phi0.sin() * phi.cos() * lam.cos()),
        })
    }

    /// Project every vertex of `geometry`.
    #[cfg(not(feature = "libproj"))]
    pub fn project(&self, geometry: &Geometry<f64>) -> std::result::Result<Geometry<f64>, String> {
        geometry.try_map_coords(|coord| self.forward(coord))
    }

    /// Project every vertex of `geometry` through the system PROJ library.
    #[cfg(feature = "libproj")]
    pub fn project(&self, geometry: &Geometry<f64>) -> std::result::Result<Geometry<f64>, String> {
        let definition = self.proj4();
        let transform = proj::Proj::new_known_crs("EPSG:4326", &definition, None)
            .map_err(|e| format!("failed to build {definition}: {e}"))?;
        geometry.try_map_coords(|coord| {
            transform
                .convert((coord.x, coord.y))
                .map(|(x, y)| Coord { x, y })
                .map_err(|e| e.to_string())
        })
    }
}

/// The CRS descriptor of a locally projected set.
pub fn local_crs() -> Value {
    json!({"type": "name", "properties": {"name": LOCAL_CRS_NAME}})
}

pub fn is_locally_projected(set: &FeatureSet) -> bool {
    set.crs_name() == Some(LOCAL_CRS_NAME)
}

/// Centroid used as the projection center. A geometry collection uses the
/// mean of its members' centroids; empty geometries have none.
pub fn feature_centroid(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        Geometry::GeometryCollection(members) => {
            let centroids: Vec<Point<f64>> = members.iter().filter_map(|member| member.centroid()).collect();
            if centroids.is_empty() {
                return None;
            }
            let n = centroids.len() as f64;
            let (x, y) = centroids
                .iter()
                .fold((0.0, 0.0), |(x, y), centroid| (x + centroid.x(), y + centroid.y()));
            Some(Point::new(x / n, y / n))
        }
        other => other.centroid(),
    }
}

/// Reproject each feature into its own local projection. A set already
/// carrying the local CRS marker is returned unchanged.
pub fn project_local(set: &FeatureSet) -> Result<FeatureSet> {
    if is_locally_projected(set) {
        debug!("feature set is already locally projected");
        return Ok(set.clone());
    }

    let features = set
        .features
        .par_iter()
        .enumerate()
        .map(|(index, feature)| project_feature(index, feature))
        .collect::<Result<Vec<_>>>()?;
    debug!("projected {} features", features.len());

    Ok(FeatureSet {
        kind: set.kind.clone(),
        features,
        crs: Some(local_crs()),
    })
}

fn project_feature(index: usize, feature: &Feature) -> Result<Feature> {
    match &feature.geometry {
        Geometry::Point(_) | Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::GeometryCollection(_) => {}
        other => {
            return Err(Error::UnsupportedGeometry {
                index,
                kind: geometry_kind(other),
            })
        }
    }

    let Some(centroid) = feature_centroid(&feature.geometry) else {
        let mut projected = feature.clone();
        projected.properties.insert(CENTROID.to_string(), Value::Null);
        return Ok(projected);
    };

    let geometry = LocalProjection::centered_on(centroid)
        .project(&feature.geometry)
        .map_err(|reason| Error::Projection { index, reason })?;
    let mut projected = feature.with_geometry(geometry);
    projected
        .properties
        .insert(CENTROID.to_string(), json!([centroid.x(), centroid.y()]));
    Ok(projected)
}

/// Area of each feature in hectares. Assumes a linear, meter-based CRS.
pub fn feature_areas(set: &FeatureSet) -> Vec<f64> {
    set.features
        .iter()
        .map(|feature| feature.geometry.unsigned_area() / SQUARE_METERS_PER_HECTARE)
        .collect()
}

/// Total area of the set in hectares; zero for an empty set.
pub fn total_area(set: &FeatureSet) -> f64 {
    feature_areas(set).iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Properties;
    use geo::{polygon, GeometryCollection, LineString};

    fn degree_square(lon: f64, lat: f64, size: f64) -> Geometry<f64> {
        polygon![
            (x: lon, y: lat), (x: lon + size, y: lat),
            (x: lon + size, y: lat + size), (x: lon, y: lat + size),
        ]
        .into()
    }

    #[test]
    fn test_origin_maps_to_zero() {
        let projection = LocalProjection::centered_on(Point::new(12.5, 55.7));
        assert_eq!(projection.origin(), Point::new(12.5, 55.7));
        let origin = projection.forward(Coord { x: 12.5, y: 55.7 }).unwrap();
        assert!(origin.x.abs() < 1e-6 && origin.y.abs() < 1e-6);
    }

    #[test]
    fn test_distances_are_true_from_center() {
        let projection = LocalProjection::centered_on(Point::new(0.0, 0.0));
        let north = projection.forward(Coord { x: 0.0, y: 1.0 }).unwrap();
        let meridian_degree = EARTH_RADIUS * 1f64.to_radians();
        assert!(north.x.abs() < 1e-6);
        assert!((north.y - meridian_degree).abs() < 1e-6);

        let east = projection.forward(Coord { x: 1.0, y: 0.0 }).unwrap();
        assert!((east.x - meridian_degree).abs() < 1e-6);
    }

    #[test]
    fn test_antipode_is_an_error() {
        let projection = LocalProjection::centered_on(Point::new(0.0, 0.0));
        assert!(projection.forward(Coord { x: 180.0, y: 0.0 }).is_err());
    }

    #[test]
    fn test_proj4_definition() {
        let projection = LocalProjection::centered_on(Point::new(10.0, -20.5));
        assert_eq!(
            projection.proj4(),
            "+proj=aeqd +lat_0=-20.5 +lon_0=10 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs +R=6371000"
        );
    }

    #[test]
    fn test_collection_centroid_is_mean_of_members() {
        let collection = Geometry::GeometryCollection(GeometryCollection(vec![
            Point::new(0.0, 0.0).into(),
            degree_square(2.0, 2.0, 2.0),
        ]));
        assert_eq!(feature_centroid(&collection), Some(Point::new(1.5, 1.5)));
        assert_eq!(feature_centroid(&Geometry::GeometryCollection(GeometryCollection(vec![]))), None);
    }

    #[test]
    fn test_project_local_sets_marker_and_centroid() {
        let set = FeatureSet::new(vec![Feature::new(degree_square(10.0, 50.0, 0.01), Properties::new())]);
        let projected = project_local(&set).unwrap();
        assert!(is_locally_projected(&projected));
        let centroid = projected.features[0].properties[CENTROID].as_array().unwrap().clone();
        assert!((centroid[0].as_f64().unwrap() - 10.005).abs() < 1e-9);
        assert!((centroid[1].as_f64().unwrap() - 50.005).abs() < 1e-9);

        // A 0.01 degree cell is roughly 1112 m tall and 1112 * cos(lat) m wide.
        let expected = 1111.95 * 1111.95 * 50.005f64.to_radians().cos() / 10_000.0;
        let area = total_area(&projected);
        assert!((area - expected).abs() / expected < 0.01, "area {area} vs {expected}");

        assert_eq!(project_local(&projected).unwrap(), projected);
    }

    #[test]
    fn test_unsupported_geometry() {
        let line = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]));
        let set = FeatureSet::new(vec![
            Feature::new(Point::new(0.0, 0.0).into(), Properties::new()),
            Feature::new(line, Properties::new()),
        ]);
        match project_local(&set).unwrap_err() {
            Error::UnsupportedGeometry { index, kind } => assert_eq!((index, kind), (1, "LineString")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_area_of_empty_set() {
        assert_eq!(total_area(&FeatureSet::new(vec![])), 0.0);
    }

    #[test]
    fn test_area_in_hectares() {
        let set = FeatureSet::new(vec![
            Feature::new(degree_square(0.0, 0.0, 100.0), Properties::new()),
            Feature::new(degree_square(500.0, 0.0, 200.0), Properties::new()),
        ]);
        assert_eq!(feature_areas(&set), vec![1.0, 4.0]);
        assert_eq!(total_area(&set), 5.0);
    }
}
