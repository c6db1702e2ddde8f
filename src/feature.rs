use geo::{BoundingRect, Geometry, Rect};
use serde_json::{Map, Value};

/// Attribute mapping of a feature. Values are expected to be scalars.
pub type Properties = Map<String, Value>;

pub const FEATURE: &str = "Feature";
pub const FEATURE_COLLECTION: &str = "FeatureCollection";

/// A geometry with its attributes and type tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: Properties,
    pub kind: String,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>, properties: Properties) -> Self {
        Self {
            geometry,
            properties,
            kind: FEATURE.to_string(),
        }
    }

    /// A copy of this feature carrying a different geometry.
    pub fn with_geometry(&self, geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            properties: self.properties.clone(),
            kind: self.kind.clone(),
        }
    }

    /// Bounding box in the geometry's current coordinate space, `None` when empty.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

/// Ordered features plus the collection type tag and an opaque CRS descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub kind: String,
    pub features: Vec<Feature>,
    pub crs: Option<Value>,
}

impl FeatureSet {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: FEATURE_COLLECTION.to_string(),
            features,
            crs: None,
        }
    }

    pub fn with_crs(mut self, crs: Value) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// A new set with the same type tag and CRS holding `features`.
    pub fn derive(&self, features: Vec<Feature>) -> Self {
        Self {
            kind: self.kind.clone(),
            features,
            crs: self.crs.clone(),
        }
    }

    /// The `properties.name` of a named CRS descriptor, if that is what the set carries.
    pub fn crs_name(&self) -> Option<&str> {
        self.crs.as_ref()?.get("properties")?.get("name")?.as_str()
    }
}

/// GeoJSON-style name of a geometry kind.
pub fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
