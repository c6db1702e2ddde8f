//! Adaptive splitting of polygons into pieces of bounded extent.
//!
//! A polygon whose bounding box is wider or taller than the configured
//! maximum is cut in half across its longer axis, and each half is clipped
//! from the polygon and examined again until every piece fits.

use geo::{coord, Area, BooleanOps, BoundingRect, CoordsIter, Geometry, LineString, MultiPolygon, Polygon, Rect, Validation};
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::feature::{Feature, FeatureSet};
use crate::normalize::zero_buffer;

/// Property recording which top-level input feature a piece came from.
pub const SPLIT_ID: &str = "split_id";

/// Default maximum bounding box width and height, in coordinate units.
pub const COMPLEXITY_THRESHOLD: f64 = 1.2;

/// What to do with zero-area pieces left over from clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegeneratePolicy {
    /// Emit them like any other piece.
    #[default]
    Retain,
    /// Drop them from the output.
    Discard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitConfig {
    /// Maximum width and height of a piece's bounding box.
    pub max_extent: f64,
    /// Optional vertex budget per piece.
    pub max_vertices: Option<usize>,
    /// Number of nested cuts the vertex budget alone may force. Cuts made
    /// for extent do not count toward it.
    pub max_depth: usize,
    pub degenerate: DegeneratePolicy,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_extent: COMPLEXITY_THRESHOLD,
            max_vertices: None,
            max_depth: 32,
            degenerate: DegeneratePolicy::default(),
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.max_extent.is_finite() || self.max_extent <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "max_extent",
                value: self.max_extent.to_string(),
                reason: "must be a positive, finite number".to_string(),
            });
        }
        if let Some(max_vertices) = self.max_vertices.filter(|&max| max < 4) {
            return Err(Error::InvalidParameter {
                name: "max_vertices",
                value: max_vertices.to_string(),
                reason: "a closed ring needs at least 4 vertices".to_string(),
            });
        }
        Ok(())
    }
}

/// Split every polygonal feature of the set. Each input feature is stamped
/// with its `split_id` before being cut, so all its pieces share it.
/// Non-polygonal features are not carried into the output. A feature whose
/// extent is not a finite number cannot be halved and is rejected.
pub fn split(set: &FeatureSet, config: &SplitConfig) -> Result<FeatureSet> {
    config.validate()?;
    for (index, feature) in set.features.iter().enumerate() {
        if let Some(bounds) = feature.bounds().filter(|bounds| !has_finite_extent(bounds)) {
            return Err(Error::GeometryParse {
                index,
                reason: format!("extent {} x {} is not finite", bounds.width(), bounds.height()),
            });
        }
    }

    let pieces: Vec<Vec<Feature>> = set
        .features
        .par_iter()
        .enumerate()
        .map(|(split_id, feature)| {
            let mut feature = feature.clone();
            feature.properties.insert(SPLIT_ID.to_string(), split_id.into());
            split_feature(&feature, config)
        })
        .collect();

    let features: Vec<Feature> = pieces.into_iter().flatten().collect();
    debug!("split {} features into {} pieces", set.len(), features.len());
    Ok(set.derive(features))
}

/// Pieces of a single feature, with its properties unchanged.
pub fn split_feature(feature: &Feature, config: &SplitConfig) -> Vec<Feature> {
    match &feature.geometry {
        Geometry::Polygon(polygon) => split_polygon(polygon.clone(), config)
            .into_iter()
            .map(|piece| feature.with_geometry(Geometry::Polygon(piece)))
            .collect(),
        Geometry::MultiPolygon(_) => split_multipolygon(feature)
            .iter()
            .flat_map(|part| split_feature(part, config))
            .collect(),
        _ => {
            trace!("skipping non-polygonal feature");
            Vec::new()
        }
    }
}

/// One feature per member polygon of a multipolygon feature, each keeping
/// the parent's properties. Other geometries come back as a single feature.
pub fn split_multipolygon(feature: &Feature) -> Vec<Feature> {
    match &feature.geometry {
        Geometry::MultiPolygon(polygons) => polygons
            .iter()
            .map(|polygon| feature.with_geometry(Geometry::Polygon(polygon.clone())))
            .collect(),
        _ => vec![feature.clone()],
    }
}

/// Cut `polygon` until every piece satisfies `config`.
///
/// Pieces are produced in the order a depth-first recursion over the halves
/// would produce them, but the traversal runs on an explicit stack.
pub fn split_polygon(polygon: Polygon<f64>, config: &SplitConfig) -> Vec<Polygon<f64>> {
    let mut leaves = Vec::new();
    let mut pending = vec![(polygon, 0usize)];

    while let Some((polygon, depth)) = pending.pop() {
        let Some((boxes, dense)) = cut_boxes(&polygon, depth, config) else {
            if config.degenerate == DegeneratePolicy::Retain || !is_degenerate(&polygon) {
                leaves.push(polygon);
            }
            continue;
        };

        let shape = if polygon.is_valid() {
            MultiPolygon::new(vec![polygon])
        } else {
            zero_buffer(&MultiPolygon::new(vec![polygon]))
        };

        let mut halves = Vec::new();
        for bbox in boxes {
            let mut piece = shape.intersection(&MultiPolygon::new(vec![bbox.to_polygon()]));
            if piece.0.is_empty() {
                piece.0.push(Polygon::new(LineString::new(vec![]), vec![]));
            }
            halves.extend(piece.0);
        }
        let depth = if dense { depth + 1 } else { depth };
        trace!("vertex depth {depth}: cut into {} pieces", halves.len());
        pending.extend(halves.into_iter().rev().map(|half| (half, depth)));
    }

    leaves
}

/// The two halves of `bounds` if it exceeds `max_extent` in either axis.
pub fn split_boxes(bounds: Rect<f64>, max_extent: f64) -> Option<[Rect<f64>; 2]> {
    (bounds.width() > max_extent || bounds.height() > max_extent).then(|| halve(bounds))
}

/// Boxes to cut `polygon` with, and whether the cut is for the vertex budget
/// rather than the extent. `depth` counts vertex-driven cuts only.
fn cut_boxes(polygon: &Polygon<f64>, depth: usize, config: &SplitConfig) -> Option<([Rect<f64>; 2], bool)> {
    let bounds = polygon.bounding_rect().filter(has_finite_extent)?;
    if let Some(boxes) = split_boxes(bounds, config.max_extent) {
        return Some((boxes, false));
    }
    let dense = config
        .max_vertices
        .is_some_and(|max| polygon.coords_count() > max);
    (dense && depth < config.max_depth && bounds.width().max(bounds.height()) > 0.0)
        .then(|| (halve(bounds), true))
}

fn has_finite_extent(bounds: &Rect<f64>) -> bool {
    bounds.width().is_finite() && bounds.height().is_finite()
}

/// Halve across the longer axis; a square is cut horizontally (along Y).
fn halve(bounds: Rect<f64>) -> [Rect<f64>; 2] {
    let (min, max) = (bounds.min(), bounds.max());
    if bounds.width() > bounds.height() {
        let x_split = min.x / 2.0 + max.x / 2.0;
        [
            Rect::new(min, coord! { x: x_split, y: max.y }),
            Rect::new(coord! { x: x_split, y: min.y }, max),
        ]
    } else {
        let y_split = min.y / 2.0 + max.y / 2.0;
        [
            Rect::new(min, coord! { x: max.x, y: y_split }),
            Rect::new(coord! { x: min.x, y: y_split }, max),
        ]
    }
}

fn is_degenerate(polygon: &Polygon<f64>) -> bool {
    polygon.unsigned_area() == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Properties;
    use geo::polygon;
    use serde_json::json;

    fn rect_polygon(x1: f64, y1: f64, x2: f64, y2: f64) -> Polygon<f64> {
        Rect::new(coord! { x: x1, y: y1 }, coord! { x: x2, y: y2 }).to_polygon()
    }

    fn total_area(pieces: &[Polygon<f64>]) -> f64 {
        pieces.iter().map(|piece| piece.unsigned_area()).sum()
    }

    #[test]
    fn test_split_boxes_square_cuts_along_y() {
        let bounds = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 3.0, y: 3.0 });
        let [low, high] = split_boxes(bounds, 1.2).unwrap();
        assert_eq!(low, Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 3.0, y: 1.5 }));
        assert_eq!(high, Rect::new(coord! { x: 0.0, y: 1.5 }, coord! { x: 3.0, y: 3.0 }));

        let [left, right] = split_boxes(low, 1.2).unwrap();
        assert_eq!(left, Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.5, y: 1.5 }));
        assert_eq!(right, Rect::new(coord! { x: 1.5, y: 0.0 }, coord! { x: 3.0, y: 1.5 }));
    }

    #[test]
    fn test_split_boxes_within_threshold() {
        let bounds = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.2, y: 1.2 });
        assert!(split_boxes(bounds, 1.2).is_none());
    }

    #[test]
    fn test_split_square() {
        let pieces = split_polygon(rect_polygon(0.0, 0.0, 3.0, 3.0), &SplitConfig::default());
        assert_eq!(pieces.len(), 16);
        for piece in &pieces {
            let bounds = piece.bounding_rect().unwrap();
            assert!(bounds.width() <= 1.2 && bounds.height() <= 1.2);
            assert!((piece.unsigned_area() - 0.5625).abs() < 1e-6);
        }
        assert!((total_area(&pieces) - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_small_polygon_is_untouched() {
        let small = rect_polygon(0.0, 0.0, 1.0, 0.5);
        assert_eq!(split_polygon(small.clone(), &SplitConfig::default()), vec![small]);
    }

    #[test]
    fn test_degenerate_pieces_follow_policy() {
        // A zero-width spike stretches the bounding box to x = 0; once the
        // spike is repaired away the left half clips to nothing.
        let spiked = polygon![
            (x: 1.5, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 1.0), (x: 1.5, y: 1.0),
            (x: 1.5, y: 0.5), (x: 0.0, y: 0.5), (x: 1.5, y: 0.5),
        ];
        let retained = split_polygon(spiked.clone(), &SplitConfig::default());
        let discarded = split_polygon(
            spiked,
            &SplitConfig { degenerate: DegeneratePolicy::Discard, ..SplitConfig::default() },
        );
        assert_eq!(retained.len(), discarded.len() + 1);
        assert_eq!(retained.iter().filter(|piece| is_degenerate(piece)).count(), 1);
        assert!(discarded.iter().all(|piece| !is_degenerate(piece)));
        assert!((total_area(&discarded) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_polygon_is_a_leaf() {
        let empty = Polygon::new(LineString::new(vec![]), vec![]);
        assert_eq!(split_polygon(empty.clone(), &SplitConfig::default()), vec![empty.clone()]);
        let config = SplitConfig { degenerate: DegeneratePolicy::Discard, ..SplitConfig::default() };
        assert!(split_polygon(empty, &config).is_empty());
    }

    #[test]
    fn test_vertex_budget() {
        let circle: Polygon<f64> = Polygon::new(
            (0..64)
                .map(|i| {
                    let angle = i as f64 * std::f64::consts::TAU / 64.0;
                    (angle.cos() * 0.5, angle.sin() * 0.5)
                })
                .collect::<Vec<_>>()
                .into(),
            vec![],
        );
        let config = SplitConfig { max_vertices: Some(24), ..SplitConfig::default() };
        let pieces = split_polygon(circle.clone(), &config);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|piece| piece.coords_count() <= 24));
        assert!((total_area(&pieces) - circle.unsigned_area()).abs() < 1e-6);
    }

    #[test]
    fn test_vertex_budget_survives_extent_cuts() {
        // An 8 x 0.5 strip with a zigzag top edge: three extent cuts bring it
        // down to 1-wide pieces that are still far over the vertex budget.
        let mut ring: Vec<(f64, f64)> = vec![(0.0, 0.0), (8.0, 0.0)];
        ring.extend((0..=256).rev().map(|i| {
            let x = i as f64 * 8.0 / 256.0;
            (x, if i % 2 == 0 { 0.5 } else { 0.55 })
        }));
        let strip = Polygon::new(ring.into(), vec![]);

        let extent_only = split_polygon(strip.clone(), &SplitConfig::default());
        let config = SplitConfig { max_vertices: Some(12), max_depth: 2, ..SplitConfig::default() };
        let budgeted = split_polygon(strip.clone(), &config);

        assert_eq!(extent_only.len(), 8);
        assert!(budgeted.len() > extent_only.len());
        assert!((total_area(&budgeted) - strip.unsigned_area()).abs() < 1e-6);
    }

    #[test]
    fn test_split_rejects_non_finite_extent() {
        let huge = rect_polygon(-1e308, 0.0, 1e308, 1.0);
        let set = FeatureSet::new(vec![Feature::new(Geometry::Polygon(huge), Properties::new())]);
        assert!(matches!(
            split(&set, &SplitConfig::default()),
            Err(Error::GeometryParse { index: 0, .. })
        ));
    }

    #[test]
    fn test_halve_wide_finite_box() {
        let bounds = Rect::new(coord! { x: -1e300, y: 0.0 }, coord! { x: 1e300, y: 1.0 });
        let [left, right] = split_boxes(bounds, 1.2).unwrap();
        assert_eq!(left.max().x, 0.0);
        assert_eq!(right.min().x, 0.0);
    }

    #[test]
    fn test_split_ids_follow_input_features() {
        let multi = MultiPolygon::new(vec![rect_polygon(0.0, 0.0, 1.0, 1.0), rect_polygon(5.0, 5.0, 6.0, 6.0)]);
        let mut properties = Properties::new();
        properties.insert("name".to_string(), json!("x"));
        let set = FeatureSet::new(vec![
            Feature::new(Geometry::MultiPolygon(multi), properties.clone()),
            Feature::new(Geometry::Point(geo::Point::new(0.0, 0.0)), properties.clone()),
            Feature::new(Geometry::Polygon(rect_polygon(0.0, 0.0, 2.0, 1.0)), properties),
        ]);
        let split_set = split(&set, &SplitConfig::default()).unwrap();
        let ids: Vec<_> = split_set.features.iter().map(|f| f.properties[SPLIT_ID].clone()).collect();
        assert_eq!(ids, vec![json!(0), json!(0), json!(2), json!(2)]);
        assert!(split_set.features.iter().all(|f| f.properties["name"] == json!("x")));
    }

    #[test]
    fn test_invalid_config() {
        let config = SplitConfig { max_extent: 0.0, ..SplitConfig::default() };
        assert!(matches!(config.validate(), Err(Error::InvalidParameter { name: "max_extent", .. })));
        let config = SplitConfig { max_vertices: Some(3), ..SplitConfig::default() };
        assert!(matches!(config.validate(), Err(Error::InvalidParameter { name: "max_vertices", .. })));
    }
}
