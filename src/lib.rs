use std::path::Path;

use serde_json::{json, Value};
use tracing::info;

pub mod dissolve;
pub mod error;
pub mod feature;
pub mod geojson_io;
pub mod normalize;
pub mod projection;
pub mod splitter;

pub use error::{Error, Result};
pub use feature::{Feature, FeatureSet, Properties};
pub use splitter::{DegeneratePolicy, SplitConfig};

/// Which stages run after normalization and dissolve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    /// Dissolve per distinct value of this property instead of into one feature.
    pub group_by: Option<String>,
    /// Split the dissolved features.
    pub split: Option<SplitConfig>,
    /// Reproject into per-feature local projections.
    pub project: bool,
    /// Measure the area of interest in hectares. The area is always taken from
    /// split, locally projected pieces; the default split config is used when
    /// no split was requested.
    pub measure_area: bool,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub dissolved: FeatureSet,
    /// Output of the split/project stages, when any ran.
    pub processed: Option<FeatureSet>,
    /// Area of interest in hectares.
    pub aoi_area: Option<f64>,
}

impl Analysis {
    /// Response document: `dissolved-geom`, `aoi-area` and, when present, `processed-geom`.
    pub fn to_value(&self) -> Value {
        let mut output = json!({
            "dissolved-geom": geojson_io::to_value(&self.dissolved),
            "aoi-area": self.aoi_area,
        });
        if let Some(processed) = &self.processed {
            output["processed-geom"] = geojson_io::to_value(processed);
        }
        output
    }
}

/// Run normalize, dissolve, and whichever later stages `config` selects.
pub fn analyze(input: &Value, config: &PipelineConfig) -> Result<Analysis> {
    let features = normalize::ingest(input)?;
    let dissolved = match &config.group_by {
        Some(field) => dissolve::dissolve_by(&features, field),
        None => dissolve::dissolve(&features),
    };

    let split_set = match &config.split {
        Some(split_config) => Some(splitter::split(&dissolved, split_config)?),
        None => None,
    };
    let projected = if config.project {
        Some(projection::project_local(split_set.as_ref().unwrap_or(&dissolved))?)
    } else {
        None
    };

    // Area is always measured on split pieces so each local projection stays small.
    let aoi_area = if config.measure_area {
        let measured = match (&split_set, &projected) {
            (Some(_), Some(projected)) => projection::total_area(projected),
            (Some(pieces), None) => projection::total_area(&projection::project_local(pieces)?),
            (None, _) => {
                let pieces = splitter::split(&dissolved, &SplitConfig::default())?;
                projection::total_area(&projection::project_local(&pieces)?)
            }
        };
        Some(measured)
    } else {
        None
    };
    let processed = projected.or(split_set);

    info!(
        "analyzed {} features into {} dissolved",
        features.len(),
        dissolved.len()
    );
    Ok(Analysis {
        dissolved,
        processed,
        aoi_area,
    })
}

/// Like [`analyze`], from GeoJSON text.
pub fn analyze_str(input: &str, config: &PipelineConfig) -> Result<Analysis> {
    analyze(&serde_json::from_str(input)?, config)
}

/// Load a GeoJSON file and run the pipeline on it.
pub fn process_file(path: &Path, config: &PipelineConfig) -> Result<Analysis> {
    analyze(&geojson_io::read_value(path)?, config)
}
