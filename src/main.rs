use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};
use gis_dissolve::{process_file, DegeneratePolicy, PipelineConfig, SplitConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let matches = Command::new("GIS Dissolve")
        .version("1.0")
        .author("Jesper Fjellin")
        .about("Dissolves GeoJSON features and splits complex polygons into simpler pieces")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Input GeoJSON feature collection"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(value_parser!(PathBuf))
                .help("Output file (defaults to stdout)"),
        )
        .arg(
            Arg::new("dissolve-by")
                .long("dissolve-by")
                .help("Dissolve per distinct value of this property"),
        )
        .arg(
            Arg::new("split")
                .long("split")
                .action(ArgAction::SetTrue)
                .help("Split dissolved polygons into pieces of bounded extent"),
        )
        .arg(
            Arg::new("threshold")
                .long("threshold")
                .value_parser(value_parser!(f64))
                .default_value("1.2")
                .help("Maximum bounding box width and height of a piece"),
        )
        .arg(
            Arg::new("max-vertices")
                .long("max-vertices")
                .value_parser(value_parser!(usize))
                .help("Also split pieces with more vertices than this"),
        )
        .arg(
            Arg::new("drop-degenerate")
                .long("drop-degenerate")
                .action(ArgAction::SetTrue)
                .help("Discard zero-area pieces left by splitting"),
        )
        .arg(
            Arg::new("project")
                .long("project")
                .action(ArgAction::SetTrue)
                .help("Reproject each feature into a local azimuthal equidistant projection"),
        )
        .arg(
            Arg::new("area")
                .long("area")
                .action(ArgAction::SetTrue)
                .help("Report the area of interest in hectares"),
        )
        .get_matches();

    let input = matches
        .get_one::<PathBuf>("input")
        .cloned()
        .unwrap_or_default();
    if !input.exists() {
        eprintln!("Error: File not found: {}", input.display());
        std::process::exit(1);
    }

    let split_config = SplitConfig {
        max_extent: matches.get_one::<f64>("threshold").copied().unwrap_or(1.2),
        max_vertices: matches.get_one::<usize>("max-vertices").copied(),
        degenerate: if matches.get_flag("drop-degenerate") {
            DegeneratePolicy::Discard
        } else {
            DegeneratePolicy::Retain
        },
        ..SplitConfig::default()
    };
    let config = PipelineConfig {
        group_by: matches.get_one::<String>("dissolve-by").cloned(),
        split: matches.get_flag("split").then_some(split_config.clone()),
        project: matches.get_flag("project"),
        measure_area: matches.get_flag("area"),
    };
    if let Err(e) = split_config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let analysis = match process_file(&input, &config) {
        Ok(analysis) => analysis,
        Err(e) => {
            eprintln!("Error processing {}: {}", input.display(), e);
            std::process::exit(1);
        }
    };
    if let Some(area) = analysis.aoi_area {
        info!("area of interest: {area:.4} ha");
    }

    let result = match matches.get_one::<PathBuf>("output") {
        Some(path) => File::create(path).map(|file| write_json(BufWriter::new(file), &analysis.to_value())),
        None => Ok(write_json(io::stdout().lock(), &analysis.to_value())),
    };
    if let Err(e) = result.and_then(|written| written) {
        eprintln!("Error writing output: {e}");
        std::process::exit(1);
    }
}

fn write_json(mut writer: impl Write, value: &serde_json::Value) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()
}
