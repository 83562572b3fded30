use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand, ValueEnum};
use las::{Bounds, Point, Vector};
use log::{error, info, warn};
use serde::Serialize;

use self::analysis::{analyze, AnalysisOptions};
use self::dataset::{PointFilter, ReturnFilter};
use self::error::{Error, Result};
use self::loader::GdalRaster;
use self::normalize::SentinelMatch;
use self::rasterize::{rasterize, Method, RasterizeParams};
use self::render::{Colormap, NullRenderer, PngRenderer, Renderer};
use self::triangulation::Thinning;

mod error;
mod util;

mod analysis;
mod dataset;
mod extent;
mod histogram;
mod loader;
mod normalize;
mod rasterize;
mod render;
mod stats;

mod binning;
mod triangulation;

#[derive(Debug, Default, ValueEnum, Clone, Copy)]
pub enum Variable {
    #[default]
    Elevation,
    Intensity,
    ClassCode,
}

#[derive(Debug, ValueEnum, Clone)]
pub enum Function {
    Mean,
    Median,

    Min,
    Max,

    Count,
}

fn extent_parser(s: &str) -> core::result::Result<Bounds, String> {
    let split: Vec<&str> = s.split(',').collect();

    if split.len() != 6 {
        return Err(format!("'{s}' has an insufficient number of coordinates"));
    }

    fn parse(num: &str) -> core::result::Result<f64, String> {
        num.trim()
            .parse()
            .map_err(|e: <f64 as FromStr>::Err| e.to_string())
    }

    fn check_min_max(min: &[f64; 3], max: &[f64; 3]) -> core::result::Result<(), String> {
        for i in 0..3 {
            if min[i] > max[i] {
                return Err(format!(
                    "Invalid extent. {} is greater than {}",
                    min[i], max[i]
                ));
            }
        }

        Ok(())
    }

    let min: [f64; 3] = [parse(split[0])?, parse(split[1])?, parse(split[2])?];

    let max: [f64; 3] = [parse(split[3])?, parse(split[4])?, parse(split[5])?];

    check_min_max(&min, &max)?;

    Ok(Bounds {
        min: Vector {
            x: min[0],
            y: min[1],
            z: min[2],
        },
        max: Vector {
            x: max[0],
            y: max[1],
            z: max[2],
        },
    })
}

fn limits_parser(s: &str) -> core::result::Result<(f64, f64), String> {
    let (lo, hi) = s
        .split_once(',')
        .ok_or_else(|| format!("'{s}' should be MIN,MAX"))?;
    let lo: f64 = lo.trim().parse().map_err(|e: <f64 as FromStr>::Err| e.to_string())?;
    let hi: f64 = hi.trim().parse().map_err(|e: <f64 as FromStr>::Err| e.to_string())?;

    if hi <= lo {
        return Err(format!("Invalid color limits. {lo} is not below {hi}"));
    }
    Ok((lo, hi))
}

#[derive(Subcommand)]
enum MethodCommand {
    /// Use raw point cloud values via binning.
    Bin {
        /// Binning function. Default: median
        #[arg(short, long)]
        func: Option<Function>,
    },
    /// Linear interpolation over a Delaunay triangulation.
    Triangulate {
        /// Thin the points to one per window of this size before triangulating.
        /// 0 disables thinning.
        #[arg(short, long, default_value_t = 10.0)]
        window_size: f64,

        /// Point kept in each thinning window. Default: maximum
        #[arg(short, long)]
        thinning: Option<Thinning>,
    },
}

#[derive(Args, Debug, Clone)]
struct AnalyzeArgs {
    /// Band to analyze (1-based).
    #[arg(long, default_value_t = 1)]
    band: usize,

    /// Overrides the band's scale factor.
    #[arg(long)]
    scale_factor: Option<f64>,

    /// How cells are matched against the no-data value.
    #[arg(long, value_enum, default_value_t)]
    nodata_match: SentinelMatch,

    /// Directory for PNG figures. No figures without it.
    #[arg(long)]
    plots: Option<PathBuf>,

    /// Color limits of the raster figure [min, max].
    #[arg(long, value_parser = limits_parser, default_value = "0,45")]
    color_limits: (f64, f64),

    #[arg(long, value_enum, default_value_t)]
    colormap: Colormap,

    /// Title of the raster figure.
    #[arg(long, default_value = "CHM Analysis")]
    title: String,

    /// Also write the report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args)]
struct RasterizeArgs {
    /// Path to a las/laz file or a directory of them.
    #[arg(short, long)]
    input: PathBuf,

    /// Include las/laz files in subdirectories of the input.
    #[arg(long)]
    recursive: bool,

    /// Resolution of the output raster.
    #[arg(short, long)]
    res: f64,

    /// Optional classification filter, comma separated.
    #[arg(short, long, value_delimiter = ',')]
    class: Vec<u8>,

    /// Optional return filter, comma separated
    /// (first, last, single, first-of-many, last-of-many or a return number).
    #[arg(long, value_delimiter = ',')]
    returns: Vec<ReturnFilter>,

    /// Variable to rasterize. Default: elevation
    #[arg(short, long)]
    var: Option<Variable>,

    /// Multiplier applied to elevations.
    #[arg(short, long, default_value_t = 1.0)]
    z_factor: f64,

    /// Spatial reference of the output (EPSG:xxxx, WKT or PROJ).
    #[arg(short, long)]
    spatial_ref: Option<String>,

    /// Clip extent of the output raster. Default: bounds of the source las/laz [min x, y, z, max x, y, z]
    #[arg(short, long, value_parser = extent_parser)]
    extent: Option<Bounds>,

    /// Output GeoTIFF path
    output: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an elevation raster from las/laz files.
    Rasterize {
        #[command(flatten)]
        args: RasterizeArgs,

        /// Analyze the raster once written.
        #[arg(long)]
        analyze: bool,

        #[command(flatten)]
        analysis: AnalyzeArgs,

        #[command(subcommand)]
        method: MethodCommand,
    },
    /// Report statistics and height distributions of a raster.
    Analyze {
        /// Raster to analyze.
        raster: PathBuf,

        #[command(flatten)]
        analysis: AnalyzeArgs,
    },
}

#[derive(Parser)]
#[command(version, about = "Canopy height model rasterization and statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

pub fn get_var(var: &Variable, point: &Point, z_factor: f64) -> f64 {
    match *var {
        Variable::Elevation => point.z * z_factor,
        Variable::Intensity => point.intensity as f64,
        Variable::ClassCode => u8::from(point.classification) as f64,
    }
}

pub const NODATA: f64 = -9999.0;

impl RasterizeArgs {
    fn into_params(self, method: MethodCommand) -> RasterizeParams {
        let method = match method {
            MethodCommand::Bin { func } => Method::Bin(func.unwrap_or(Function::Median)),
            MethodCommand::Triangulate {
                window_size,
                thinning,
            } => Method::Triangulate {
                window: (window_size != 0.0)
                    .then(|| (window_size, thinning.unwrap_or_default())),
            },
        };

        RasterizeParams {
            input: self.input,
            recursive: self.recursive,
            res: self.res,
            filter: PointFilter {
                classes: self.class,
                returns: self.returns,
                extent: self.extent,
            },
            var: self.var.unwrap_or_default(),
            z_factor: self.z_factor,
            spatial_ref: self.spatial_ref,
            method,
            output: self.output,
        }
    }
}

impl From<&AnalyzeArgs> for AnalysisOptions {
    fn from(args: &AnalyzeArgs) -> Self {
        Self {
            band: args.band,
            scale_factor: args.scale_factor,
            sentinel_match: args.nodata_match,
            color_limits: args.color_limits,
            colormap: args.colormap,
            title: args.title.clone(),
        }
    }
}

fn run_analysis(raster: &Path, args: &AnalyzeArgs) -> Result<()> {
    let mut renderer: Box<dyn Renderer> = match &args.plots {
        Some(dir) => Box::new(PngRenderer::new(dir)?),
        None => Box::new(NullRenderer),
    };

    // Dropped, and so closed, on every path out of this function.
    let source = GdalRaster::open(raster)?;
    let stdout = io::stdout();
    let report = analyze(
        &source,
        &AnalysisOptions::from(args),
        renderer.as_mut(),
        &mut stdout.lock(),
    )?;

    if let Some(path) = &args.report {
        write_report(File::create(path)?, &report)?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}

fn write_report<W: Write, T: Serialize>(writer: W, report: &T) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    Ok(())
}

fn report_failure(stage: &str, err: &Error) {
    error!("{stage} failed with {}: {err}", err.kind());
}

fn main() -> ExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Rasterize {
            args,
            analyze,
            analysis,
            method,
        } => match rasterize(&args.into_params(method)) {
            Ok(raster) if analyze => run_analysis(&raster, &analysis)
                .inspect_err(|e| report_failure("Analysis", e)),
            Ok(_) => Ok(()),
            Err(e) => {
                report_failure("Rasterization", &e);
                if analyze {
                    warn!("Skipping analysis, no raster was produced");
                }
                Err(e)
            }
        },
        Commands::Analyze { raster, analysis } => {
            run_analysis(&raster, &analysis).inspect_err(|e| report_failure("Analysis", e))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
