//! decyb: decode YB Tracking `AllPositions3` binary dumps.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use yb_core::config::{self, Config, FieldSet};
use yb_core::racemath::{self, Course};
use yb_core::{StreamDecoder, VesselBlock};

mod input;
mod render;

#[derive(Parser)]
#[command(
    name = "decyb",
    version,
    about = "YB Tracking position stream decoder",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Without a subcommand, decode (`decyb FILE` or `decyb < FILE`)
    #[command(flatten)]
    decode: DecodeArgs,

    /// Log filter (e.g. `debug`, `yb_core=trace`)
    #[arg(long, global = true, env = "YB_DECODE_LOG")]
    log_level: Option<String>,

    /// Config file path (default: ~/.yb-decode/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a binary dump and print the vessels as JSON
    Decode(DecodeArgs),

    /// Decode a binary dump and print a per-vessel track summary
    Summary(SummaryArgs),

    /// Show the effective configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args, Debug, Default)]
struct DecodeArgs {
    /// Binary dump to decode (stdin if omitted or `-`)
    file: Option<PathBuf>,

    /// Emit every decoded field (alt, lap, pc) instead of the reference subset
    #[arg(long)]
    full: bool,

    /// Single-line JSON output
    #[arg(long)]
    compact: bool,

    /// Write JSON to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    /// Binary dump to decode (stdin if omitted or `-`)
    file: Option<PathBuf>,

    /// Legs slower than this (knots) do not count as moving
    #[arg(long)]
    min_speed: Option<f64>,

    /// Ignore moments before this epoch time
    #[arg(long)]
    since: Option<u32>,

    /// Ignore moments after this epoch time
    #[arg(long)]
    until: Option<u32>,

    /// Course waypoints, one `lat lon` per line, for course DTF and DMG
    #[arg(long)]
    course: Option<PathBuf>,
}

fn main() -> ExitCode {
    let Cli {
        command,
        decode,
        log_level,
        config: config_path,
    } = Cli::parse();

    let config = match &config_path {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    init_logging(log_level.as_deref().or(config.log.as_deref()));

    let result = match command.unwrap_or(Commands::Decode(decode)) {
        Commands::Decode(args) => cmd_decode(&config, &args),
        Commands::Summary(args) => cmd_summary(&config, &args),
        Commands::Config { init } => cmd_config(&config, config_path.as_deref(), init),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

const DEFAULT_LOG_FILTER: &str = "warn";

/// Parse a log filter, falling back to the default on error.
///
/// The second value describes the rejected filter, if any.
fn build_filter(filter: Option<&str>) -> (EnvFilter, Option<String>) {
    let filter = filter.unwrap_or(DEFAULT_LOG_FILTER);
    match EnvFilter::try_new(filter) {
        Ok(f) => (f, None),
        Err(e) => (
            EnvFilter::new(DEFAULT_LOG_FILTER),
            Some(format!("invalid log filter {filter:?} ({e})")),
        ),
    }
}

fn init_logging(filter: Option<&str>) {
    let (env_filter, rejected) = build_filter(filter);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
    if let Some(reason) = rejected {
        warn!("{reason}, using {DEFAULT_LOG_FILTER:?}");
    }
}

fn decode_input(file: Option<&Path>) -> Result<Vec<yb_core::VesselBlock>> {
    let buf = input::read_input(file)?;
    let decoder = StreamDecoder::new(&buf).context("failed to read stream header")?;
    let header = decoder.header();
    info!(
        flags = header.flags.bits(),
        base_time = header.base_time,
        "stream header"
    );

    let blocks = decoder
        .collect::<yb_core::Result<Vec<_>>>()
        .context("failed to decode position stream")?;
    info!(
        vessels = blocks.len(),
        moments = blocks.iter().map(|b| b.len()).sum::<usize>(),
        "decoded"
    );
    Ok(blocks)
}

fn cmd_decode(config: &Config, args: &DecodeArgs) -> Result<()> {
    let blocks = decode_input(args.file.as_deref())?;

    let fields = if args.full {
        FieldSet::Full
    } else {
        config.output.fields
    };
    let pretty = config.output.pretty && !args.compact;

    match &args.output {
        Some(path) => {
            let f = File::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            let mut out = BufWriter::new(f);
            render::write_json(&mut out, &blocks, fields, pretty)?;
            out.flush()
                .with_context(|| format!("cannot write {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            render::write_json(&mut out, &blocks, fields, pretty)?;
            out.flush().context("cannot write standard output")?;
        }
    }
    Ok(())
}

fn cmd_summary(config: &Config, args: &SummaryArgs) -> Result<()> {
    let course = match &args.course {
        Some(path) => Some(Course::new(&input::read_course(path)?)),
        None => None,
    };
    let mut blocks = decode_input(args.file.as_deref())?;

    let min_speed = args.min_speed.unwrap_or(config.analysis.min_speed_kts);
    let t_min = args.since.or(config.analysis.t_min);
    let t_max = args.until.or(config.analysis.t_max);

    if t_min.is_some() || t_max.is_some() {
        for block in &mut blocks {
            racemath::clean_moments(
                &mut block.moments,
                t_min.unwrap_or(0),
                t_max.unwrap_or(u32::MAX),
            );
        }
    }

    let rows: Vec<_> = blocks
        .iter()
        .map(|b| summarize(b, min_speed, course.as_ref()))
        .collect();

    let total: usize = blocks.iter().map(|b| b.len()).sum();
    println!();
    println!("Vessels: {}, moments: {total}", blocks.len());
    if let Some(course) = &course {
        println!(
            "Course: {} waypoints, {:.1} nm",
            course.nodes.len(),
            course.distance_nm()
        );
    }
    println!();

    if rows.is_empty() {
        return Ok(());
    }
    println!("{}", render::summary_table(&rows));
    Ok(())
}

fn summarize<'a>(
    block: &'a VesselBlock,
    min_speed: f64,
    course: Option<&Course>,
) -> render::SummaryRow<'a> {
    let analysis = racemath::analyze(&block.moments, min_speed);
    let best = |window| {
        racemath::best_run(&racemath::calc_tdist(
            &block.moments,
            &analysis,
            window,
            racemath::RUN_TOLERANCE,
        ))
    };
    let day = best(racemath::DAY_SECS);
    let week = best(racemath::WEEK_SECS);
    let progress = course.and_then(|c| {
        racemath::calc_dtf(&block.moments, c)
            .first()
            .copied()
            .flatten()
    });

    render::SummaryRow {
        block,
        analysis,
        day,
        week,
        progress,
    }
}

fn cmd_config(config: &Config, path: Option<&Path>, init: bool) -> Result<()> {
    if init {
        let written = match path {
            Some(p) => {
                config::save_config_to(&Config::default(), p)?;
                p.to_path_buf()
            }
            None => config::save_config(&Config::default())?,
        };
        println!("Wrote {}", written.display());
        return Ok(());
    }

    let shown = path.map(Path::to_path_buf).unwrap_or_else(config::config_file);
    if !shown.exists() {
        warn!(path = %shown.display(), "config file not found, using defaults");
    }
    println!("# {}", shown.display());
    print!("{}", config::serialize_config(config));
    Ok(())
}
