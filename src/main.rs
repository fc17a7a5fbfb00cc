use anyhow::{Result, bail};
use clap::Parser;
use impact_reflectance_lut::{
    LookupTableConfig, generate_lookup_table_files,
    validation::{self, ValidationReport},
};
use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    time::Instant,
};

/// Smallest roughness of the texels compared with the quadrature reference.
const VALIDATION_MIN_ALPHA: f32 = 0.25;

/// Largest accepted deviation from the quadrature reference.
const VALIDATION_TOLERANCE: f32 = 0.02;

#[derive(Debug, Parser)]
#[command(
    about = "Generate a lookup table of the GGX hemispherical-directional reflectance",
    long_about = None
)]
struct Args {
    /// Path to RON configuration file to use
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of texels along the view angle axis
    #[arg(long)]
    width: Option<u32>,

    /// Number of texels along the roughness axis
    #[arg(long)]
    height: Option<u32>,

    /// Number of worker threads
    #[arg(short, long)]
    threads: Option<NonZeroUsize>,

    /// Number of Monte Carlo samples per texel
    #[arg(short, long)]
    samples: Option<NonZeroU32>,

    /// Where to write the DDS texture
    #[arg(long)]
    dds_output: Option<PathBuf>,

    /// Where to write the C++ header
    #[arg(long)]
    source_output: Option<PathBuf>,

    /// Prefix for the identifiers in the C++ header
    #[arg(long)]
    prefix: Option<String>,

    /// Skip writing the DDS texture
    #[arg(long, conflicts_with = "dds_output")]
    no_dds: bool,

    /// Skip writing the C++ header
    #[arg(long, conflicts_with = "source_output")]
    no_source: bool,

    /// Compare every `validate`th texel in each direction with a quadrature
    /// of the same integral
    #[arg(long)]
    validate: Option<NonZeroU32>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let config = resolve_config(&args)?;
    log::debug!("Using configuration {config:?}");

    let table = generate_lookup_table_files(&config)?;

    if let Some(stride) = args.validate {
        let start_time = Instant::now();
        let report = validation::validate_lookup_table(&table, VALIDATION_MIN_ALPHA, stride);
        log::info!(
            "Validation took {:.2} ms",
            start_time.elapsed().as_secs_f64() * 1e3
        );
        check_validation_report(&report)?;
    }

    Ok(())
}

fn resolve_config(args: &Args) -> Result<LookupTableConfig> {
    let mut config = match &args.config {
        Some(config_path) => LookupTableConfig::from_ron_file(config_path)?,
        None => LookupTableConfig::default(),
    };

    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(n_worker_threads) = args.threads {
        config.n_worker_threads = n_worker_threads;
    }
    if let Some(sample_count) = args.samples {
        config.integration.sample_count = sample_count;
    }
    if let Some(dds_output) = &args.dds_output {
        config.output.dds_file_path = Some(dds_output.clone());
    }
    if let Some(source_output) = &args.source_output {
        config.output.source_file_path = Some(source_output.clone());
    }
    if let Some(prefix) = &args.prefix {
        config.output.identifier_prefix.clone_from(prefix);
    }
    if args.no_dds {
        config.output.dds_file_path = None;
    }
    if args.no_source {
        config.output.source_file_path = None;
    }

    config.validate()?;
    Ok(config)
}

fn check_validation_report(report: &ValidationReport) -> Result<()> {
    log::info!(
        "Validated {} texels: max f0 deviation {:.5}, max f90 deviation {:.5}, worst texel {:?}",
        report.n_validated_texels,
        report.max_f0_deviation,
        report.max_f90_deviation,
        report.worst_texel
    );
    if report.max_deviation() > VALIDATION_TOLERANCE {
        bail!(
            "Lookup table deviates from quadrature by {:.5} (tolerance {})",
            report.max_deviation(),
            VALIDATION_TOLERANCE
        );
    }
    Ok(())
}
