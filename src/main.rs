//! IDIFF command-line interface.
//!
//! This is the main entry point for the idiff CLI tool. It uses clap for
//! argument parsing, merges flags over the optional settings file, and runs
//! the comparison on a tokio runtime that also listens for Ctrl-C.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use idiff_rs::config::{discover_settings, Settings};
use idiff_rs::filter::FilterConfig;
use idiff_rs::{
    diff_images, format_report, AcquireOptions, BackendPreference, DiffOptions, DiffRequest,
    OutputFormat, OutputOptions, WalkDepth, DEFAULT_DIFFERS,
};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// IDIFF - Container image diff tool
///
/// Compares the build history, filesystem and installed packages of two
/// images. Images may be local image ids, registry references or saved tar
/// archives.
#[derive(Parser)]
#[command(name = "idiff-rs")]
#[command(version)]
#[command(about = "Container image diff tool", long_about = None)]
struct Cli {
    /// First image (local id, registry reference or tar archive)
    #[arg(value_name = "IMAGE1")]
    image1: String,

    /// Second image
    #[arg(value_name = "IMAGE2")]
    image2: String,

    /// Differ to run (hist, history, file, apt, apk, linux, pip, node); repeatable
    #[arg(short = 't', long = "type", value_name = "KIND")]
    types: Vec<String>,

    /// Output format
    #[arg(short = 'f', long, value_enum)]
    format: Option<OutputFormatArg>,

    /// Only compare top-level filesystem entries
    #[arg(long)]
    shallow: bool,

    /// Shell out to the client binary instead of using the daemon API
    #[arg(long)]
    cli_client: bool,

    /// Client binary used for shell-out (docker, podman, ...)
    #[arg(long, value_name = "BIN")]
    client_binary: Option<String>,

    /// Timeout in seconds for acquiring each image
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Directory to extract images under (defaults to the system temp dir)
    #[arg(long, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,

    /// Ignore filesystem paths matching PATTERN; repeatable
    #[arg(long, value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Only report filesystem paths matching PATTERN; repeatable
    #[arg(long, value_name = "PATTERN")]
    only: Vec<String>,

    /// Settings file (TOML, YAML or JSON)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Omit the summary line
    #[arg(long)]
    no_summary: bool,

    /// Print sizes as raw byte counts
    #[arg(long)]
    raw_sizes: bool,

    /// Verbose output (debug logging on stderr)
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only, suppress summary)
    #[arg(short, long)]
    quiet: bool,
}

/// Output format argument for clap
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormatArg {
    /// Colored terminal output
    Terminal,
    /// JSON representation
    Json,
    /// YAML representation
    Yaml,
    /// Plain text (no colors)
    Plain,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Terminal => OutputFormat::Terminal,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Yaml => OutputFormat::Yaml,
            OutputFormatArg::Plain => OutputFormat::Plain,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli) {
        Ok(exit_code) => process::exit(exit_code),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            process::exit(2);
        }
    }
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "idiff_rs=debug"
    } else if cli.quiet {
        "idiff_rs=error"
    } else {
        "idiff_rs=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

/// Resolved invocation: CLI flags over settings over defaults.
struct Invocation {
    request: DiffRequest,
    format: OutputFormat,
    output: OutputOptions,
}

fn resolve(cli: Cli, settings: Settings) -> Invocation {
    let differs = if !cli.types.is_empty() {
        cli.types
    } else {
        settings
            .differs
            .unwrap_or_else(|| DEFAULT_DIFFERS.iter().map(|s| s.to_string()).collect())
    };

    let defaults = AcquireOptions::default();
    let acquire = AcquireOptions {
        backend: if cli.cli_client {
            BackendPreference::Cli
        } else {
            settings.backend.unwrap_or(defaults.backend)
        },
        client_binary: cli
            .client_binary
            .or(settings.client_binary)
            .unwrap_or(defaults.client_binary),
        timeout: cli
            .timeout
            .or(settings.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
        scratch_dir: cli.scratch_dir.or(settings.scratch_dir),
    };

    let filter = settings
        .ignore
        .iter()
        .chain(&cli.ignore)
        .fold(FilterConfig::new(), |filter, pattern| filter.ignore(pattern));
    let filter = settings
        .only
        .iter()
        .chain(&cli.only)
        .fold(filter, |filter, pattern| filter.only(pattern));

    let diff = DiffOptions {
        depth: if cli.shallow {
            WalkDepth::Shallow
        } else {
            settings.depth.unwrap_or_default()
        },
        filter,
    };

    Invocation {
        request: DiffRequest {
            image1: cli.image1,
            image2: cli.image2,
            differs,
            acquire,
            diff,
        },
        format: cli
            .format
            .map(OutputFormat::from)
            .or(settings.format)
            .unwrap_or(OutputFormat::Terminal),
        output: OutputOptions {
            summary: !(cli.no_summary || cli.quiet),
            human_sizes: !cli.raw_sizes,
        },
    }
}

fn run(cli: Cli) -> Result<i32> {
    let settings = discover_settings(cli.config.as_deref())
        .context("Failed to load settings")?
        .unwrap_or_default();

    let Invocation {
        request,
        format,
        output,
    } = resolve(cli, settings);
    let (image1, image2) = (request.image1.clone(), request.image2.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let report = runtime.block_on(async {
        tokio::select! {
            result = diff_images(request) => result
                .with_context(|| format!("Failed to compare {} and {}", image1, image2)),
            _ = tokio::signal::ctrl_c() => Err(anyhow!("Interrupted")),
        }
    })?;

    let rendered = format_report(&report, &format, &output).context("Failed to format diff output")?;
    println!("{}", rendered);

    if report.is_empty() {
        Ok(0)
    } else {
        Ok(1)
    }
}
