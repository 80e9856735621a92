//! molz command line
//!
//! Exports a session snapshot file into a `.molz` scene archive and, with
//! `--upload`, sends it to the viewer service.
//!
//! ## Configuration
//!
//! Environment variables (see [`ExportConfig::from_env`] for the full list):
//! - `MOLZ_OUTPUT_DIR`: Archive directory (default: current directory)
//! - `NANOME_LOGIN` / `NANOME_PASSWORD`: Credentials for `--upload`
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: pretty)
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin molz --features cli,upload -- session.json --upload
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use molz_export::{ExportConfig, ExportReport, Exporter, SessionSnapshot, SessionSource, SnapshotError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Parser)]
#[command(
    name = "molz",
    about = "Export a session snapshot into a .molz scene archive",
    version
)]
struct Cli {
    /// Session snapshot (JSON, schema molz-session/1)
    #[arg(value_name = "SNAPSHOT")]
    snapshot: PathBuf,

    /// Archive name (default: snapshot file stem)
    #[arg(short, long)]
    name: Option<String>,

    /// Directory the archive is written to
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Present-atom count from which molecules are written as mmCIF
    #[arg(long, value_name = "ATOMS")]
    threshold: Option<usize>,

    /// Upload the archive after export
    #[arg(long)]
    upload: bool,

    /// Log output format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
}

/// Session source backed by a snapshot file.
struct SnapshotFile<'a>(&'a Path);

impl SessionSource for SnapshotFile<'_> {
    fn snapshot(&self) -> Result<SessionSnapshot, SnapshotError> {
        let bytes = std::fs::read(self.0)
            .map_err(|e| SnapshotError::Unavailable(format!("{}: {e}", self.0.display())))?;
        SessionSnapshot::from_json_slice(&bytes)
    }
}

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "molz=info,molz_export=info".into());

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .flatten_event(true),
            )
            .init(),
    }
}

#[cfg(feature = "upload")]
async fn upload(config: &ExportConfig, report: &ExportReport) -> Result<(), Box<dyn std::error::Error>> {
    use molz_export::upload::{Credentials, NanomeUploader, SceneDelivery};

    let login = std::env::var("NANOME_LOGIN").map_err(|_| "NANOME_LOGIN is not set")?;
    let password = std::env::var("NANOME_PASSWORD").map_err(|_| "NANOME_PASSWORD is not set")?;

    let delivery = SceneDelivery::new(
        NanomeUploader::from_config(config)?,
        Credentials::new(login, password),
    )
    .with_retention(config.retention);
    let delivered = delivery.deliver(&report.archive).await?;
    info!(
        archive = %delivered.archive.display(),
        archive_deleted = delivered.archive_deleted,
        "Successfully sent the session"
    );
    Ok(())
}

#[cfg(not(feature = "upload"))]
async fn upload(_: &ExportConfig, _: &ExportReport) -> Result<(), Box<dyn std::error::Error>> {
    Err("this binary was built without the `upload` feature".into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = ExportConfig::from_env();
    if let Some(dir) = cli.output_dir {
        config = config.with_output_dir(dir);
    }
    if let Some(threshold) = cli.threshold {
        config = config.with_threshold(threshold);
    }

    let name = match cli.name {
        Some(name) => name,
        None => cli
            .snapshot
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or("cannot derive an archive name from the snapshot path")?,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        snapshot = %cli.snapshot.display(),
        name = %name,
        "Starting export"
    );

    let exporter = Exporter::with_site_writer(config.clone());
    let handle = exporter.spawn_export(&SnapshotFile(&cli.snapshot), &name)?;
    let report = match handle.wait().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Export failed");
            return Err(e.into());
        }
    };

    println!("{}", report.archive.path.display());

    if cli.upload {
        upload(&config, &report).await?;
    }

    Ok(())
}
