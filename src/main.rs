use std::path::{Path, PathBuf};
use std::process::ExitCode;
use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};

use defuse::config::{DEFAULT_MAX_CPU_TIME, DEFAULT_MAX_FILESIZE, DEFAULT_MAX_MEMORY};
use defuse::{ReportDatabase, ResourceLimits, ScanConfiguration, ScanCoordinator};

const EXIT_SAFE: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_DANGEROUS: u8 = 2;

/// Scan zip archives for zip bombs, nested archive bombs, directory
/// traversal and symlinks before extracting them.
///
/// Exit status: 0 when every archive is safe, 2 when at least one is
/// dangerous, 1 on usage or I/O errors.
#[derive(Parser, Debug)]
#[command(name = "defuse", version)]
struct Cli {
    /// Zip archive, or a directory whose top-level .zip files are scanned
    #[arg(short, long)]
    file: PathBuf,

    /// TOML or YAML file with scan settings; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Compression ratio above which an archive is ruled malicious
    #[arg(long)]
    ratio_threshold: Option<f64>,

    /// Total nested archives allowed (0 = unlimited)
    #[arg(long)]
    nested_zips_limit: Option<u32>,

    /// Nesting depth allowed (0 = unlimited)
    #[arg(long)]
    nested_levels_limit: Option<u32>,

    /// Seconds allowed for traversing an archive before the killswitch fires
    #[arg(long)]
    killswitch_seconds: Option<u64>,

    #[arg(long)]
    symlinks_allowed: bool,

    #[arg(long)]
    directory_traversal_allowed: bool,

    /// Extract safe archives under resource limits
    #[arg(long, requires = "destination")]
    safe_extract: bool,

    /// Extraction target directory
    #[arg(short, long)]
    destination: Option<PathBuf>,

    /// CPU seconds allowed for an extraction
    #[arg(long, default_value_t = DEFAULT_MAX_CPU_TIME)]
    max_cpu_time: u64,

    /// Address space in bytes allowed during an extraction
    #[arg(long, default_value_t = DEFAULT_MAX_MEMORY)]
    max_memory: u64,

    /// Largest single file in bytes an extraction may write
    #[arg(long, default_value_t = DEFAULT_MAX_FILESIZE)]
    max_filesize: u64,

    /// Archives scanned concurrently in directory mode
    #[arg(short, long, default_value_t = num_cpus::get())]
    jobs: usize,

    /// Write every outcome to this JSON file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print each report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn scan_configuration(&self) -> Result<ScanConfiguration> {
        let mut config = match &self.config {
            Some(path) => ScanConfiguration::load(path)?,
            None => ScanConfiguration::default(),
        };

        if let Some(ratio) = self.ratio_threshold {
            config.ratio_threshold = ratio;
        }
        if let Some(limit) = self.nested_zips_limit {
            config.nested_zips_limit = limit;
        }
        if let Some(limit) = self.nested_levels_limit {
            config.nested_levels_limit = limit;
        }
        if let Some(seconds) = self.killswitch_seconds {
            config.killswitch_seconds = seconds;
        }
        config.symlinks_allowed |= self.symlinks_allowed;
        config.directory_traversal_allowed |= self.directory_traversal_allowed;

        config.validate()?;
        Ok(config)
    }

    fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_cpu_time: Some(self.max_cpu_time),
            max_memory: Some(self.max_memory),
            max_filesize: Some(self.max_filesize),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if let Err(e) = defuse::logging::init(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("{:#}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    match run(&cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn run(cli: &Cli) -> Result<u8> {
    let config = cli.scan_configuration()?;
    debug!("Scan configuration: {:?}", config);

    let batch = cli.file.is_dir();
    let progress = if batch {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")?,
        );
        bar.set_message("Scanning archives...");
        bar
    } else {
        ProgressBar::hidden()
    };

    let coordinator = ScanCoordinator::new(&cli.file, config, cli.jobs);
    let outcomes = coordinator.run(progress).await?;
    if outcomes.is_empty() {
        return Err(anyhow::anyhow!("No zip archives found in {}", cli.file.display()));
    }

    let limits = cli.resource_limits();
    let mut db = open_report_database(cli.report.as_deref())?;
    let mut any_dangerous = false;
    let mut any_failed = false;

    for outcome in &outcomes {
        if db.get(&outcome.path).is_some() {
            debug!("Replacing earlier record for {}", outcome.path.display());
        }

        let session = match &outcome.session {
            Ok(session) => session,
            Err(e) => {
                error!("{}: {}", outcome.path.display(), e);
                db.record_failure(&outcome.path, &e.to_string());
                any_failed = true;
                continue;
            }
        };

        session.output()?;
        let report = session.report()?;
        db.record_report(&outcome.path, report);
        if cli.json {
            println!("{}", serde_json::to_string(report)?);
        }

        if report.dangerous {
            any_dangerous = true;
            if cli.safe_extract {
                warn!("Not extracting dangerous archive {}", outcome.path.display());
            }
            continue;
        }

        if let (true, Some(destination)) = (cli.safe_extract, &cli.destination) {
            let target = extraction_target(destination, &outcome.path, batch);
            match session.safe_extract(&target, &limits) {
                Ok(true) => info!("Extracted {} to {}", outcome.path.display(), target.display()),
                Ok(false) => {
                    warn!("Extraction of {} stopped by resource limits", outcome.path.display());
                    any_failed = true;
                }
                Err(e) => {
                    error!("Extraction of {} failed: {}", outcome.path.display(), e);
                    any_failed = true;
                }
            }
        }
    }

    if let Some(path) = &cli.report {
        db.save(path)?;
        let stats = db.get_stats();
        info!(
            "Report {} holds {} archives: {} safe, {} dangerous, {} failed",
            path.display(),
            stats.total,
            stats.safe,
            stats.dangerous,
            stats.failed
        );
    }

    Ok(if any_dangerous {
        EXIT_DANGEROUS
    } else if any_failed {
        EXIT_ERROR
    } else {
        EXIT_SAFE
    })
}

/// Earlier runs recorded in `path` are kept; archives scanned again replace
/// their entry.
fn open_report_database(path: Option<&Path>) -> Result<ReportDatabase> {
    match path {
        Some(path) => ReportDatabase::load_or_create(path),
        None => Ok(ReportDatabase::default()),
    }
}

/// Directory mode extracts each archive into its own subdirectory.
fn extraction_target(destination: &Path, archive: &Path, batch: bool) -> PathBuf {
    match (batch, archive.file_stem()) {
        (true, Some(stem)) => destination.join(stem),
        _ => destination.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_extract_requires_destination() {
        let result = Cli::try_parse_from(["defuse", "--file", "a.zip", "--safe-extract"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "defuse",
            "--file",
            "a.zip",
            "--ratio-threshold",
            "10",
            "--nested-zips-limit",
            "0",
            "--symlinks-allowed",
        ])
        .unwrap();

        let config = cli.scan_configuration().unwrap();
        assert_eq!(config.ratio_threshold, 10.0);
        assert_eq!(config.nested_zips_limit(), None);
        assert!(config.symlinks_allowed);
        assert!(!config.directory_traversal_allowed);
        assert_eq!(config.killswitch_seconds, 3);
    }

    #[test]
    fn test_report_database_keeps_earlier_runs() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let report_path = temp_dir.path().join("reports.json");
        assert!(open_report_database(Some(&report_path)).unwrap().archives.is_empty());

        let mut earlier = ReportDatabase::default();
        earlier.record_failure(Path::new("old.zip"), "archive not found");
        earlier.save(&report_path).unwrap();

        let mut db = open_report_database(Some(&report_path)).unwrap();
        db.record_failure(Path::new("new.zip"), "not a readable zip archive");
        assert!(db.get(Path::new("old.zip")).is_some());
        assert_eq!(db.get_stats().total, 2);

        assert!(open_report_database(None).unwrap().archives.is_empty());
    }

    #[test]
    fn test_extraction_target() {
        let destination = Path::new("/out");
        assert_eq!(
            extraction_target(destination, Path::new("/in/bomb.zip"), true),
            PathBuf::from("/out/bomb")
        );
        assert_eq!(
            extraction_target(destination, Path::new("/in/bomb.zip"), false),
            PathBuf::from("/out")
        );
    }
}
