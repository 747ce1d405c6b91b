//! CUPS print queue access through the `lp`/`lpstat` command line tools.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::{ColorMode, PrintConfig, PrintOrientation};
use crate::error::PrintError;
use crate::platform::command::{CommandRunner, default_runner};

/// Fixed per-job options sent with every composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    pub media_size: String,
    pub orientation: PrintOrientation,
    pub resolution: String,
    pub color_mode: ColorMode,
}

impl From<&PrintConfig> for PrintOptions {
    fn from(cfg: &PrintConfig) -> Self {
        Self {
            media_size: cfg.media.clone(),
            orientation: cfg.orientation,
            resolution: cfg.resolution.clone(),
            color_mode: cfg.color_mode,
        }
    }
}

pub trait PrintService: Send + Sync {
    /// Queue `file`; returns the spooler's job id.
    fn submit(&self, file: &Path, job_name: &str, options: &PrintOptions)
    -> Result<String, PrintError>;
}

pub struct LpPrinter {
    printer: String,
    runner: CommandRunner,
}

impl LpPrinter {
    pub fn new(printer: impl Into<String>, runner: CommandRunner) -> Self {
        Self {
            printer: printer.into(),
            runner,
        }
    }

    /// Resolve the queue to print on. `None` when printing is disabled or
    /// CUPS has no queue; the booth then saves photos without printing.
    pub fn discover(cfg: &PrintConfig) -> Option<Self> {
        Self::discover_with(cfg, default_runner())
    }

    pub fn discover_with(cfg: &PrintConfig, runner: CommandRunner) -> Option<Self> {
        if !cfg.enabled {
            info!("printing disabled in configuration");
            return None;
        }
        if let Some(name) = &cfg.printer {
            info!(printer = %name, "using configured printer");
            return Some(Self::new(name.clone(), runner));
        }
        match runner("lpstat", &["-a".to_string()]) {
            Ok(output) if output.success => match first_queue(&output.stdout) {
                Some(name) => {
                    info!(printer = %name, "printer found");
                    Some(Self::new(name, runner))
                }
                None => {
                    warn!("no printers found; photos will be saved but not printed");
                    None
                }
            },
            Ok(output) => {
                warn!(
                    detail = output.failure_detail(),
                    "printing system unavailable; photos will be saved but not printed"
                );
                None
            }
            Err(err) => {
                warn!(error = %err, "failed to query CUPS; photos will be saved but not printed");
                None
            }
        }
    }

    pub fn printer(&self) -> &str {
        &self.printer
    }

    fn lp_args(&self, file: &Path, job_name: &str, options: &PrintOptions) -> Vec<String> {
        vec![
            "-d".to_string(),
            self.printer.clone(),
            "-t".to_string(),
            job_name.to_string(),
            "-o".to_string(),
            format!("media={}", options.media_size),
            "-o".to_string(),
            format!("orientation-requested={}", options.orientation.ipp_value()),
            "-o".to_string(),
            format!("printer-resolution={}", options.resolution),
            "-o".to_string(),
            format!("print-color-mode={}", options.color_mode.as_str()),
            "--".to_string(),
            file.to_string_lossy().into_owned(),
        ]
    }
}

impl PrintService for LpPrinter {
    fn submit(
        &self,
        file: &Path,
        job_name: &str,
        options: &PrintOptions,
    ) -> Result<String, PrintError> {
        let args = self.lp_args(file, job_name, options);
        debug!(printer = %self.printer, ?args, "submitting print job");
        let output = (self.runner)("lp", &args)?;
        if !output.success {
            return Err(PrintError::Command {
                command: format!("lp {}", args.join(" ")),
                detail: output.failure_detail(),
            });
        }
        parse_job_id(&output.stdout).ok_or_else(|| PrintError::MissingJobId(output.stdout.clone()))
    }
}

/// `lpstat -a` prints one `<queue> accepting requests since ...` line per queue.
fn first_queue(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .next()
}

/// `lp` answers `request id is <job-id> (1 file(s))`.
fn parse_job_id(stdout: &str) -> Option<String> {
    let rest = stdout.split("request id is").nth(1)?;
    rest.split_whitespace().next().map(str::to_string)
}
