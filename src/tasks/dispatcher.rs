//! Composite + print stage run after a session completes.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Local;
use tracing::{debug, error, info};

use crate::config::PrintConfig;
use crate::platform::printer::{PrintOptions, PrintService};
use crate::processing::composite::{CompositeArtifact, CompositeBuilder};
use crate::session::FinalizedSession;

pub struct PrintDispatcher {
    service: Option<Arc<dyn PrintService>>,
    job_name: String,
    options: PrintOptions,
}

impl PrintDispatcher {
    pub fn new(service: Option<Arc<dyn PrintService>>, cfg: &PrintConfig) -> Self {
        Self {
            service,
            job_name: cfg.job_name.clone(),
            options: PrintOptions::from(cfg),
        }
    }

    pub fn disabled(cfg: &PrintConfig) -> Self {
        Self::new(None, cfg)
    }

    pub fn is_available(&self) -> bool {
        self.service.is_some()
    }

    /// Hand the composite to the spooler. Never retries; returns the job id on success.
    pub fn submit(&self, artifact: Option<&CompositeArtifact>) -> Option<String> {
        let Some(artifact) = artifact else {
            debug!("no composite to print");
            return None;
        };
        let Some(service) = &self.service else {
            info!(
                path = %artifact.output_path.display(),
                "no printer available; composite saved only"
            );
            return None;
        };
        match service.submit(&artifact.output_path, &self.job_name, &self.options) {
            Ok(job_id) => {
                info!(job_id = %job_id, path = %artifact.output_path.display(), "print job submitted");
                Some(job_id)
            }
            Err(err) => {
                error!(path = %artifact.output_path.display(), "print failed: {err}");
                None
            }
        }
    }
}

/// Runs composite building and printing off the controller thread.
#[derive(Clone)]
pub struct Finalizer {
    builder: Arc<CompositeBuilder>,
    dispatcher: Arc<PrintDispatcher>,
}

impl Finalizer {
    pub fn new(builder: CompositeBuilder, dispatcher: PrintDispatcher) -> Self {
        Self {
            builder: Arc::new(builder),
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn can_print(&self) -> bool {
        self.dispatcher.is_available()
    }

    /// Composite and print on the calling thread. Returns the print job id, if any.
    pub fn finalize(&self, session: &FinalizedSession) -> Option<String> {
        if session.storage_target.is_ephemeral() {
            info!(session = %session.id, "ephemeral session; nothing to compose or print");
            return None;
        }
        match self.builder.build(session, Local::now()) {
            Ok(artifact) => self.dispatcher.submit(artifact.as_ref()),
            Err(err) => {
                error!(session = %session.id, "composite failed: {err:#}");
                None
            }
        }
    }

    pub fn spawn(&self, session: FinalizedSession) -> io::Result<JoinHandle<Option<String>>> {
        let this = self.clone();
        thread::Builder::new()
            .name(format!("finalize-{}", session.id))
            .spawn(move || this.finalize(&session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompositeConfig;
    use crate::error::PrintError;
    use crate::processing::layout::{LayoutParams, compute_strip_layout};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPrinter {
        jobs: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl PrintService for RecordingPrinter {
        fn submit(
            &self,
            file: &Path,
            _job_name: &str,
            _options: &PrintOptions,
        ) -> Result<String, PrintError> {
            self.jobs.lock().unwrap().push(file.to_path_buf());
            if self.fail {
                Err(PrintError::MissingJobId(String::new()))
            } else {
                Ok("booth-1".to_string())
            }
        }
    }

    fn artifact() -> CompositeArtifact {
        let cfg = CompositeConfig::default();
        let layout = compute_strip_layout(4, 3, 3, &LayoutParams::from(&cfg)).unwrap();
        CompositeArtifact {
            layout,
            output_path: PathBuf::from("/tmp/strip.jpg"),
        }
    }

    #[test]
    fn missing_artifact_is_a_no_op() {
        let printer = Arc::new(RecordingPrinter::default());
        let dispatcher = PrintDispatcher::new(Some(printer.clone()), &PrintConfig::default());
        assert_eq!(dispatcher.submit(None), None);
        assert!(printer.jobs.lock().unwrap().is_empty());
    }

    #[test]
    fn submits_once_and_reports_job_id() {
        let printer = Arc::new(RecordingPrinter::default());
        let dispatcher = PrintDispatcher::new(Some(printer.clone()), &PrintConfig::default());
        assert_eq!(dispatcher.submit(Some(&artifact())), Some("booth-1".to_string()));
        assert_eq!(printer.jobs.lock().unwrap().len(), 1);
    }

    #[test]
    fn failure_is_not_retried() {
        let printer = Arc::new(RecordingPrinter {
            fail: true,
            ..Default::default()
        });
        let dispatcher = PrintDispatcher::new(Some(printer.clone()), &PrintConfig::default());
        assert_eq!(dispatcher.submit(Some(&artifact())), None);
        assert_eq!(printer.jobs.lock().unwrap().len(), 1);
    }

    #[test]
    fn without_printer_nothing_is_submitted() {
        let dispatcher = PrintDispatcher::disabled(&PrintConfig::default());
        assert!(!dispatcher.is_available());
        assert_eq!(dispatcher.submit(Some(&artifact())), None);
    }
}
