//! Locates removable media to keep session files on.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::StorageConfig;

pub trait StorageProbe: Send {
    /// Writable session directory on removable media, if any is attached.
    fn find_writable_removable_path(&self) -> Option<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct MountProbe {
    roots: Vec<PathBuf>,
    subdirectory: String,
    require_mount_point: bool,
    fallback: Option<PathBuf>,
}

const PROBE_FILE: &str = ".photo-booth-probe";

impl MountProbe {
    pub fn new(cfg: &StorageConfig) -> Self {
        Self {
            roots: cfg.mount_roots.clone(),
            subdirectory: cfg.subdirectory.clone(),
            require_mount_point: cfg.require_mount_point,
            fallback: cfg.fallback_path.clone(),
        }
    }

    fn candidates(&self, root: &Path) -> Vec<PathBuf> {
        // /media/<mount> and /media/<user>/<mount>
        WalkDir::new(root)
            .min_depth(1)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
            .filter(|path| !self.require_mount_point || is_mount_point(path))
            .collect()
    }
}

impl StorageProbe for MountProbe {
    fn find_writable_removable_path(&self) -> Option<PathBuf> {
        for root in &self.roots {
            for mount in self.candidates(root) {
                let target = mount.join(&self.subdirectory);
                match ensure_writable(&target) {
                    Ok(()) => {
                        info!(path = %target.display(), "using removable storage");
                        return Some(target);
                    }
                    Err(err) => {
                        debug!(path = %target.display(), error = %err, "storage candidate not writable");
                    }
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            match ensure_writable(fallback) {
                Ok(()) => {
                    info!(path = %fallback.display(), "no removable storage; using fallback directory");
                    return Some(fallback.clone());
                }
                Err(err) => {
                    warn!(path = %fallback.display(), error = %err, "fallback storage not writable");
                }
            }
        }

        warn!("no writable storage found; session will not be saved or printed");
        None
    }
}

fn is_mount_point(path: &Path) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    match (fs::metadata(path), fs::metadata(parent)) {
        (Ok(own), Ok(parent)) => own.dev() != parent.dev(),
        _ => false,
    }
}

fn ensure_writable(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(PROBE_FILE);
    fs::write(&probe, b"ok")?;
    fs::remove_file(&probe)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(root: &Path) -> StorageConfig {
        StorageConfig {
            mount_roots: vec![root.to_path_buf()],
            require_mount_point: false,
            ..StorageConfig::default()
        }
    }

    #[test]
    fn finds_first_writable_mount_and_creates_subdirectory() {
        let media = tempfile::tempdir().unwrap();
        fs::create_dir_all(media.path().join("pi/USB_A")).unwrap();
        fs::create_dir_all(media.path().join("pi/USB_B")).unwrap();
        let probe = MountProbe::new(&config(media.path()));

        let found = probe.find_writable_removable_path().unwrap();
        // depth-1 `pi` sorts first and is writable in a temp dir
        assert_eq!(found, media.path().join("pi/photobooth_images"));
        assert!(found.is_dir());
        assert!(!found.join(PROBE_FILE).exists());
    }

    #[test]
    fn no_media_and_no_fallback_is_none() {
        let media = tempfile::tempdir().unwrap();
        let probe = MountProbe::new(&config(media.path()));
        assert_eq!(probe.find_writable_removable_path(), None);
    }

    #[test]
    fn missing_root_uses_fallback() {
        let media = tempfile::tempdir().unwrap();
        let fallback = media.path().join("home/booth");
        let mut cfg = config(&media.path().join("absent"));
        cfg.fallback_path = Some(fallback.clone());
        let probe = MountProbe::new(&cfg);
        assert_eq!(probe.find_writable_removable_path(), Some(fallback));
    }

    #[test]
    fn plain_directories_are_not_mount_points() {
        let media = tempfile::tempdir().unwrap();
        fs::create_dir_all(media.path().join("stick")).unwrap();
        let mut cfg = config(media.path());
        cfg.require_mount_point = true;
        let probe = MountProbe::new(&cfg);
        assert_eq!(probe.find_writable_removable_path(), None);
    }
}
