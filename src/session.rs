//! Data owned by the session controller for one coin-to-print cycle.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use image::RgbaImage;

/// Where a session keeps its files. Chosen once when the session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    Durable(PathBuf),
    /// No writable medium: shots are shown on screen and then forgotten.
    Ephemeral,
}

impl StorageTarget {
    pub fn from_probe(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => StorageTarget::Durable(path),
            None => StorageTarget::Ephemeral,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            StorageTarget::Durable(path) => Some(path),
            StorageTarget::Ephemeral => None,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, StorageTarget::Ephemeral)
    }
}

/// Decoded image ready to be drawn by the display layer.
#[derive(Clone)]
pub struct DisplayHandle(Arc<RgbaImage>);

impl DisplayHandle {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }
}

impl fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "DisplayHandle({w}x{h})")
    }
}

#[derive(Debug, Clone)]
pub struct Shot {
    /// 1-based position within the session.
    pub index: usize,
    /// Enhanced image on disk; `None` for ephemeral sessions.
    pub processed_path: Option<PathBuf>,
    pub display: DisplayHandle,
}

/// The active session. Shots are append-only and bounded by `total_shots`.
#[derive(Debug)]
pub struct Session {
    id: String,
    storage_target: StorageTarget,
    total_shots: usize,
    shots: Vec<Shot>,
    pub(crate) countdown_remaining: u32,
}

impl Session {
    pub fn new(id: String, storage_target: StorageTarget, total_shots: usize, countdown: u32) -> Self {
        Self {
            id,
            storage_target,
            total_shots,
            shots: Vec::with_capacity(total_shots),
            countdown_remaining: countdown,
        }
    }

    pub fn id_for(started_at: DateTime<Local>) -> String {
        started_at.format("%Y%m%d_%H%M%S").to_string()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn storage_target(&self) -> &StorageTarget {
        &self.storage_target
    }

    pub fn shots(&self) -> &[Shot] {
        &self.shots
    }

    pub fn total_shots(&self) -> usize {
        self.total_shots
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    /// Index the next captured shot will receive.
    pub fn next_index(&self) -> usize {
        self.shots.len() + 1
    }

    pub fn is_complete(&self) -> bool {
        self.shots.len() == self.total_shots
    }

    /// Appends a shot; returns it back when the session is already full or
    /// the shot is out of order.
    pub(crate) fn push_shot(&mut self, shot: Shot) -> Result<(), Shot> {
        if self.is_complete() || shot.index != self.next_index() {
            return Err(shot);
        }
        self.shots.push(shot);
        Ok(())
    }

    /// Owned copy of what the composite and print stages need.
    pub fn finalize(&self) -> FinalizedSession {
        FinalizedSession {
            id: self.id.clone(),
            storage_target: self.storage_target.clone(),
            shots: self
                .shots
                .iter()
                .map(|shot| FinalizedShot {
                    index: shot.index,
                    processed_path: shot.processed_path.clone(),
                })
                .collect(),
        }
    }
}

/// Snapshot of a completed session handed to the composite/print worker.
/// Holds no reference into the live session.
#[derive(Debug, Clone)]
pub struct FinalizedSession {
    pub id: String,
    pub storage_target: StorageTarget,
    pub shots: Vec<FinalizedShot>,
}

#[derive(Debug, Clone)]
pub struct FinalizedShot {
    pub index: usize,
    pub processed_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shot(index: usize) -> Shot {
        Shot {
            index,
            processed_path: None,
            display: DisplayHandle::new(RgbaImage::new(4, 3)),
        }
    }

    #[test]
    fn shots_are_bounded_and_ordered() {
        let mut session = Session::new("s".into(), StorageTarget::Ephemeral, 2, 5);
        assert!(session.push_shot(shot(2)).is_err());
        assert!(session.push_shot(shot(1)).is_ok());
        assert!(session.push_shot(shot(2)).is_ok());
        assert!(session.is_complete());
        assert!(session.push_shot(shot(3)).is_err());
        assert_eq!(session.shots().len(), 2);
    }

    #[test]
    fn id_is_derived_from_start_time() {
        use chrono::TimeZone;
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(Session::id_for(at), "20240309_140507");
    }

    #[test]
    fn finalize_keeps_index_order() {
        let mut session = Session::new(
            "x".into(),
            StorageTarget::Durable(PathBuf::from("/tmp/booth")),
            2,
            5,
        );
        session.push_shot(shot(1)).unwrap();
        session.push_shot(shot(2)).unwrap();
        let finalized = session.finalize();
        let indices: Vec<_> = finalized.shots.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(finalized.storage_target.path(), Some(Path::new("/tmp/booth")));
    }
}
