//! Turns one camera frame into a [`Shot`] for the active session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, RgbaImage};
use tracing::{debug, info};

use crate::error::CaptureError;
use crate::platform::camera::Camera;
use crate::processing::enhance::{EnhanceParams, Enhancer};
use crate::session::{DisplayHandle, Session, Shot};

pub struct CapturePipeline {
    camera: Box<dyn Camera>,
    enhancer: Arc<dyn Enhancer>,
    params: EnhanceParams,
}

impl CapturePipeline {
    pub fn new(camera: Box<dyn Camera>, enhancer: Arc<dyn Enhancer>, params: EnhanceParams) -> Self {
        Self {
            camera,
            enhancer,
            params,
        }
    }

    pub fn raw_path(dir: &Path, session_id: &str, index: usize) -> PathBuf {
        dir.join(format!("{session_id}_{index}_raw.jpg"))
    }

    pub fn processed_path(dir: &Path, session_id: &str, index: usize) -> PathBuf {
        dir.join(format!("{session_id}_{index}.jpg"))
    }

    /// Capture the session's next shot. Does not modify the session.
    pub fn run_capture(&mut self, session: &Session) -> Result<Shot, CaptureError> {
        let index = session.next_index();
        let frame = self.camera.capture_frame()?;

        let Some(dir) = session.storage_target().path() else {
            debug!(session = session.id(), shot = index, "ephemeral shot kept in memory");
            return Ok(Shot {
                index,
                processed_path: None,
                display: DisplayHandle::new(frame),
            });
        };

        let raw_path = Self::raw_path(dir, session.id(), index);
        save_jpeg(&frame, &raw_path)?;

        let enhanced = self.enhancer.enhance(&frame, &self.params);
        let processed_path = Self::processed_path(dir, session.id(), index);
        save_jpeg(&enhanced, &processed_path)?;

        let display = image::open(&processed_path)?.to_rgba8();
        info!(
            session = session.id(),
            shot = index,
            path = %processed_path.display(),
            "shot saved"
        );
        Ok(Shot {
            index,
            processed_path: Some(processed_path),
            display: DisplayHandle::new(display),
        })
    }
}

// JPEG has no alpha channel.
fn save_jpeg(image: &RgbaImage, path: &Path) -> Result<(), CaptureError> {
    DynamicImage::ImageRgba8(image.clone())
        .to_rgb8()
        .save(path)
        .map_err(|source| CaptureError::Persist {
            path: path.to_path_buf(),
            source,
        })
}
