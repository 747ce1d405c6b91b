//! Frame sources for the capture pipeline.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use image::{Rgba, RgbaImage};
use tracing::{debug, info, warn};

use crate::config::{CameraConfig, CameraKind, OUTPUT_PLACEHOLDER};
use crate::error::CaptureError;
use crate::platform::command::{CommandRunner, default_runner, shell_args};

pub trait Camera: Send {
    fn capture_frame(&mut self) -> Result<RgbaImage, CaptureError>;
}

/// Acquire the configured camera. Failing here aborts startup.
pub fn open(cfg: &CameraConfig) -> Result<Box<dyn Camera>, CaptureError> {
    match cfg.kind {
        CameraKind::Command => Ok(Box::new(CommandCamera::open(cfg, default_runner())?)),
        CameraKind::TestPattern => {
            info!(width = cfg.width, height = cfg.height, "using test-pattern camera");
            Ok(Box::new(TestPatternCamera::new(cfg.width, cfg.height)))
        }
    }
}

/// Captures by running an external still-capture tool (`fswebcam`,
/// `libcamera-still`, ...) that writes a single image to `@OUTPUT@`.
pub struct CommandCamera {
    template: String,
    scratch: PathBuf,
    mirror: bool,
    runner: CommandRunner,
}

impl CommandCamera {
    pub fn open(cfg: &CameraConfig, runner: CommandRunner) -> Result<Self, CaptureError> {
        if let Some(device) = &cfg.device
            && !device.exists()
        {
            return Err(CaptureError::DeviceUnavailable(device.clone()));
        }
        static INSTANCE: AtomicU32 = AtomicU32::new(0);
        let scratch = std::env::temp_dir().join(format!(
            "photo-booth-frame-{}-{}.jpg",
            std::process::id(),
            INSTANCE.fetch_add(1, Ordering::Relaxed)
        ));
        info!(
            command = %cfg.command,
            device = ?cfg.device,
            "camera ready"
        );
        Ok(Self {
            template: cfg.command.clone(),
            scratch,
            mirror: cfg.mirror,
            runner,
        })
    }

    fn command(&self) -> String {
        self.template
            .replace(OUTPUT_PLACEHOLDER, &self.scratch.to_string_lossy())
    }
}

impl Camera for CommandCamera {
    fn capture_frame(&mut self) -> Result<RgbaImage, CaptureError> {
        let _ = fs::remove_file(&self.scratch);
        let command = self.command();
        let output = (self.runner)("sh", &shell_args(&command))?;
        if !output.success {
            return Err(CaptureError::Command {
                command,
                detail: output.failure_detail(),
            });
        }
        if !self.scratch.exists() {
            return Err(CaptureError::Command {
                command,
                detail: "no frame was written".to_string(),
            });
        }
        let frame = image::ImageReader::open(&self.scratch)?
            .with_guessed_format()?
            .decode()?
            .to_rgba8();
        let _ = fs::remove_file(&self.scratch);
        debug!(width = frame.width(), height = frame.height(), "frame captured");
        Ok(if self.mirror {
            image::imageops::flip_horizontal(&frame)
        } else {
            frame
        })
    }
}

impl Drop for CommandCamera {
    fn drop(&mut self) {
        if self.scratch.exists()
            && let Err(err) = fs::remove_file(&self.scratch)
        {
            warn!(path = %self.scratch.display(), error = %err, "failed to remove camera scratch file");
        }
    }
}

/// Synthetic gradient frames with a per-frame tint, for development rigs.
#[derive(Debug)]
pub struct TestPatternCamera {
    width: u32,
    height: u32,
    frame: u32,
}

impl TestPatternCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame: 0,
        }
    }
}

impl Camera for TestPatternCamera {
    fn capture_frame(&mut self) -> Result<RgbaImage, CaptureError> {
        self.frame = self.frame.wrapping_add(1);
        let tint = (self.frame.wrapping_mul(70) % 256) as u8;
        let (w, h) = (self.width, self.height);
        Ok(RgbaImage::from_fn(w, h, |x, y| {
            let r = (x * 255 / (w - 1).max(1)) as u8;
            let g = (y * 255 / (h - 1).max(1)) as u8;
            Rgba([r, g, tint, 255])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::command::CommandOutput;
    use std::sync::{Arc, Mutex};

    fn writing_runner(calls: Arc<Mutex<Vec<String>>>) -> CommandRunner {
        Arc::new(move |_program: &str, args: &[String]| {
            let command = args.last().cloned().unwrap_or_default();
            calls.lock().unwrap().push(command.clone());
            let target = command.split_whitespace().last().unwrap().to_string();
            let mut img = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
            img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
            image::DynamicImage::ImageRgba8(img)
                .to_rgb8()
                .save_with_format(&target, image::ImageFormat::Png)
                .unwrap();
            Ok(CommandOutput {
                success: true,
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        })
    }

    fn config() -> CameraConfig {
        CameraConfig {
            command: "snap --out @OUTPUT@".to_string(),
            device: None,
            ..CameraConfig::default()
        }
    }

    #[test]
    fn command_camera_substitutes_output_and_decodes_frame() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut camera = CommandCamera::open(&config(), writing_runner(calls.clone())).unwrap();
        let frame = camera.capture_frame().unwrap();
        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(frame.get_pixel(0, 0).0, [255, 0, 0, 255]);
        let calls = calls.lock().unwrap();
        assert!(!calls[0].contains(OUTPUT_PLACEHOLDER));
    }

    #[test]
    fn mirror_flips_frame() {
        let mut cfg = config();
        cfg.mirror = true;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut camera = CommandCamera::open(&cfg, writing_runner(calls)).unwrap();
        let frame = camera.capture_frame().unwrap();
        assert_eq!(frame.get_pixel(3, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn failing_command_is_a_capture_error() {
        let runner: CommandRunner = Arc::new(|_: &str, _: &[String]| {
            Ok(CommandOutput {
                success: false,
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "no device".to_string(),
            })
        });
        let mut camera = CommandCamera::open(&config(), runner).unwrap();
        match camera.capture_frame() {
            Err(CaptureError::Command { detail, .. }) => assert!(detail.contains("no device")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_device_refuses_to_open() {
        let mut cfg = config();
        cfg.device = Some(PathBuf::from("/definitely/not/a/video/device"));
        let result = CommandCamera::open(&cfg, default_runner());
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_pattern_frames_differ() {
        let mut camera = TestPatternCamera::new(8, 6);
        let a = camera.capture_frame().unwrap();
        let b = camera.capture_frame().unwrap();
        assert_eq!(a.dimensions(), (8, 6));
        assert_ne!(a.as_raw(), b.as_raw());
    }
}
