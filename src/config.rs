use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;

pub const DEFAULT_CONTROL_SOCKET_PATH: &str = "/run/photo-booth/control.sock";
pub const OUTPUT_PLACEHOLDER: &str = "@OUTPUT@";

/// Timing and sizing of one coin-to-print session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Number of photographs taken per session.
    pub total_shots: usize,
    /// Countdown shown after the coin is accepted, before the first shot.
    pub initial_countdown_seconds: u32,
    /// Countdown between consecutive shots (and before a retried shot).
    pub between_shots_seconds: u32,
    /// How long the finished shots stay on screen before returning to idle.
    pub presenting_duration_seconds: u32,
    /// Update/render loop frequency.
    pub tick_rate_hz: u32,
    /// Length of the indicator blink emitted on every countdown second.
    #[serde(with = "humantime_serde")]
    pub indicator_pulse: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            total_shots: 3,
            initial_countdown_seconds: 5,
            between_shots_seconds: 3,
            presenting_duration_seconds: 8,
            tick_rate_hz: 30,
            indicator_pulse: Duration::from_millis(100),
        }
    }
}

impl SessionSettings {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }

    pub fn presenting_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.presenting_duration_seconds))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Gpio,
    Disabled,
}

/// Coin acceptor input and indicator LED wiring.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SignalConfig {
    pub kind: SignalKind,
    /// BCM number of the coin acceptor pulse line.
    pub coin_pin: u32,
    /// BCM number of the indicator LED; omit to run without one.
    pub led_pin: Option<u32>,
    /// Treat a low level on the coin pin as "coin present".
    pub active_low: bool,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
    pub sysfs_root: PathBuf,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            kind: SignalKind::Gpio,
            coin_pin: 17,
            led_pin: Some(27),
            active_low: false,
            poll_interval: Duration::from_millis(100),
            debounce: Duration::from_millis(200),
            sysfs_root: PathBuf::from("/sys/class/gpio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraKind {
    Command,
    TestPattern,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CameraConfig {
    pub kind: CameraKind,
    /// Shell template that writes one frame to `@OUTPUT@`.
    pub command: String,
    /// Video device that must exist at startup (skipped when unset).
    pub device: Option<PathBuf>,
    /// Flip frames horizontally so the booth behaves like a mirror.
    pub mirror: bool,
    /// Frame size produced by the test-pattern camera.
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            kind: CameraKind::Command,
            command: "fswebcam --quiet --no-banner --resolution 1280x720 --jpeg 95 @OUTPUT@"
                .to_string(),
            device: Some(PathBuf::from("/dev/video0")),
            mirror: false,
            width: 1280,
            height: 960,
        }
    }
}

/// Fixed enhancement applied to every durable shot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct EnhanceConfig {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub border_size: u32,
    pub border_color: [u8; 3],
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            brightness: 1.2,
            contrast: 1.1,
            saturation: 1.2,
            border_size: 50,
            border_color: [255, 255, 255],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directories scanned (two levels deep) for mounted removable media.
    pub mount_roots: Vec<PathBuf>,
    /// Directory created on the removable medium to hold session files.
    pub subdirectory: String,
    /// Only accept directories that are mount points.
    pub require_mount_point: bool,
    /// Used when no removable medium is present; unset means display-only sessions.
    pub fallback_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mount_roots: vec![
                PathBuf::from("/media"),
                PathBuf::from("/run/media"),
                PathBuf::from("/mnt"),
            ],
            subdirectory: "photobooth_images".to_string(),
            require_mount_point: true,
            fallback_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CanvasPreset {
    /// 4x6 inch sheet at 300 dpi as fed by DNP dye-sub printers.
    #[serde(rename = "dnp-4x6")]
    Dnp4x6,
    /// 2x6 inch strip (half of a cut 4x6 sheet).
    #[serde(rename = "dnp-2x6")]
    Dnp2x6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CanvasConfig {
    Preset(CanvasPreset),
    Custom { width: u32, height: u32 },
}

impl CanvasConfig {
    pub fn dimensions(&self) -> (u32, u32) {
        match *self {
            CanvasConfig::Preset(CanvasPreset::Dnp4x6) => (1844, 1240),
            CanvasConfig::Preset(CanvasPreset::Dnp2x6) => (1844, 620),
            CanvasConfig::Custom { width, height } => (width, height),
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        CanvasConfig::Preset(CanvasPreset::Dnp4x6)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StripOrientation {
    /// Photos side by side, left to right.
    #[default]
    Horizontal,
    /// Photos stacked, top to bottom.
    Vertical,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct HeaderConfig {
    pub enabled: bool,
    pub height: u32,
    /// chrono `strftime` pattern rendered into the header band.
    pub format: String,
    /// Font file; falls back to a system sans-serif face.
    pub font: Option<PathBuf>,
    pub color: [u8; 3],
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            height: 120,
            format: "%d/%m/%Y %H:%M".to_string(),
            font: None,
            color: [0, 0, 0],
        }
    }
}

impl HeaderConfig {
    pub fn reserved_height(&self) -> u32 {
        if self.enabled { self.height } else { 0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CompositeConfig {
    pub canvas: CanvasConfig,
    pub orientation: StripOrientation,
    pub spacing: u32,
    pub margin: u32,
    pub background: [u8; 3],
    pub header: HeaderConfig,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            orientation: StripOrientation::default(),
            spacing: 5,
            margin: 0,
            background: [255, 255, 255],
            header: HeaderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrintOrientation {
    #[default]
    Portrait,
    Landscape,
}

impl PrintOrientation {
    /// IPP `orientation-requested` enum value.
    pub fn ipp_value(self) -> u8 {
        match self {
            PrintOrientation::Portrait => 3,
            PrintOrientation::Landscape => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMode {
    #[default]
    Color,
    Monochrome,
}

impl ColorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ColorMode::Color => "color",
            ColorMode::Monochrome => "monochrome",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PrintConfig {
    pub enabled: bool,
    /// CUPS queue name; the first queue reported by `lpstat -a` when unset.
    pub printer: Option<String>,
    pub job_name: String,
    pub media: String,
    pub orientation: PrintOrientation,
    pub resolution: String,
    pub color_mode: ColorMode,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            printer: None,
            job_name: "Photobooth Image".to_string(),
            media: "w288h432".to_string(),
            orientation: PrintOrientation::Landscape,
            resolution: "300dpi".to_string(),
            color_mode: ColorMode::Color,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    pub session: SessionSettings,
    pub signal: SignalConfig,
    pub camera: CameraConfig,
    pub enhance: EnhanceConfig,
    pub storage: StorageConfig,
    pub composite: CompositeConfig,
    pub print: PrintConfig,
    /// Unix domain socket accepting operator commands such as `force-insert`.
    pub control_socket_path: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            signal: SignalConfig::default(),
            camera: CameraConfig::default(),
            enhance: EnhanceConfig::default(),
            storage: StorageConfig::default(),
            composite: CompositeConfig::default(),
            print: PrintConfig::default(),
            control_socket_path: PathBuf::from(DEFAULT_CONTROL_SOCKET_PATH),
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        let session = &self.session;
        ensure!(session.total_shots > 0, "total-shots must be greater than zero");
        ensure!(
            session.initial_countdown_seconds > 0,
            "initial-countdown-seconds must be greater than zero"
        );
        ensure!(
            session.between_shots_seconds > 0,
            "between-shots-seconds must be greater than zero"
        );
        ensure!(
            session.presenting_duration_seconds > 0,
            "presenting-duration-seconds must be greater than zero"
        );
        ensure!(
            (1..=240).contains(&session.tick_rate_hz),
            "tick-rate-hz must be between 1 and 240"
        );

        if self.signal.kind == SignalKind::Gpio {
            ensure!(
                self.signal.led_pin != Some(self.signal.coin_pin),
                "coin-pin and led-pin must be different GPIO lines"
            );
        }
        ensure!(
            !self.signal.poll_interval.is_zero(),
            "signal poll-interval must be greater than zero"
        );

        if self.camera.kind == CameraKind::Command {
            ensure!(
                !self.camera.command.trim().is_empty(),
                "camera command must not be empty"
            );
            ensure!(
                self.camera.command.contains(OUTPUT_PLACEHOLDER),
                "camera command must reference {OUTPUT_PLACEHOLDER}"
            );
        } else {
            ensure!(
                self.camera.width > 0 && self.camera.height > 0,
                "test-pattern camera dimensions must be positive"
            );
        }

        let enhance = &self.enhance;
        for (name, value) in [
            ("brightness", enhance.brightness),
            ("contrast", enhance.contrast),
            ("saturation", enhance.saturation),
        ] {
            ensure!(
                value.is_finite() && value > 0.0,
                "enhance {name} must be a positive number"
            );
        }

        ensure!(
            !self.storage.subdirectory.trim().is_empty(),
            "storage subdirectory must not be empty"
        );

        self.validate_composite()
            .context("invalid composite configuration")?;

        if self.print.enabled {
            ensure!(
                !self.print.job_name.trim().is_empty(),
                "print job-name must not be empty"
            );
        }

        ensure!(
            self.control_socket_path.file_name().is_some(),
            "control-socket-path must include a socket file name"
        );
        Ok(self)
    }

    fn validate_composite(&self) -> Result<()> {
        let composite = &self.composite;
        let (width, height) = composite.canvas.dimensions();
        ensure!(width > 0 && height > 0, "canvas dimensions must be positive");
        let shots = self.session.total_shots as u64;
        let fixed_w = u64::from(composite.margin) * 2;
        let fixed_h = u64::from(composite.margin) * 2 + u64::from(composite.header.reserved_height());
        let (main_extent, main_fixed, cross_extent, cross_fixed) = match composite.orientation {
            StripOrientation::Horizontal => (width, fixed_w, height, fixed_h),
            StripOrientation::Vertical => (height, fixed_h, width, fixed_w),
        };
        let main_needed = main_fixed + u64::from(composite.spacing) * (shots + 1) + shots;
        ensure!(
            u64::from(main_extent) >= main_needed,
            "canvas is too small to fit {shots} photos with the configured spacing and margins"
        );
        ensure!(
            u64::from(cross_extent) > cross_fixed,
            "canvas leaves no room for photos after margins and header"
        );
        if composite.header.enabled {
            ensure!(
                !StrftimeItems::new(&composite.header.format).any(|item| matches!(item, Item::Error)),
                "header format {:?} is not a valid strftime pattern",
                composite.header.format
            );
        }
        Ok(())
    }
}
