//! Configuration management (config.toml)
//!
//! Handles loading, saving, and providing defaults for runtime settings.
//! Settings are stored in TOML format in the platform-specific config
//! directory, or at an explicit path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::{OutputFormat, OutputSample};
use crate::clock::{
    AntiFreezeConfig, ClockConfig, ClockError, DelaySleepPolicy, FrameRate, PacingControl,
    TRACKED_KINDS,
};
use crate::time::TimeSpec;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error("unsupported audio output: {channels} channel(s), {bit_depth}-bit at {frequency} Hz")]
    Audio {
        channels: u16,
        bit_depth: u16,
        frequency: u32,
    },
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub delay: DelayConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Virtual clock settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Frames per `framerate_den` seconds (default: 60)
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    /// (default: 1)
    #[serde(default = "default_framerate_den")]
    pub framerate_den: u32,
    /// Start in fast-forward (default: false)
    #[serde(default)]
    pub fast_forward: bool,
    /// Virtual time injected per busy-loop detection (default: 1 ms)
    #[serde(default = "default_forced_advance_ns")]
    pub forced_advance_ns: u64,
    #[serde(default)]
    pub anti_freeze: AntiFreezeLimits,
}

/// Consecutive queries allowed per time function before forcing time forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiFreezeLimits {
    #[serde(default = "default_limit")]
    pub time: u32,
    #[serde(default = "default_limit")]
    pub gettimeofday: u32,
    #[serde(default = "default_limit")]
    pub clock: u32,
    #[serde(default = "default_limit")]
    pub clock_gettime: u32,
    #[serde(default = "default_limit")]
    pub get_ticks: u32,
    #[serde(default = "default_limit")]
    pub performance_counter: u32,
}

/// Real sleep performed for each diverted wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    /// Fraction of the diverted duration really slept (default: 1.0)
    #[serde(default = "default_real_sleep_ratio")]
    pub real_sleep_ratio: f64,
    /// Cap on that real sleep (default: 20)
    #[serde(default = "default_max_real_sleep_ms")]
    pub max_real_sleep_ms: u64,
}

/// Mixed output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Master volume level (default: 1.0, range: 0.0-1.0)
    #[serde(default = "default_volume")]
    pub master_volume: f32,
    /// (default: 44100)
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    /// 1 or 2 (default: 2)
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// 8 or 16 (default: 16)
    #[serde(default = "default_bit_depth")]
    pub bit_depth: u16,
}

fn default_framerate() -> u32 {
    60
}
fn default_framerate_den() -> u32 {
    1
}
fn default_forced_advance_ns() -> u64 {
    1_000_000
}
fn default_limit() -> u32 {
    100
}
fn default_real_sleep_ratio() -> f64 {
    1.0
}
fn default_max_real_sleep_ms() -> u64 {
    20
}
fn default_volume() -> f32 {
    1.0
}
fn default_frequency() -> u32 {
    44_100
}
fn default_channels() -> u16 {
    2
}
fn default_bit_depth() -> u16 {
    16
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            framerate: default_framerate(),
            framerate_den: default_framerate_den(),
            fast_forward: false,
            forced_advance_ns: default_forced_advance_ns(),
            anti_freeze: AntiFreezeLimits::default(),
        }
    }
}

impl Default for AntiFreezeLimits {
    fn default() -> Self {
        Self {
            time: default_limit(),
            gettimeofday: default_limit(),
            clock: default_limit(),
            clock_gettime: default_limit(),
            get_ticks: default_limit(),
            performance_counter: default_limit(),
        }
    }
}

impl AntiFreezeLimits {
    /// In `QueryKind::TRACKED` order
    pub fn as_array(&self) -> [u32; TRACKED_KINDS] {
        [
            self.time,
            self.gettimeofday,
            self.clock,
            self.clock_gettime,
            self.get_ticks,
            self.performance_counter,
        ]
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            real_sleep_ratio: default_real_sleep_ratio(),
            max_real_sleep_ms: default_max_real_sleep_ms(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            master_volume: default_volume(),
            frequency: default_frequency(),
            channels: default_channels(),
            bit_depth: default_bit_depth(),
        }
    }
}

impl Config {
    pub fn clock_config(&self) -> Result<ClockConfig, ConfigError> {
        let timing = &self.timing;
        Ok(ClockConfig {
            frame_rate: FrameRate::new(timing.framerate, timing.framerate_den)?,
            anti_freeze: AntiFreezeConfig {
                limits: timing.anti_freeze.as_array(),
                forced_increment: TimeSpec::from_nanos(timing.forced_advance_ns as i128),
            },
        })
    }

    pub fn delay_policy(&self) -> DelaySleepPolicy {
        DelaySleepPolicy {
            ratio: self.delay.real_sleep_ratio.max(0.0),
            max: Duration::from_millis(self.delay.max_real_sleep_ms),
        }
    }

    pub fn pacing(&self) -> PacingControl {
        PacingControl::new(self.timing.fast_forward, self.delay_policy())
    }

    pub fn output_format(&self) -> Result<OutputFormat, ConfigError> {
        let audio = &self.audio;
        let sample = match audio.bit_depth {
            8 => Some(OutputSample::U8),
            16 => Some(OutputSample::S16),
            _ => None,
        };
        match sample {
            Some(sample) if (1..=2).contains(&audio.channels) && audio.frequency > 0 => {
                Ok(OutputFormat {
                    sample,
                    channels: audio.channels,
                    frequency: audio.frequency,
                })
            }
            _ => Err(ConfigError::Audio {
                channels: audio.channels,
                bit_depth: audio.bit_depth,
                frequency: audio.frequency,
            }),
        }
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/ticklock`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "ticklock", "ticklock")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Read and parse a config file.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Loads the configuration from disk.
///
/// Reads `config.toml` from the platform's configuration directory.
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> Config {
    let Some(path) = config_dir().map(|dir| dir.join("config.toml")) else {
        return Config::default();
    };
    if !path.exists() {
        return Config::default();
    }
    match load_from(&path) {
        Ok(config) => {
            debug!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Using default config: {}", e);
            Config::default()
        }
    }
}

/// Saves the configuration to `path`, creating parent directories.
pub fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================================
    // Default value tests
    // =============================================================

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.timing.framerate, 60);
        assert_eq!(config.timing.framerate_den, 1);
        assert!(!config.timing.fast_forward);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.clock_config().unwrap(), ClockConfig::default());
        assert_eq!(config.delay_policy(), DelaySleepPolicy::default());
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    // =============================================================
    // TOML parsing tests
    // =============================================================

    #[test]
    fn test_config_deserialize_partial_timing() {
        let toml_str = r#"
[timing]
framerate = 60000
framerate_den = 1001

[timing.anti_freeze]
get_ticks = 5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let clock = config.clock_config().unwrap();
        assert_eq!(clock.frame_rate, FrameRate::new(60_000, 1001).unwrap());
        assert_eq!(clock.anti_freeze.limits, [100, 100, 100, 100, 5, 100]);
        assert_eq!(clock.anti_freeze.forced_increment, TimeSpec::from_millis(1));
    }

    #[test]
    fn test_invalid_frame_rate_is_rejected() {
        let config: Config = toml::from_str("[timing]\nframerate = 0\n").unwrap();
        assert!(matches!(
            config.clock_config(),
            Err(ConfigError::Clock(ClockError::InvalidFrameRate { .. }))
        ));
    }

    #[test]
    fn test_output_format() {
        let config: Config = toml::from_str("[audio]\nbit_depth = 8\nchannels = 1\n").unwrap();
        assert_eq!(
            config.output_format().unwrap(),
            OutputFormat {
                sample: OutputSample::U8,
                channels: 1,
                frequency: 44_100,
            }
        );

        let config: Config = toml::from_str("[audio]\nbit_depth = 24\n").unwrap();
        assert!(matches!(config.output_format(), Err(ConfigError::Audio { .. })));
    }

    #[test]
    fn test_delay_policy_from_config() {
        let config: Config =
            toml::from_str("[delay]\nreal_sleep_ratio = 0.25\nmax_real_sleep_ms = 5\n").unwrap();
        let policy = config.delay_policy();
        assert_eq!(policy.ratio, 0.25);
        assert_eq!(policy.max, Duration::from_millis(5));
    }

    // =============================================================
    // File tests
    // =============================================================

    #[test]
    fn test_save_then_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.timing.fast_forward = true;
        config.audio.master_volume = 0.5;

        save(&config, &path).unwrap();
        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.pacing().fast_forward());
    }

    #[test]
    fn test_load_from_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(load_from(&missing), Err(ConfigError::Io { .. })));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[timing\nframerate = ").unwrap();
        assert!(matches!(load_from(&broken), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_returns_valid_config() {
        // Defaults, or whatever the real config file holds
        let config = load();
        assert!(config.audio.master_volume >= 0.0);
    }
}
