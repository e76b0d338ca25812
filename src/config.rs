//! Configuration management for thermal_rgbd daemon.
//!
//! Handles loading, parsing, and validation of YAML configuration files
//! that define the lighting server, the sensor command, loop timings and
//! color bands. Every field has a default, so the daemon also runs without
//! any configuration file.

use crate::{gateway::DeviceSelector, mappings::ColorBands};
use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Main configuration structure for the thermal_rgbd daemon.
///
/// # Example
///
/// ```yaml
/// version: 1
/// tick_seconds: 2
/// reconnect_delay_seconds: 5
/// sleep_gap_seconds: 30
///
/// server:
///   program: ./openRGB.AppImage
///   args: ["--server"]
///   port: 6742
///
/// sensor:
///   program: sensors
///   label: Tctl
///
/// target:
///   kind: device-type
///   device_type: motherboard
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Pause between ticks of the control loop, in seconds.
    #[serde(default = "defaults::tick_seconds")]
    pub tick_seconds: u16,

    /// Pause after a failed connection attempt, in seconds.
    #[serde(default = "defaults::reconnect_delay_seconds")]
    pub reconnect_delay_seconds: u16,

    /// Pause after an unexpected failure inside a tick, in seconds.
    #[serde(default = "defaults::error_cooldown_seconds")]
    pub error_cooldown_seconds: u16,

    /// Wall-clock gap between ticks that is taken as a suspend/resume.
    #[serde(default = "defaults::sleep_gap_seconds")]
    pub sleep_gap_seconds: u16,

    /// Consecutive connection failures before the server is relaunched.
    #[serde(default = "defaults::restart_after_failures")]
    pub restart_after_failures: u32,

    /// Lighting server process and endpoint.
    #[serde(default)]
    pub server: ServerCfg,

    /// Temperature source.
    #[serde(default)]
    pub sensor: SensorCfg,

    /// Devices that receive the temperature color.
    #[serde(default)]
    pub target: DeviceSelector,

    /// Temperature to color scale.
    #[serde(default)]
    pub colors: ColorBands,

    /// Log sinks and verbosity.
    #[serde(default)]
    pub logging: LoggingCfg,
}

/// Lighting server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCfg {
    /// Executable that starts the server.
    #[serde(default = "defaults::server_program")]
    pub program: String,

    /// Arguments passed to `program`.
    #[serde(default = "defaults::server_args")]
    pub args: Vec<String>,

    /// Pattern used to terminate stale server processes by name.
    #[serde(default = "defaults::server_process_name")]
    pub process_name: String,

    /// Host of the SDK endpoint.
    #[serde(default = "defaults::server_host")]
    pub host: String,

    /// Port of the SDK endpoint.
    #[serde(default = "defaults::server_port")]
    pub port: u16,

    /// Reachability probes after launching the server.
    #[serde(default = "defaults::startup_attempts")]
    pub startup_attempts: u32,

    /// Pause between reachability probes, in milliseconds.
    #[serde(default = "defaults::startup_backoff_ms")]
    pub startup_backoff_ms: u64,

    /// Deadline for a single connect, read or write, in milliseconds.
    #[serde(default = "defaults::io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Name announced to the server.
    #[serde(default = "defaults::client_name")]
    pub client_name: String,
}

/// Temperature sensor command configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorCfg {
    /// Identifier used in log lines.
    #[serde(default = "defaults::sensor_id")]
    pub id: String,

    /// Command to run, e.g. `sensors`.
    #[serde(default = "defaults::sensor_program")]
    pub program: String,

    /// Arguments passed to `program`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Label of the output line holding the reading (e.g. "Tctl").
    #[serde(default = "defaults::sensor_label")]
    pub label: String,

    /// Deadline for the command, in milliseconds.
    #[serde(default = "defaults::sensor_timeout_ms")]
    pub timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingCfg {
    /// Log file, appended to. `null` disables file logging.
    #[serde(default = "defaults::log_file")]
    pub file: Option<PathBuf>,

    /// Maximum level: off, error, warn, info, debug or trace.
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Also forward records to the local syslog.
    #[serde(default)]
    pub syslog: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            tick_seconds: defaults::tick_seconds(),
            reconnect_delay_seconds: defaults::reconnect_delay_seconds(),
            error_cooldown_seconds: defaults::error_cooldown_seconds(),
            sleep_gap_seconds: defaults::sleep_gap_seconds(),
            restart_after_failures: defaults::restart_after_failures(),
            server: ServerCfg::default(),
            sensor: SensorCfg::default(),
            target: DeviceSelector::default(),
            colors: ColorBands::default(),
            logging: LoggingCfg::default(),
        }
    }
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self {
            program: defaults::server_program(),
            args: defaults::server_args(),
            process_name: defaults::server_process_name(),
            host: defaults::server_host(),
            port: defaults::server_port(),
            startup_attempts: defaults::startup_attempts(),
            startup_backoff_ms: defaults::startup_backoff_ms(),
            io_timeout_ms: defaults::io_timeout_ms(),
            client_name: defaults::client_name(),
        }
    }
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            id: defaults::sensor_id(),
            program: defaults::sensor_program(),
            args: Vec::new(),
            label: defaults::sensor_label(),
            timeout_ms: defaults::sensor_timeout_ms(),
        }
    }
}

impl Default for LoggingCfg {
    fn default() -> Self {
        Self {
            file: defaults::log_file(),
            level: defaults::log_level(),
            syslog: false,
        }
    }
}

impl Config {
    /// Validates the configuration for consistency.
    ///
    /// # Example
    ///
    /// ```
    /// use thermal_rgbd::config::Config;
    ///
    /// let config = Config::default();
    /// config.validate()?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_seconds == 0 {
            anyhow::bail!("tick_seconds must be at least 1");
        }
        if self.reconnect_delay_seconds == 0 {
            anyhow::bail!("reconnect_delay_seconds must be at least 1");
        }
        if self.error_cooldown_seconds == 0 {
            anyhow::bail!("error_cooldown_seconds must be at least 1");
        }
        let longest_wait = self
            .tick_seconds
            .max(self.reconnect_delay_seconds)
            .max(self.error_cooldown_seconds);
        if self.sleep_gap_seconds <= longest_wait {
            anyhow::bail!(
                "sleep_gap_seconds ({}) must exceed tick_seconds ({}), reconnect_delay_seconds ({}) and error_cooldown_seconds ({})",
                self.sleep_gap_seconds,
                self.tick_seconds,
                self.reconnect_delay_seconds,
                self.error_cooldown_seconds
            );
        }
        if self.server.startup_attempts == 0 {
            anyhow::bail!("server.startup_attempts must be at least 1");
        }
        if self.server.startup_backoff_ms == 0 {
            anyhow::bail!("server.startup_backoff_ms must be non-zero");
        }
        if self.server.io_timeout_ms == 0 || self.sensor.timeout_ms == 0 {
            anyhow::bail!("I/O timeouts must be non-zero");
        }
        self.log_level()?;
        self.colors.validate().context("Invalid color bands")?;
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(u64::from(self.tick_seconds))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.reconnect_delay_seconds))
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(u64::from(self.error_cooldown_seconds))
    }

    pub fn sleep_gap(&self) -> Duration {
        Duration::from_secs(u64::from(self.sleep_gap_seconds))
    }

    pub fn log_level(&self) -> anyhow::Result<LevelFilter> {
        self.logging
            .level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow::anyhow!("Unknown log level '{}'", self.logging.level))
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn tick_seconds() -> u16 {
        2
    }

    pub fn reconnect_delay_seconds() -> u16 {
        5
    }

    pub fn error_cooldown_seconds() -> u16 {
        5
    }

    pub fn sleep_gap_seconds() -> u16 {
        30
    }

    pub fn restart_after_failures() -> u32 {
        3
    }

    pub fn server_program() -> String {
        "./openRGB.AppImage".to_string()
    }

    pub fn server_args() -> Vec<String> {
        vec!["--server".to_string()]
    }

    pub fn server_process_name() -> String {
        "openRGB.AppImage".to_string()
    }

    pub fn server_host() -> String {
        "127.0.0.1".to_string()
    }

    pub fn server_port() -> u16 {
        6742
    }

    pub fn startup_attempts() -> u32 {
        10
    }

    pub fn startup_backoff_ms() -> u64 {
        1000
    }

    pub fn io_timeout_ms() -> u64 {
        5000
    }

    pub fn client_name() -> String {
        "thermal_rgbd".to_string()
    }

    pub fn sensor_id() -> String {
        "cpu".to_string()
    }

    pub fn sensor_program() -> String {
        "sensors".to_string()
    }

    pub fn sensor_label() -> String {
        "Tctl".to_string()
    }

    pub fn sensor_timeout_ms() -> u64 {
        3000
    }

    pub fn log_file() -> Option<PathBuf> {
        Some(PathBuf::from("rgb_controller.log"))
    }

    pub fn log_level() -> String {
        "info".to_string()
    }
}

fn locate_config() -> Option<PathBuf> {
    // 1) ENV
    if let Ok(env_path) = env::var("THERMAL_RGBD_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    // 2) XDG_CONFIG_HOME or $HOME/.config
    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("thermal_rgbd/config.yml");
        if cfg_dir.exists() {
            return Some(cfg_dir);
        }
    }

    // 3) /etc
    let etc = Path::new("/etc/thermal_rgbd/config.yml");
    if etc.exists() {
        return Some(etc.to_path_buf());
    }

    None
}

/// Loaded configuration together with the file it came from.
///
/// # Example
///
/// ```no_run
/// use thermal_rgbd::config::ConfigManager;
///
/// # fn example() -> anyhow::Result<()> {
/// // Search the standard locations, falling back to defaults
/// let config_manager = ConfigManager::load(None)?;
/// let tick = config_manager.config().tick();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Config,
    path: Option<PathBuf>,
}

impl ConfigManager {
    /// Wraps an already built configuration.
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        Self { config, path }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches for configuration in the following order:
    /// 1. Provided path parameter
    /// 2. THERMAL_RGBD_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/thermal_rgbd/config.yml or ~/.config/thermal_rgbd/config.yml
    /// 4. /etc/thermal_rgbd/config.yml
    ///
    /// Built-in defaults are used when none of them exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        match path.or_else(locate_config) {
            Some(config_path) => {
                let config = Self::load_config_from_path(&config_path)?;
                Ok(Self::new(config, Some(config_path)))
            }
            None => Ok(Self::new(Config::default(), None)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the file the configuration was read from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Human readable origin of the configuration, for log lines.
    pub fn source(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string())
    }

    fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gateway::DeviceType, mappings::Rgb};
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // Helper function to create temporary config file
    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn config_load_valid_yaml() {
        let yaml_content = r#"
version: 1
tick_seconds: 3
reconnect_delay_seconds: 6
sleep_gap_seconds: 45
restart_after_failures: 2

server:
  program: "/opt/openrgb/OpenRGB.AppImage"
  args: ["--server", "--noautoconnect"]
  port: 6800
  startup_attempts: 4

sensor:
  program: "sensors"
  args: ["k10temp-pci-00c3"]
  label: "Tccd1"

target:
  kind: "device-type"
  device_type: "gpu"

colors:
  bands:
    - up_to: 50.0
      rgb: [0, 0, 255]
  above: [255, 0, 0]

logging:
  file: null
  level: "debug"
"#;

        let temp_file = create_temp_config(yaml_content);
        let config_manager =
            ConfigManager::load(Some(temp_file.path().to_path_buf())).unwrap();
        let config = config_manager.config();

        assert_eq!(config.tick_seconds, 3);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(6));
        assert_eq!(config.sleep_gap(), Duration::from_secs(45));
        assert_eq!(config.restart_after_failures, 2);
        assert_eq!(config.server.port, 6800);
        assert_eq!(config.server.startup_attempts, 4);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.args.len(), 2);
        assert_eq!(config.sensor.label, "Tccd1");
        assert_eq!(config.target, DeviceSelector::DeviceType { device_type: DeviceType::Gpu });
        assert_eq!(config.colors.color_for_temp(70.0), Rgb::new(255, 0, 0));
        assert_eq!(config.logging.file, None);
        assert_eq!(config.log_level().unwrap(), LevelFilter::Debug);
        assert_eq!(config_manager.path(), Some(temp_file.path()));
    }

    #[test]
    fn minimal_yaml_uses_defaults() {
        let temp_file = create_temp_config("version: 1\n");
        let config_manager =
            ConfigManager::load(Some(temp_file.path().to_path_buf())).unwrap();
        let config = config_manager.config();

        assert_eq!(config.tick(), Duration::from_secs(2));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.sleep_gap(), Duration::from_secs(30));
        assert_eq!(config.server.program, "./openRGB.AppImage");
        assert_eq!(config.server.args, vec!["--server".to_string()]);
        assert_eq!(config.server.port, 6742);
        assert_eq!(config.server.startup_attempts, 10);
        assert_eq!(config.sensor.program, "sensors");
        assert_eq!(config.sensor.label, "Tctl");
        assert_eq!(config.target, DeviceSelector::All);
        assert_eq!(config.colors, ColorBands::default());
        assert_eq!(
            config.logging.file,
            Some(PathBuf::from("rgb_controller.log"))
        );
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let temp_file = create_temp_config("version: 2\n");
        let err = ConfigManager::load(Some(temp_file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("Unsupported config version"));
    }

    #[test]
    fn sleep_gap_must_exceed_tick() {
        let config = Config {
            tick_seconds: 10,
            sleep_gap_seconds: 10,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sleep_gap_seconds"));
    }

    #[test]
    fn zero_error_cooldown_is_rejected() {
        let config = Config {
            error_cooldown_seconds: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("error_cooldown_seconds"));
    }

    #[test]
    fn sleep_gap_must_exceed_error_cooldown() {
        let config = Config {
            error_cooldown_seconds: 60,
            sleep_gap_seconds: 30,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sleep_gap_seconds"));

        let config = Config {
            error_cooldown_seconds: 30,
            sleep_gap_seconds: 30,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_startup_backoff_is_rejected() {
        let mut config = Config::default();
        config.server.startup_backoff_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("startup_backoff_ms"));
    }

    #[test]
    fn zero_startup_attempts_is_rejected() {
        let mut config = Config::default();
        config.server.startup_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut config = Config::default();
        config.logging.level = "chatty".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("chatty"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = ConfigManager::load(Some(PathBuf::from("/nonexistent/thermal_rgbd.yml")))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    #[serial]
    fn env_var_points_at_config() {
        let temp_file = create_temp_config("version: 1\ntick_seconds: 4\n");
        // SAFETY: serialized test, no other thread reads the environment.
        unsafe { env::set_var("THERMAL_RGBD_CONFIG", temp_file.path()) };
        let loaded = ConfigManager::load(None);
        unsafe { env::remove_var("THERMAL_RGBD_CONFIG") };

        let config_manager = loaded.unwrap();
        assert_eq!(config_manager.config().tick_seconds, 4);
        assert_eq!(config_manager.source(), temp_file.path().display().to_string());
    }

    #[test]
    #[serial]
    fn no_config_anywhere_falls_back_to_defaults() {
        let empty_home = tempfile::tempdir().unwrap();
        // SAFETY: serialized test, no other thread reads the environment.
        unsafe {
            env::remove_var("THERMAL_RGBD_CONFIG");
            env::set_var("XDG_CONFIG_HOME", empty_home.path());
        }
        let loaded = ConfigManager::load(None);
        unsafe { env::remove_var("XDG_CONFIG_HOME") };

        let config_manager = loaded.unwrap();
        if !Path::new("/etc/thermal_rgbd/config.yml").exists() {
            assert_eq!(config_manager.path(), None);
            assert_eq!(config_manager.source(), "built-in defaults");
        }
    }
}
