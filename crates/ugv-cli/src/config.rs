//! Configuration Vault – reads/writes `~/.ugv/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use ugv_hub::HubConfig;
use ugv_types::{HubError, ParameterTree};

/// Persisted console configuration stored in `~/.ugv/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Telemetry tick period in milliseconds (20 ms = 50 Hz).
    #[serde(default = "default_telemetry_period_ms")]
    pub telemetry_period_ms: u64,

    /// Feed the telemetry topics from the built-in simulator.
    #[serde(default = "default_true")]
    pub mock_telemetry: bool,

    /// Maximum number of points kept in the path history.
    #[serde(default = "default_path_capacity")]
    pub path_capacity: usize,

    /// Edge length of the simulated occupancy grid, in cells.
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,

    /// Lower bound of the simulated parameter ack delay.
    #[serde(default = "default_ack_delay_min_ms")]
    pub ack_delay_min_ms: u64,

    /// Upper bound of the simulated parameter ack delay.
    #[serde(default = "default_ack_delay_max_ms")]
    pub ack_delay_max_ms: u64,

    /// Telemetry silence after which the link is reported down.
    #[serde(default = "default_link_timeout_ms")]
    pub link_timeout_ms: u64,

    /// Stick deadzone for the gamepad mapper.
    #[serde(default = "default_deadzone")]
    pub deadzone: f32,

    /// Linear speed (m/s) at full stick deflection.
    #[serde(default = "default_max_speed")]
    pub max_linear_mps: f32,

    /// Angular speed (rad/s) at full stick deflection.
    #[serde(default = "default_max_speed")]
    pub max_angular_rps: f32,
}

fn default_telemetry_period_ms() -> u64 {
    20
}
fn default_true() -> bool {
    true
}
fn default_path_capacity() -> usize {
    1000
}
fn default_grid_size() -> usize {
    100
}
fn default_ack_delay_min_ms() -> u64 {
    200
}
fn default_ack_delay_max_ms() -> u64 {
    800
}
fn default_link_timeout_ms() -> u64 {
    1000
}
fn default_deadzone() -> f32 {
    0.1
}
fn default_max_speed() -> f32 {
    2.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telemetry_period_ms: default_telemetry_period_ms(),
            mock_telemetry: default_true(),
            path_capacity: default_path_capacity(),
            grid_size: default_grid_size(),
            ack_delay_min_ms: default_ack_delay_min_ms(),
            ack_delay_max_ms: default_ack_delay_max_ms(),
            link_timeout_ms: default_link_timeout_ms(),
            deadzone: default_deadzone(),
            max_linear_mps: default_max_speed(),
            max_angular_rps: default_max_speed(),
        }
    }
}

impl Config {
    /// Validate and convert into the hub's runtime settings.
    ///
    /// # Errors
    ///
    /// [`HubError::Config`] for a zero tick period, an inverted ack delay
    /// range or a deadzone outside `[0, 1)`.
    pub fn to_hub_config(&self) -> Result<HubConfig, HubError> {
        if self.telemetry_period_ms == 0 {
            return Err(HubError::Config("telemetry_period_ms must be > 0".into()));
        }
        if self.ack_delay_min_ms > self.ack_delay_max_ms {
            return Err(HubError::Config(format!(
                "ack_delay_min_ms ({}) exceeds ack_delay_max_ms ({})",
                self.ack_delay_min_ms, self.ack_delay_max_ms
            )));
        }
        if !(0.0..1.0).contains(&self.deadzone) {
            return Err(HubError::Config(format!(
                "deadzone {} outside [0, 1)",
                self.deadzone
            )));
        }
        Ok(HubConfig {
            telemetry_period: Duration::from_millis(self.telemetry_period_ms),
            mock_telemetry: self.mock_telemetry,
            path_capacity: self.path_capacity,
            grid_size: self.grid_size,
            ack_delay_min: Duration::from_millis(self.ack_delay_min_ms),
            ack_delay_max: Duration::from_millis(self.ack_delay_max_ms),
            link_timeout: Duration::from_millis(self.link_timeout_ms),
            deadzone: self.deadzone,
            max_linear_mps: self.max_linear_mps,
            max_angular_rps: self.max_angular_rps,
            parameters: ParameterTree::default(),
        })
    }
}

/// Return the path to `~/.ugv/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".ugv").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `UGV_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `UGV_TELEMETRY_PERIOD_MS` | `telemetry_period_ms` |
/// | `UGV_MOCK_TELEMETRY` | `mock_telemetry` (`true`/`false`) |
/// | `UGV_ACK_DELAY_MIN_MS` | `ack_delay_min_ms` |
/// | `UGV_ACK_DELAY_MAX_MS` | `ack_delay_max_ms` |
/// | `UGV_LINK_TIMEOUT_MS` | `link_timeout_ms` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |name| std::env::var(name).ok());
}

pub(crate) fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("UGV_TELEMETRY_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.telemetry_period_ms = ms;
    }
    if let Some(v) = lookup("UGV_MOCK_TELEMETRY")
        && let Ok(on) = v.parse::<bool>()
    {
        cfg.mock_telemetry = on;
    }
    if let Some(v) = lookup("UGV_ACK_DELAY_MIN_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.ack_delay_min_ms = ms;
    }
    if let Some(v) = lookup("UGV_ACK_DELAY_MAX_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.ack_delay_max_ms = ms;
    }
    if let Some(v) = lookup("UGV_LINK_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.link_timeout_ms = ms;
    }
}

/// First launch: write the plain defaults to `~/.ugv/config.toml`, then
/// return them with the `UGV_*` overrides applied. Overrides are never
/// persisted.
pub fn init() -> Result<Config, String> {
    init_at(&config_path(), |name| std::env::var(name).ok())
}

pub(crate) fn init_at(
    path: &PathBuf,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, String> {
    let mut cfg = Config::default();
    save_to(&cfg, path)?;
    apply_overrides_from(&mut cfg, lookup);
    Ok(cfg)
}

pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
