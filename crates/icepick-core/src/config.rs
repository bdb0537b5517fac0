//! Launcher and injection configuration.
//!
//! Every field has a default, so a partial (or missing) TOML file is valid.

use std::fs;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

/// Defaults for process acquisition
pub mod acquisition {
    use std::time::Duration;

    /// Budget when launching the game executable directly
    pub const DIRECT_TIMEOUT: Duration = Duration::from_secs(30);
    /// The store client has to start the launcher first, so allow longer
    pub const STORE_TIMEOUT: Duration = Duration::from_secs(60);
    pub const STANDALONE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Interval between process checks
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
    /// Delay before the first check, the launcher expects late injection
    pub const WARMUP_DELAY: Duration = Duration::from_secs(1);

    pub const TARGET_PROCESS: &str = "Titanfall2";
    /// Module whose presence means the engine is far enough along to inject
    pub const READINESS_MODULE: &str = "tier0.dll";
    pub const LAUNCHER_PROXIES: [&str; 2] = ["Origin", "EASteamProxy"];

    pub const STORE_URL: &str = "steam://run/1237970";
    pub const STANDALONE_EXE: &str = "Titanfall2-unpacked.exe";
    pub const STANDALONE_ARGS: [&str; 1] = ["-multiple"];
}

/// Defaults for the injected SDK
pub mod sdk {
    pub const LIBRARY: &str = "TTF2SDK.dll";
    pub const INIT_SYMBOL: &str = "InitialiseSDK";
    /// Data directory, relative to the launcher's install directory
    pub const DATA_DIR: &str = "data";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectorConfig {
    pub direct_timeout_secs: u64,
    pub store_timeout_secs: u64,
    pub standalone_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub warmup_ms: u64,

    pub target_process: String,
    pub readiness_module: String,
    pub launcher_proxies: Vec<String>,

    pub store_url: String,
    pub standalone_exe: PathBuf,
    pub standalone_args: Vec<String>,

    pub sdk_library: String,
    pub sdk_init_symbol: String,
    pub data_dir: PathBuf,
    /// Overrides the SDK base path derived from the install directory
    pub base_path: Option<PathBuf>,

    pub developer_mode: bool,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            direct_timeout_secs: acquisition::DIRECT_TIMEOUT.as_secs(),
            store_timeout_secs: acquisition::STORE_TIMEOUT.as_secs(),
            standalone_timeout_secs: acquisition::STANDALONE_TIMEOUT.as_secs(),
            poll_interval_ms: acquisition::POLL_INTERVAL.as_millis() as u64,
            warmup_ms: acquisition::WARMUP_DELAY.as_millis() as u64,
            target_process: acquisition::TARGET_PROCESS.to_string(),
            readiness_module: acquisition::READINESS_MODULE.to_string(),
            launcher_proxies: acquisition::LAUNCHER_PROXIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            store_url: acquisition::STORE_URL.to_string(),
            standalone_exe: PathBuf::from(acquisition::STANDALONE_EXE),
            standalone_args: acquisition::STANDALONE_ARGS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sdk_library: sdk::LIBRARY.to_string(),
            sdk_init_symbol: sdk::INIT_SYMBOL.to_string(),
            data_dir: PathBuf::from(sdk::DATA_DIR),
            base_path: None,
            developer_mode: false,
        }
    }
}

impl InjectorConfig {
    /// Load from a TOML file, falling back to defaults if it does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content)?;
                debug!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    /// Base data path handed to the SDK, with a trailing separator.
    ///
    /// Derived from the directory of the running executable unless
    /// `base_path` is set.
    pub fn sdk_base_path(&self) -> Result<String> {
        let base = match &self.base_path {
            Some(path) => path.clone(),
            None => {
                let exe = std::env::current_exe()?;
                let install_dir = exe.parent().map(Path::to_path_buf).unwrap_or_default();
                install_dir.join(&self.data_dir)
            }
        };

        let mut base = base.to_string_lossy().into_owned();
        if !base.ends_with(MAIN_SEPARATOR) {
            base.push(MAIN_SEPARATOR);
        }
        Ok(base)
    }
}
