use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};

use crate::config::InjectorConfig;

/// How the target process gets started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// Run the game executable at `path` through its launcher
    Direct { path: PathBuf },
    /// Hand a store protocol URL to the shell
    Store { url: String },
    /// Spawn an unpacked executable ourselves
    Standalone { exe: PathBuf, args: Vec<String> },
}

/// Launcher selection without its parameters, for the CLI and config.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LauncherKind {
    Direct,
    Store,
    Standalone,
}

impl LaunchStrategy {
    pub fn kind(&self) -> LauncherKind {
        match self {
            LaunchStrategy::Direct { .. } => LauncherKind::Direct,
            LaunchStrategy::Store { .. } => LauncherKind::Store,
            LaunchStrategy::Standalone { .. } => LauncherKind::Standalone,
        }
    }

    /// Fill in a strategy of the given kind from configuration.
    ///
    /// `game_path` is only used by [`LauncherKind::Direct`]; without it the
    /// configured target process name is launched.
    pub fn from_kind(kind: LauncherKind, game_path: Option<PathBuf>, config: &InjectorConfig) -> Self {
        match kind {
            LauncherKind::Direct => LaunchStrategy::Direct {
                path: game_path.unwrap_or_else(|| PathBuf::from(&config.target_process)),
            },
            LauncherKind::Store => LaunchStrategy::Store {
                url: config.store_url.clone(),
            },
            LauncherKind::Standalone => LaunchStrategy::Standalone {
                exe: config.standalone_exe.clone(),
                args: config.standalone_args.clone(),
            },
        }
    }
}

impl fmt::Display for LauncherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

/// One launch attempt. Created per launch, discarded when it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    pub strategy: LaunchStrategy,
    pub process_name: String,
    pub timeout: Duration,
    pub known_pid: Option<u32>,
}

impl AcquisitionRequest {
    /// Derive the watched process name and timeout for `strategy`.
    pub fn from_strategy(strategy: LaunchStrategy, config: &InjectorConfig) -> Self {
        let (process_name, timeout_secs) = match &strategy {
            LaunchStrategy::Direct { path } => (
                process_name_of(path).unwrap_or_else(|| config.target_process.clone()),
                config.direct_timeout_secs,
            ),
            LaunchStrategy::Store { .. } => {
                (config.target_process.clone(), config.store_timeout_secs)
            }
            LaunchStrategy::Standalone { exe, .. } => (
                process_name_of(exe).unwrap_or_else(|| config.target_process.clone()),
                config.standalone_timeout_secs,
            ),
        };

        Self {
            strategy,
            process_name,
            timeout: Duration::from_secs(timeout_secs),
            known_pid: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_known_pid(mut self, pid: u32) -> Self {
        self.known_pid = Some(pid);
        self
    }
}

/// Process name for an executable path: the file name without extension.
pub fn process_name_of(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

/// Compare an executable name against a process name, ignoring case and a
/// trailing `.exe`.
pub fn matches_process_name(exe_name: &str, name: &str) -> bool {
    strip_exe(exe_name).eq_ignore_ascii_case(strip_exe(name))
}

fn strip_exe(name: &str) -> &str {
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe") {
        &name[..len - 4]
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_direct_uses_file_stem() {
        let config = InjectorConfig::default();
        let strategy = LaunchStrategy::Direct {
            path: PathBuf::from("games").join("Titanfall2.exe"),
        };
        let request = AcquisitionRequest::from_strategy(strategy, &config);

        assert_eq!(request.process_name, "Titanfall2");
        assert_eq!(request.timeout, Duration::from_secs(30));
        assert_eq!(request.known_pid, None);
    }

    #[test]
    fn test_store_uses_target_and_longer_timeout() {
        let config = InjectorConfig::default();
        let strategy = LaunchStrategy::from_kind(LauncherKind::Store, None, &config);
        let request = AcquisitionRequest::from_strategy(strategy, &config);

        assert_eq!(
            request.strategy,
            LaunchStrategy::Store {
                url: "steam://run/1237970".to_string()
            }
        );
        assert_eq!(request.process_name, "Titanfall2");
        assert_eq!(request.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_standalone_defaults() {
        let config = InjectorConfig::default();
        let strategy = LaunchStrategy::from_kind(LauncherKind::Standalone, None, &config);
        let request = AcquisitionRequest::from_strategy(strategy, &config)
            .with_timeout(Duration::from_secs(5))
            .with_known_pid(42);

        assert_eq!(request.process_name, "Titanfall2-unpacked");
        assert_eq!(request.timeout, Duration::from_secs(5));
        assert_eq!(request.known_pid, Some(42));
        match request.strategy {
            LaunchStrategy::Standalone { args, .. } => assert_eq!(args, ["-multiple"]),
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    #[test]
    fn test_launcher_kind_parse() {
        assert_eq!(LauncherKind::from_str("store").unwrap(), LauncherKind::Store);
        assert_eq!(LauncherKind::from_str("Direct").unwrap(), LauncherKind::Direct);
        assert!(LauncherKind::from_str("origin").is_err());

        for kind in LauncherKind::iter() {
            let config = InjectorConfig::default();
            assert_eq!(LaunchStrategy::from_kind(kind, None, &config).kind(), kind);
        }
    }

    #[test]
    fn test_matches_process_name() {
        assert!(matches_process_name("Titanfall2.exe", "Titanfall2"));
        assert!(matches_process_name("titanfall2.EXE", "Titanfall2"));
        assert!(matches_process_name("Titanfall2", "Titanfall2.exe"));
        assert!(!matches_process_name("Titanfall2-unpacked.exe", "Titanfall2"));
        assert!(!matches_process_name(".exe", "Titanfall2"));
    }
}
