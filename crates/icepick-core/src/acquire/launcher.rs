//! Starting the target process for each launch strategy.

use std::process::Command;

use tracing::{debug, info};

use super::request::LaunchStrategy;
use crate::error::{Error, Result};

/// Starts the target process.
pub trait Launcher: Send + Sync {
    /// Launch according to `strategy`.
    ///
    /// Returns the pid of the process to inject into when it is known at
    /// launch time. Launches that go through an external launcher return
    /// `None` and the process is found by name instead.
    fn launch(&self, strategy: &LaunchStrategy) -> Result<Option<u32>>;
}

/// Launches real processes through the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, strategy: &LaunchStrategy) -> Result<Option<u32>> {
        match strategy {
            LaunchStrategy::Direct { path } => {
                info!("Launching {}", path.display());
                // The game re-launches itself through its store launcher, so
                // the spawned pid is not the one that gets injected
                let child = Command::new(path)
                    .spawn()
                    .map_err(|e| Error::LaunchFailed(format!("{}: {}", path.display(), e)))?;
                debug!("Spawned launcher stub with pid {}", child.id());
                Ok(None)
            }
            LaunchStrategy::Store { url } => {
                info!("Launching via {}", url);
                open::that(url).map_err(|e| Error::LaunchFailed(format!("{}: {}", url, e)))?;
                Ok(None)
            }
            LaunchStrategy::Standalone { exe, args } => {
                info!("Launching {} {}", exe.display(), args.join(" "));
                let child = Command::new(exe)
                    .args(args)
                    .spawn()
                    .map_err(|e| Error::LaunchFailed(format!("{}: {}", exe.display(), e)))?;
                debug!("Spawned standalone process with pid {}", child.id());
                Ok(Some(child.id()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_missing_executable_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist.exe");

        for strategy in [
            LaunchStrategy::Direct {
                path: missing.clone(),
            },
            LaunchStrategy::Standalone {
                exe: missing.clone(),
                args: vec!["-multiple".to_string()],
            },
        ] {
            let err = SystemLauncher.launch(&strategy).unwrap_err();
            assert!(matches!(err, Error::LaunchFailed(_)), "{:?}", err);
            assert!(err.to_string().contains("does-not-exist"));
        }
    }

    #[test]
    fn test_error_is_terminal() {
        let err = SystemLauncher
            .launch(&LaunchStrategy::Direct {
                path: PathBuf::from("/nonexistent/icepick/game"),
            })
            .unwrap_err();
        assert!(err.is_terminal());
    }
}
