mod commands;
mod console;
mod input;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use icepick_core::acquire::LauncherKind;
use icepick_core::InjectorConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "icepick")]
#[command(about = "Titanfall 2 mod launcher and script patcher")]
#[command(version)]
struct Cli {
    /// Configuration file (default: <config dir>/icepick/config.toml)
    #[arg(short, long, global = true, env = "ICEPICK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch the game, inject the SDK, then apply mods
    Launch(LaunchArgs),
    /// Apply mods to a game that is already running
    Patch(PatchArgs),
    /// Show the effective configuration, optionally changing it
    Config {
        /// Persist the SDK developer mode flag
        #[arg(long)]
        developer_mode: Option<bool>,
    },
}

#[derive(Args)]
pub struct LaunchArgs {
    /// How to start the game: direct, store or standalone
    #[arg(short, long, default_value = "direct")]
    pub launcher: LauncherKind,

    /// Game executable for the direct launcher
    #[arg(long)]
    pub game_path: Option<PathBuf>,

    /// Only inject into this process id
    #[arg(long)]
    pub pid: Option<u32>,

    /// Seconds to wait for the game (default depends on the launcher)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Mod directories to apply after injection
    #[arg(short = 'm', long = "mod", value_name = "DIR")]
    pub mods: Vec<PathBuf>,
}

#[derive(Args)]
pub struct PatchArgs {
    /// Mod directories to apply
    #[arg(short = 'm', long = "mod", value_name = "DIR", required = true)]
    pub mods: Vec<PathBuf>,

    /// Target process id
    #[arg(long, conflicts_with = "process", required_unless_present = "process")]
    pub pid: Option<u32>,

    /// Target process name, e.g. Titanfall2
    #[arg(long)]
    pub process: Option<String>,

    /// Fail a file instead of patching when its pointer is not unique
    #[arg(long)]
    pub reject_ambiguous: bool,
}

fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Failed to determine config directory")?;
    Ok(config_dir.join("icepick").join("config.toml"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("icepick=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = InjectorConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match cli.command {
        Command::Launch(args) => commands::launch::run(&config, args),
        Command::Patch(args) => commands::patch::run(args),
        Command::Config { developer_mode } => {
            commands::config::run(config, &config_path, developer_mode)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_launch() {
        let cli = Cli::try_parse_from([
            "icepick", "launch", "--launcher", "store", "--timeout", "90", "-m", "mods/a", "-m",
            "mods/b",
        ])
        .unwrap();

        match cli.command {
            Command::Launch(args) => {
                assert_eq!(args.launcher, LauncherKind::Store);
                assert_eq!(args.timeout, Some(90));
                assert_eq!(args.mods.len(), 2);
                assert!(args.pid.is_none());
            }
            _ => panic!("expected launch"),
        }
    }

    #[test]
    fn test_launch_defaults_to_direct() {
        let cli = Cli::try_parse_from(["icepick", "launch"]).unwrap();
        match cli.command {
            Command::Launch(args) => assert_eq!(args.launcher, LauncherKind::Direct),
            _ => panic!("expected launch"),
        }
    }

    #[test]
    fn test_patch_requires_one_target() {
        assert!(Cli::try_parse_from(["icepick", "patch", "-m", "mods/a"]).is_err());
        assert!(
            Cli::try_parse_from([
                "icepick", "patch", "-m", "mods/a", "--pid", "1", "--process", "Titanfall2"
            ])
            .is_err()
        );

        let cli = Cli::try_parse_from([
            "icepick",
            "patch",
            "-m",
            "mods/a",
            "--process",
            "Titanfall2",
            "--reject-ambiguous",
        ])
        .unwrap();
        match cli.command {
            Command::Patch(args) => {
                assert_eq!(args.process.as_deref(), Some("Titanfall2"));
                assert!(args.reject_ambiguous);
            }
            _ => panic!("expected patch"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from([
            "icepick",
            "config",
            "--developer-mode",
            "true",
            "--config",
            "custom.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Command::Config { developer_mode } => assert_eq!(developer_mode, Some(true)),
            _ => panic!("expected config"),
        }
    }
}
