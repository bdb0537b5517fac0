//! Launch the game, inject the SDK and apply mods.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use icepick_core::patch::PatchOptions;
use icepick_core::{
    AcquisitionRequest, InjectorConfig, LaunchStrategy, Notifier, ProcessAcquirer, RemoteInjector,
    SystemLauncher, ToolhelpInspector, TracingObserver,
};
use tracing::info;

use super::patch::{apply_mods, load_mods};
use crate::LaunchArgs;
use crate::console::ConsoleObserver;
use crate::input;

pub fn run(config: &InjectorConfig, args: LaunchArgs) -> Result<()> {
    // Load mods before launching so a broken mod.json fails fast
    let mods = load_mods(&args.mods)?;
    let request = build_request(config, &args);

    let cancel = input::cancel_on_interrupt()?;
    let acquirer = ProcessAcquirer::new(
        ToolhelpInspector,
        SystemLauncher,
        RemoteInjector,
        config.clone(),
    )
    .with_notifier(notifier());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start async runtime")?;

    if std::io::stdout().is_terminal() {
        println!("Waiting for {}... (Press Esc or q to cancel)", request.process_name);
    }
    let acquired = runtime
        .block_on(acquirer.acquire(&request, &cancel))
        .context("Failed to inject the SDK")?;
    // Stop the keyboard monitor
    cancel.trigger();

    info!(
        "SDK injected into {} (pid {}) after {:.1}s",
        acquired.process_name,
        acquired.pid,
        acquired.elapsed.as_secs_f32()
    );

    apply_mods(acquired.pid, &mods, PatchOptions::default())
}

fn build_request(config: &InjectorConfig, args: &LaunchArgs) -> AcquisitionRequest {
    let strategy = LaunchStrategy::from_kind(args.launcher, args.game_path.clone(), config);
    let mut request = AcquisitionRequest::from_strategy(strategy, config);
    if let Some(seconds) = args.timeout {
        request = request.with_timeout(Duration::from_secs(seconds));
    }
    if let Some(pid) = args.pid {
        request = request.with_known_pid(pid);
    }
    request
}

/// Colored output on a terminal, log lines otherwise.
fn notifier() -> Notifier {
    if std::io::stdout().is_terminal() {
        Notifier::new().with(Arc::new(ConsoleObserver))
    } else {
        Notifier::new().with(Arc::new(TracingObserver))
    }
}
