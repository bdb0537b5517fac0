//! Launch, watch, validate, inject.
//!
//! One acquisition walks `Launching -> Watching -> Validating -> Injected`
//! and stops in `TimedOut`, `Failed` or `Cancelled` otherwise. Nothing is
//! retried after a terminal state; injection is attempted at most once.

use std::sync::Mutex;
use std::time::Duration;

use strum::IntoStaticStr;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::inspect::{ProcessEntry, ProcessInspector};
use super::launcher::Launcher;
use super::request::{AcquisitionRequest, matches_process_name};
use super::signal::CancelSignal;
use crate::config::InjectorConfig;
use crate::error::{Error, Result};
use crate::inject::{InjectionProvider, inject_sdk};
use crate::notify::{InjectionEvent, Notifier};

/// Title of the alert raised when an acquisition ends in failure
pub const INJECTION_FAILED_TITLE: &str = "Injection Failed";
pub const LAUNCH_FAILED_TITLE: &str = "Launch Failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum AcquisitionState {
    Idle,
    Launching,
    Watching,
    Validating,
    Injected,
    TimedOut,
    Failed,
    Cancelled,
}

impl AcquisitionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AcquisitionState::Injected
                | AcquisitionState::TimedOut
                | AcquisitionState::Failed
                | AcquisitionState::Cancelled
        )
    }
}

/// The process the SDK was injected into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredProcess {
    pub pid: u32,
    pub process_name: String,
    /// Time from launch to completed injection
    pub elapsed: Duration,
}

pub struct ProcessAcquirer<I, L, J> {
    inspector: I,
    launcher: L,
    injector: J,
    config: InjectorConfig,
    notifier: Notifier,
    state: Mutex<AcquisitionState>,
}

impl<I, L, J> ProcessAcquirer<I, L, J>
where
    I: ProcessInspector,
    L: Launcher,
    J: InjectionProvider,
{
    pub fn new(inspector: I, launcher: L, injector: J, config: InjectorConfig) -> Self {
        Self {
            inspector,
            launcher,
            injector,
            config,
            notifier: Notifier::new(),
            state: Mutex::new(AcquisitionState::Idle),
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn state(&self) -> AcquisitionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: AcquisitionState) {
        let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *current == state {
            return;
        }
        if state.is_terminal() {
            debug!(
                "Acquisition finished in {} (from {})",
                <&str>::from(state),
                <&str>::from(*current)
            );
        } else {
            trace!(
                "Acquisition {} -> {}",
                <&str>::from(*current),
                <&str>::from(state)
            );
        }
        *current = state;
    }

    /// Launch the target, wait for it to become injectable, and inject the
    /// SDK.
    pub async fn acquire(
        &self,
        request: &AcquisitionRequest,
        cancel: &CancelSignal,
    ) -> Result<AcquiredProcess> {
        let result = self.run(request, cancel).await;
        self.set_state(match &result {
            Ok(_) => AcquisitionState::Injected,
            Err(Error::Timeout { .. }) => AcquisitionState::TimedOut,
            Err(Error::Cancelled) => AcquisitionState::Cancelled,
            Err(_) => AcquisitionState::Failed,
        });
        result
    }

    async fn run(
        &self,
        request: &AcquisitionRequest,
        cancel: &CancelSignal,
    ) -> Result<AcquiredProcess> {
        self.set_state(AcquisitionState::Launching);
        self.notifier.emit(InjectionEvent::LaunchingProcess);

        let launched_pid = match self.launcher.launch(&request.strategy) {
            Ok(pid) => pid,
            Err(e) => return Err(self.fatal(LAUNCH_FAILED_TITLE, e)),
        };
        let known_pid = request.known_pid.or(launched_pid);
        let start = Instant::now();

        info!(
            "Waiting up to {}s for {}{}",
            request.timeout.as_secs(),
            request.process_name,
            known_pid.map(|pid| format!(" (pid {})", pid)).unwrap_or_default()
        );

        // The launcher expects late injection, injecting too early can fail
        if cancel.wait(self.config.warmup()).await {
            return Err(self.cancelled());
        }

        while start.elapsed() < request.timeout {
            self.set_state(AcquisitionState::Watching);

            match self.poll(&request.process_name, known_pid) {
                Ok(Some(pid)) => {
                    if let Err(e) = inject_sdk(&self.injector, pid, &self.config, &self.notifier) {
                        return Err(self.fatal(INJECTION_FAILED_TITLE, e));
                    }
                    return Ok(AcquiredProcess {
                        pid,
                        process_name: request.process_name.clone(),
                        elapsed: start.elapsed(),
                    });
                }
                Ok(None) => {}
                Err(e) if e.is_terminal() => {
                    return Err(self.fatal(INJECTION_FAILED_TITLE, e));
                }
                Err(e) => {
                    warn!("Process check failed: {}", e);
                    self.notifier.exception(e.to_string());
                }
            }

            if cancel.wait(self.config.poll_interval()).await {
                return Err(self.cancelled());
            }
        }

        let err = Error::Timeout {
            seconds: request.timeout.as_secs(),
            process: request.process_name.clone(),
        };
        Err(self.fatal(INJECTION_FAILED_TITLE, err))
    }

    /// One check of the process table. Returns the pid to inject into once a
    /// candidate is accepted and ready.
    fn poll(&self, process_name: &str, known_pid: Option<u32>) -> Result<Option<u32>> {
        let processes = self.inspector.processes()?;

        for candidate in processes
            .iter()
            .filter(|p| matches_process_name(&p.exe_name, process_name))
        {
            let accepted = match known_pid {
                Some(pid) => candidate.pid == pid,
                None => self.launched_by_proxy(candidate, &processes),
            };
            if !accepted {
                trace!("Ignoring {} (pid {})", candidate.exe_name, candidate.pid);
                continue;
            }

            self.set_state(AcquisitionState::Validating);
            if self
                .inspector
                .find_module(candidate.pid, &self.config.readiness_module)?
                .is_some()
            {
                debug!(
                    "Process {} has {} loaded",
                    candidate.pid, self.config.readiness_module
                );
                return Ok(Some(candidate.pid));
            }
            debug!(
                "Process {} found, waiting for {}",
                candidate.pid, self.config.readiness_module
            );
        }

        Ok(None)
    }

    fn launched_by_proxy(&self, candidate: &ProcessEntry, processes: &[ProcessEntry]) -> bool {
        processes
            .iter()
            .find(|p| p.pid == candidate.parent_pid)
            .is_some_and(|parent| {
                self.config
                    .launcher_proxies
                    .iter()
                    .any(|proxy| matches_process_name(&parent.exe_name, proxy))
            })
    }

    /// Report a terminal failure and hand the error back.
    fn fatal(&self, title: &str, err: Error) -> Error {
        let message = err.to_string();
        warn!("{}", message);
        self.notifier.exception(message.clone());
        self.notifier.alert(title, &message);
        err
    }

    fn cancelled(&self) -> Error {
        info!("Process acquisition cancelled");
        Error::Cancelled
    }
}
