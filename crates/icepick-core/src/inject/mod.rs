//! Loading the SDK library into the acquired process and initialising it.

mod remote;

pub use remote::{RemoteInjector, RemoteSession};

use std::path::Path;

use tracing::{debug, info};

use crate::config::InjectorConfig;
use crate::error::{Error, Result};
use crate::notify::{InjectionEvent, Notifier};

/// Arguments passed to the SDK's initialisation export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkSettings {
    /// Data directory, with a trailing separator
    pub base_path: String,
    pub developer_mode: bool,
}

/// Size of the settings record as laid out in the target
pub const SETTINGS_RECORD_SIZE: usize = 16;

/// Lay out the settings record the SDK expects: an 8-byte pointer to the
/// NUL-terminated base path, a 4-byte BOOL, then padding to 8-byte
/// alignment.
pub fn encode_settings(base_path_ptr: u64, developer_mode: bool) -> [u8; SETTINGS_RECORD_SIZE] {
    let mut record = [0u8; SETTINGS_RECORD_SIZE];
    record[..8].copy_from_slice(&base_path_ptr.to_le_bytes());
    record[8..12].copy_from_slice(&(developer_mode as u32).to_le_bytes());
    record
}

/// A live attachment to one process.
pub trait InjectionSession {
    /// Directory searched for libraries loaded by this session.
    fn set_library_search_path(&mut self, dir: &Path) -> Result<()>;

    fn inject_library(&mut self, library: &str) -> Result<()>;

    /// Call `symbol` in an injected `library`, passing `settings`.
    fn call_export(&mut self, library: &str, symbol: &str, settings: &SdkSettings) -> Result<()>;
}

pub trait InjectionProvider: Send + Sync {
    type Session: InjectionSession;

    fn attach(&self, pid: u32) -> Result<Self::Session>;
}

/// Inject the SDK into `pid` and call its init export.
///
/// Emits `InjectingIntoProcess` before touching the process and
/// `InjectionComplete` once the export returned. Every failure comes back
/// as [`Error::InjectionFailure`].
pub fn inject_sdk<P: InjectionProvider>(
    provider: &P,
    pid: u32,
    config: &InjectorConfig,
    notifier: &Notifier,
) -> Result<()> {
    notifier.emit(InjectionEvent::InjectingIntoProcess);
    info!("Injecting {} into process {}", config.sdk_library, pid);

    run_injection(provider, pid, config).map_err(|e| match e {
        Error::InjectionFailure(_) => e,
        other => Error::InjectionFailure(other.to_string()),
    })?;

    notifier.emit(InjectionEvent::InjectionComplete);
    info!("Injection into process {} complete", pid);
    Ok(())
}

fn run_injection<P: InjectionProvider>(provider: &P, pid: u32, config: &InjectorConfig) -> Result<()> {
    let settings = SdkSettings {
        base_path: config.sdk_base_path()?,
        developer_mode: config.developer_mode,
    };
    let search_path = std::env::current_dir()?;
    debug!(
        "SDK search path {}, base path {}, developer mode {}",
        search_path.display(),
        settings.base_path,
        settings.developer_mode
    );

    let mut session = provider.attach(pid)?;
    session.set_library_search_path(&search_path)?;
    session.inject_library(&config.sdk_library)?;
    session.call_export(&config.sdk_library, &config.sdk_init_symbol, &settings)
}


#[cfg(test)]
mod tests {
    use std::path::{MAIN_SEPARATOR, PathBuf};
    use std::sync::Arc;

    use super::mock::{Call, MockInjector};
    use super::*;
    use crate::notify::tests::RecordingObserver;

    fn config() -> InjectorConfig {
        InjectorConfig {
            base_path: Some(PathBuf::from("install").join("data")),
            developer_mode: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_settings_record_layout() {
        let record = encode_settings(0x0000_7FF6_1234_5678, true);
        assert_eq!(record.len(), 16);
        assert_eq!(&record[..8], &0x0000_7FF6_1234_5678u64.to_le_bytes());
        assert_eq!(&record[8..12], &[1, 0, 0, 0]);
        assert_eq!(&record[12..], &[0, 0, 0, 0]);

        assert_eq!(&encode_settings(1, false)[8..12], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_inject_sdk_sequence() {
        let injector = MockInjector::new();
        let observer = Arc::new(RecordingObserver::default());
        let notifier = Notifier::new().with(observer.clone());

        inject_sdk(&injector, 4242, &config(), &notifier).unwrap();

        let calls = injector.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], Call::Attach(4242));
        assert_eq!(calls[1], Call::SearchPath(std::env::current_dir().unwrap()));
        assert_eq!(calls[2], Call::Inject("TTF2SDK.dll".to_string()));
        match &calls[3] {
            Call::Export(library, symbol, settings) => {
                assert_eq!(library, "TTF2SDK.dll");
                assert_eq!(symbol, "InitialiseSDK");
                assert!(settings.developer_mode);
                assert!(settings.base_path.ends_with(&format!("data{}", MAIN_SEPARATOR)));
            }
            other => panic!("unexpected call {:?}", other),
        }

        assert_eq!(
            observer.events(),
            vec![
                InjectionEvent::InjectingIntoProcess,
                InjectionEvent::InjectionComplete
            ]
        );
    }

    #[test]
    fn test_failure_is_injection_failure() {
        let injector = MockInjector::failing();
        let observer = Arc::new(RecordingObserver::default());
        let notifier = Notifier::new().with(observer.clone());

        let err = inject_sdk(&injector, 1, &config(), &notifier).unwrap_err();
        assert!(matches!(err, Error::InjectionFailure(_)));
        assert!(err.to_string().contains("Error Code 126"));
        assert_eq!(observer.events(), vec![InjectionEvent::InjectingIntoProcess]);
    }
}
