//! Error types for activation, hooking and per-call forwarding.
//!
//! Errors fall in two groups. Activation errors ([`InitError`] and the
//! errors it wraps) are fatal: the plugin reports failure to the host loader
//! and nothing stays active. Per-call errors ([`CallError`],
//! [`ResourceError`]) never cross the host boundary; the wrapper degrades to
//! "no augmentation this call" and reports through the diagnostic channel.

use std::fmt;
use std::path::PathBuf;

use tracing::{error, warn};

use crate::hooks::HookTarget;
use crate::keyvalues::ParseError;

/// How a condition is reported on the diagnostic channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts activation, or aborts the current call's work.
    Fatal,
    /// Logged and otherwise ignored.
    Advisory,
}

impl Severity {
    /// Writes `condition` to the diagnostic channel at this severity.
    pub fn log(self, condition: &dyn fmt::Display) {
        match self {
            Severity::Fatal => error!("{}", condition),
            Severity::Advisory => warn!("{}", condition),
        }
    }
}

/// Errors that abort plugin activation.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// No probed version of a host interface was found.
    #[error("could not resolve host interface {name}")]
    SymbolResolution { name: String },
    /// A required property path did not resolve.
    #[error("could not find property {class}.{path}: {source}")]
    PropertyNotFound {
        class: String,
        path: String,
        source: PropertyError,
    },
    /// Interception could not be installed on a resolved target.
    #[error("failed to install hook {hook}: {source}")]
    HookInstall { hook: String, source: HookError },
    /// Activation already completed on this instance.
    #[error("plugin is already loaded")]
    AlreadyLoaded,
    /// The plugin configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl InitError {
    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

/// Reasons a property lookup can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    #[error("no server class named {0}")]
    ClassNotFound(String),
    #[error("server class {0} has no property table")]
    MissingTable(String),
    #[error("property path is empty")]
    EmptyPath,
    #[error("path does not resolve below table {table}")]
    NotFound { table: String },
}

/// Reasons a hook cannot be installed.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The hook record already captured an original.
    #[error("hook is already installed")]
    AlreadyInstalled,
    /// Another record already intercepts the same target.
    #[error("{target} is already intercepted by {owner}")]
    TargetClaimed { target: HookTarget, owner: String },
    /// The target has no callable to intercept.
    #[error("target has no callable to intercept")]
    NoCallback,
    /// The host refused the redirect.
    #[error("host rejected the redirect: {0}")]
    Rejected(String),
}

/// Conditions raised while an installed wrapper runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The wrapper ran before its original was captured.
    #[error("{hook}: original function is null")]
    NullOriginal { hook: String },
    /// The original ran but produced no data.
    #[error("{hook}: original function returned null")]
    EmptyOriginal { hook: String },
}

impl CallError {
    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }

    /// Writes the condition to the diagnostic channel.
    pub fn report(&self) {
        self.severity().log(self)
    }
}

/// Failures loading a configuration resource.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("resource {path} not found")]
    NotFound { path: String },
    #[error("unknown search path {0}")]
    UnknownSearchPath(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: ParseError },
    /// Host-specific failure reported by a foreign loader.
    #[error("{0}")]
    Host(String),
}

impl ResourceError {
    pub fn severity(&self) -> Severity {
        Severity::Advisory
    }

    pub fn report(&self) {
        self.severity().log(self)
    }
}

/// Failures loading the plugin configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Runs `f` under a local subscriber and returns what it logged.
    fn logged(f: impl FnOnce()) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = out.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_property_not_found_message() {
        let err = InitError::PropertyNotFound {
            class: "CBasePlayer".to_string(),
            path: "localdata".to_string(),
            source: PropertyError::ClassNotFound("CBasePlayer".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "could not find property CBasePlayer.localdata: no server class named CBasePlayer"
        );
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn test_call_error_severity() {
        let err = CallError::EmptyOriginal {
            hook: "mod_events".to_string(),
        };
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(err.to_string(), "mod_events: original function returned null");
    }

    #[test]
    fn test_resource_errors_are_advisory() {
        let err = ResourceError::NotFound {
            path: "resource/modevents.res".to_string(),
        };
        assert_eq!(err.severity(), Severity::Advisory);
    }

    #[test]
    fn test_hook_claimed_message() {
        let err = HookError::TargetClaimed {
            target: HookTarget::Function { address: 0x1000 },
            owner: "local_data".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "function@0x1000 is already intercepted by local_data"
        );
    }

    #[test]
    fn test_report_logs_at_severity() {
        let resource = logged(|| {
            ResourceError::NotFound {
                path: "resource/serverevents.res".to_string(),
            }
            .report()
        });
        assert!(resource.contains("WARN"), "{resource}");
        assert!(resource.contains("resource resource/serverevents.res not found"));

        let call = logged(|| {
            CallError::NullOriginal {
                hook: "local_data".to_string(),
            }
            .report()
        });
        assert!(call.contains("ERROR"), "{call}");
        assert!(call.contains("local_data: original function is null"));
    }
}
