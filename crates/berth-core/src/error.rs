//! Error types for the berth broker.
//!
//! Store-facing failures translate into named bus errors and never crash the
//! process; `InternalConsistency` marks a broken store/registry contract and
//! is reported loudly before the current operation is abandoned.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::BusConfig;
use crate::record::AppId;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BerthError>;

/// Main error type for berth.
#[derive(Debug, Error)]
pub enum BerthError {
    /// Malformed request input, e.g. a relative install path.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The store rejected an install. The cause is opaque to the broker.
    #[error("error installing application with path: {}", path.display())]
    InstallFailed { path: PathBuf },

    /// The store rejected an uninstall.
    #[error("error trying to uninstall application with id {app_id}")]
    UninstallFailed { app_id: AppId },

    /// Defensive re-validation missed: no such application is published.
    #[error("no installed application with id {app_id}")]
    NotFound { app_id: AppId },

    /// Exporting a method handler against the transport failed. Non-fatal;
    /// callers of the unexported method get an unknown-method error instead.
    #[error("failed to export {interface}.{method} on {path}")]
    ExportFailed {
        path: String,
        interface: String,
        method: String,
    },

    /// The store/registry 1:1 invariant has been broken.
    #[error("internal consistency violation: {message}")]
    InternalConsistency { message: String },

    /// Call addressed to an object path nothing is exported at.
    #[error("unknown object: {path}")]
    UnknownObject { path: String },

    /// Call addressed to a method not exported on an existing object.
    #[error("unknown method {interface}.{method} on {path}")]
    UnknownMethod {
        path: String,
        interface: String,
        method: String,
    },

    /// Named error received from the remote side of a bus connection.
    #[error("{name}: {message}")]
    Bus { name: String, message: String },

    /// Malformed frame or oversized payload on a bus connection.
    #[error("bus protocol error: {message}")]
    Protocol { message: String },

    /// The peer closed the connection before a response arrived.
    #[error("bus connection closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BerthError {
    /// The named error domain used when this error crosses the bus.
    ///
    /// One domain per object type: root-object failures report under the
    /// manager domain, per-application failures under the application domain.
    pub fn bus_name(&self) -> &'static str {
        match self {
            BerthError::InvalidArgument { .. } | BerthError::InstallFailed { .. } => {
                BusConfig::MANAGER_ERROR
            }
            BerthError::UninstallFailed { .. } | BerthError::NotFound { .. } => {
                BusConfig::APPLICATION_ERROR
            }
            BerthError::UnknownObject { .. } => BusConfig::BUS_ERROR_UNKNOWN_OBJECT,
            BerthError::UnknownMethod { .. } => BusConfig::BUS_ERROR_UNKNOWN_METHOD,
            _ => BusConfig::BUS_ERROR_FAILED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_domains_split_by_object_type() {
        let install = BerthError::InstallFailed {
            path: PathBuf::from("/tmp/pkg.wgt"),
        };
        let uninstall = BerthError::UninstallFailed {
            app_id: AppId::new("app1"),
        };

        assert_eq!(install.bus_name(), BusConfig::MANAGER_ERROR);
        assert_eq!(uninstall.bus_name(), BusConfig::APPLICATION_ERROR);
        assert_ne!(install.bus_name(), uninstall.bus_name());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = BerthError::InstallFailed {
            path: PathBuf::from("/tmp/pkg.wgt"),
        };
        assert!(err.to_string().contains("/tmp/pkg.wgt"));

        let err = BerthError::UninstallFailed {
            app_id: AppId::new("app7"),
        };
        assert!(err.to_string().contains("app7"));
    }

    #[test]
    fn test_unknown_method_maps_to_bus_domain() {
        let err = BerthError::UnknownMethod {
            path: "/installed/app1".into(),
            interface: "berth.Installed.Application1".into(),
            method: "Frobnicate".into(),
        };
        assert_eq!(err.bus_name(), BusConfig::BUS_ERROR_UNKNOWN_METHOD);
    }
}
