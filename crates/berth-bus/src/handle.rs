//! Transport surface handed to the manager: method export, object
//! unregistration, and signal broadcast.
//!
//! The route table decides which `(path, interface, method)` triples are
//! reachable from the outside. Connection tasks consult it before forwarding
//! a call, so a method that failed to export answers with an unknown-method
//! error instead of reaching the manager.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use berth_core::{BerthError, BusConfig, Result};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::protocol::BusMessage;

type RouteTable = HashMap<String, HashSet<(String, String)>>;

/// Cloneable handle to the bus transport.
#[derive(Clone)]
pub struct BusHandle {
    routes: Arc<RwLock<RouteTable>>,
    signals: broadcast::Sender<BusMessage>,
}

impl Default for BusHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl BusHandle {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(BusConfig::SIGNAL_BUFFER);
        Self {
            routes: Arc::new(RwLock::new(RouteTable::new())),
            signals,
        }
    }

    fn read_routes(&self) -> Result<RwLockReadGuard<'_, RouteTable>> {
        self.routes
            .read()
            .map_err(|_| BerthError::InternalConsistency {
                message: "bus route table lock poisoned".to_string(),
            })
    }

    fn write_routes(&self) -> Result<RwLockWriteGuard<'_, RouteTable>> {
        self.routes
            .write()
            .map_err(|_| BerthError::InternalConsistency {
                message: "bus route table lock poisoned".to_string(),
            })
    }

    /// Export a method handler at `path`.
    ///
    /// Fails if the same method is already exported there. Export failure is
    /// not fatal to the object: it stays published, and callers of the
    /// missing method receive an unknown-method error.
    pub fn export_method(&self, path: &str, interface: &str, method: &str) -> Result<()> {
        let mut routes = self.write_routes()?;
        let methods = routes.entry(path.to_string()).or_default();
        if !methods.insert((interface.to_string(), method.to_string())) {
            return Err(BerthError::ExportFailed {
                path: path.to_string(),
                interface: interface.to_string(),
                method: method.to_string(),
            });
        }
        Ok(())
    }

    /// Drop every export at `path`. Returns false if nothing was exported.
    pub fn unregister_object(&self, path: &str) -> bool {
        match self.write_routes() {
            Ok(mut routes) => routes.remove(path).is_some(),
            Err(_) => false,
        }
    }

    /// Broadcast a signal to every connected subscriber. Having no
    /// subscribers is not an error.
    pub fn send_signal(&self, path: &str, interface: &str, member: &str, body: Value) {
        let _ = self.signals.send(BusMessage::Signal {
            path: path.to_string(),
            interface: interface.to_string(),
            member: member.to_string(),
            body,
        });
    }

    /// Check that a call addresses an exported method.
    pub(crate) fn resolve(&self, path: &str, interface: &str, method: &str) -> Result<()> {
        let routes = self.read_routes()?;
        let Some(methods) = routes.get(path) else {
            return Err(BerthError::UnknownObject {
                path: path.to_string(),
            });
        };
        if !methods.contains(&(interface.to_string(), method.to_string())) {
            return Err(BerthError::UnknownMethod {
                path: path.to_string(),
                interface: interface.to_string(),
                method: method.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.signals.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_export_then_resolve() {
        let bus = BusHandle::new();
        bus.export_method("/installed/app1", BusConfig::APPLICATION_INTERFACE, "Uninstall")
            .unwrap();

        assert!(bus
            .resolve("/installed/app1", BusConfig::APPLICATION_INTERFACE, "Uninstall")
            .is_ok());
    }

    #[test]
    fn test_duplicate_export_fails() {
        let bus = BusHandle::new();
        bus.export_method("/installed", BusConfig::MANAGER_INTERFACE, "Install")
            .unwrap();

        let err = bus
            .export_method("/installed", BusConfig::MANAGER_INTERFACE, "Install")
            .unwrap_err();
        assert!(matches!(err, BerthError::ExportFailed { .. }));
    }

    #[test]
    fn test_resolve_unknown_object_and_method() {
        let bus = BusHandle::new();
        bus.export_method("/installed/app1", BusConfig::APPLICATION_INTERFACE, "Uninstall")
            .unwrap();

        let err = bus
            .resolve("/installed/ghost", BusConfig::APPLICATION_INTERFACE, "Uninstall")
            .unwrap_err();
        assert!(matches!(err, BerthError::UnknownObject { .. }));

        let err = bus
            .resolve("/installed/app1", BusConfig::APPLICATION_INTERFACE, "Frobnicate")
            .unwrap_err();
        assert!(matches!(err, BerthError::UnknownMethod { .. }));
    }

    #[test]
    fn test_unregister_removes_all_routes() {
        let bus = BusHandle::new();
        bus.export_method("/installed/app1", BusConfig::APPLICATION_INTERFACE, "Uninstall")
            .unwrap();

        assert!(bus.unregister_object("/installed/app1"));
        assert!(!bus.unregister_object("/installed/app1"));
        assert!(bus
            .resolve("/installed/app1", BusConfig::APPLICATION_INTERFACE, "Uninstall")
            .is_err());
    }

    #[tokio::test]
    async fn test_signals_reach_subscribers() {
        let bus = BusHandle::new();
        let mut rx = bus.subscribe();

        bus.send_signal(
            BusConfig::MANAGER_PATH,
            BusConfig::OBJECT_MANAGER_INTERFACE,
            BusConfig::INTERFACES_ADDED,
            json!({"path": "/installed/app1"}),
        );

        match rx.recv().await.unwrap() {
            BusMessage::Signal { member, .. } => {
                assert_eq!(member, BusConfig::INTERFACES_ADDED);
            }
            other => panic!("expected signal, got {other:?}"),
        }
    }

    #[test]
    fn test_signal_without_subscribers_is_fine() {
        let bus = BusHandle::new();
        bus.send_signal("/installed", "iface", "member", json!({}));
    }
}
