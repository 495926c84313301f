//! The installed-applications manager: RPC handlers, lifecycle broadcast,
//! and the store observer that keeps the registry in step with the store.
//!
//! All bus calls funnel through one mpsc channel into [`InstalledManager::run`],
//! so the store and the registry are mutated from a single logical thread.
//! There is no locking here, only reentrancy: the store delivers its
//! installed/uninstalled notifications synchronously from inside
//! `install`/`uninstall`, nesting registry mutation within store mutation.
//! Each registry operation is individually atomic, so the nesting can never
//! observe a half-updated collection.

use std::path::PathBuf;

use berth_core::{
    AppId, ApplicationRecord, ApplicationStore, BerthError, BusConfig, Registry, Result,
    StoreObserver,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::handle::BusHandle;
use crate::protocol::BusMessage;

/// One method invocation in flight from a connection task to the manager.
///
/// The response is not returned; it is sent through `responder` once the
/// handler decides to respond.
#[derive(Debug)]
pub struct BusCall {
    pub id: u64,
    pub path: String,
    pub interface: String,
    pub method: String,
    pub args: Value,
    pub responder: oneshot::Sender<BusMessage>,
}

/// Owns the store and the registry and serializes every mutation.
pub struct InstalledManager<S: ApplicationStore> {
    store: S,
    registry: Registry,
    bus: BusHandle,
}

impl<S: ApplicationStore> InstalledManager<S> {
    /// Create the manager, export the root object's methods, and publish an
    /// object for every application the store already has installed.
    pub fn new(store: S, bus: BusHandle) -> Self {
        let mut manager = Self {
            store,
            registry: Registry::new(),
            bus,
        };

        report_export(
            &manager.bus,
            BusConfig::MANAGER_PATH,
            BusConfig::OBJECT_MANAGER_INTERFACE,
            "GetManagedObjects",
        );
        report_export(
            &manager.bus,
            BusConfig::MANAGER_PATH,
            BusConfig::MANAGER_INTERFACE,
            "Install",
        );

        // Startup population is not announced; nothing has observed these
        // objects as absent yet.
        for record in manager.store.installed_applications() {
            if let Err(e) = publish(&mut manager.registry, &manager.bus, record, false) {
                error!("failed to publish pre-installed application: {}", e);
            }
        }

        manager
    }

    /// Drain calls until every sender is gone.
    pub async fn run(mut self, mut calls: mpsc::UnboundedReceiver<BusCall>) {
        info!("installed-applications manager running");
        while let Some(call) = calls.recv().await {
            self.handle_call(call);
        }
        debug!("call channel closed, manager exiting");
    }

    fn handle_call(&mut self, call: BusCall) {
        debug!(
            "call #{}: {}.{} on {}",
            call.id, call.interface, call.method, call.path
        );

        let message = match self.dispatch(&call) {
            Ok(result) => BusMessage::reply(call.id, result),
            Err(e) => {
                warn!("call #{} failed: {}", call.id, e);
                BusMessage::error(call.id, &e)
            }
        };

        if call.responder.send(message).is_err() {
            debug!("caller of #{} went away before the response was sent", call.id);
        }
    }

    fn dispatch(&mut self, call: &BusCall) -> Result<Value> {
        if call.path == BusConfig::MANAGER_PATH {
            match (call.interface.as_str(), call.method.as_str()) {
                (BusConfig::OBJECT_MANAGER_INTERFACE, "GetManagedObjects") => {
                    self.get_managed_objects()
                }
                (BusConfig::MANAGER_INTERFACE, "Install") => self.install(&call.args),
                _ => Err(unknown_method(call)),
            }
        } else {
            match (call.interface.as_str(), call.method.as_str()) {
                (BusConfig::APPLICATION_INTERFACE, "Uninstall") => self.uninstall(&call.path),
                _ => Err(unknown_method(call)),
            }
        }
    }

    /// Full enumerate-all snapshot: object path -> interface -> properties.
    fn get_managed_objects(&self) -> Result<Value> {
        let mut objects = serde_json::Map::new();
        for (path, interfaces) in self.registry.enumerate() {
            objects.insert(path, serde_json::to_value(interfaces)?);
        }
        Ok(Value::Object(objects))
    }

    /// `Install(path) -> object path`.
    fn install(&mut self, args: &Value) -> Result<Value> {
        let Some(path) = args.get("path").and_then(Value::as_str) else {
            return Err(BerthError::InvalidArgument {
                message: "install requires a string `path` argument".to_string(),
            });
        };
        let path = PathBuf::from(path);
        if !path.is_absolute() {
            return Err(BerthError::InvalidArgument {
                message: format!("path to install must be absolute: {}", path.display()),
            });
        }

        let Self {
            store,
            registry,
            bus,
        } = self;
        let mut observer = LifecycleObserver {
            registry: &mut *registry,
            bus,
            publish_error: None,
        };
        let app_id = store
            .install(&path, &mut observer)
            .map_err(|_| BerthError::InstallFailed { path })?;

        // A failed publish means the registry refused the store's record,
        // e.g. a duplicate id. The reply must not point at an older object
        // that happens to share the identity.
        if let Some(e) = observer.publish_error.take() {
            error!("store installed {} but publishing failed: {}", app_id, e);
            return Err(e);
        }

        // The store's installed notification is delivered synchronously
        // before install returns, so the object must already be published.
        // A miss here means the store broke that contract.
        let Some(object) = registry.find(&app_id) else {
            error!(
                "store reported successful install of {} but no object is published",
                app_id
            );
            return Err(BerthError::InternalConsistency {
                message: format!("no published object for freshly installed {app_id}"),
            });
        };
        Ok(Value::String(object.path().to_string()))
    }

    /// `Uninstall()` invoked on a child object.
    ///
    /// Only the identity key is carried across the store call: the object is
    /// re-resolved by path up front, and the store's uninstalled notification
    /// destroys it before `uninstall` returns. Nothing here dereferences the
    /// object afterwards.
    fn uninstall(&mut self, object_path: &str) -> Result<Value> {
        let Self {
            store,
            registry,
            bus,
        } = self;

        let app_id = match registry.find_by_path(object_path) {
            Some(object) => object.app_id().clone(),
            None => {
                return Err(BerthError::NotFound {
                    app_id: app_id_from_path(object_path),
                })
            }
        };

        let mut observer = LifecycleObserver {
            registry: &mut *registry,
            bus,
            publish_error: None,
        };
        store.uninstall(&app_id, &mut observer)?;

        Ok(Value::Null)
    }
}

/// Best-effort reverse of the object-path derivation, for error reporting
/// when a path resolves to no published object.
fn app_id_from_path(object_path: &str) -> AppId {
    let tail = object_path.rsplit('/').next().unwrap_or(object_path);
    AppId::new(tail)
}

fn unknown_method(call: &BusCall) -> BerthError {
    BerthError::UnknownMethod {
        path: call.path.clone(),
        interface: call.interface.clone(),
        method: call.method.clone(),
    }
}

/// Single mutation path for the published set. Both store notifications and
/// startup population go through here, which is what makes the broadcast
/// ordering guarantees hold.
struct LifecycleObserver<'a> {
    registry: &'a mut Registry,
    bus: &'a BusHandle,
    /// Set when an installed notification could not be turned into a
    /// published object; the install handler turns it into an error reply.
    publish_error: Option<BerthError>,
}

impl StoreObserver for LifecycleObserver<'_> {
    fn on_application_installed(&mut self, record: &ApplicationRecord) {
        if let Err(e) = publish(self.registry, self.bus, record.clone(), true) {
            self.publish_error = Some(e);
        }
    }

    fn on_application_uninstalled(&mut self, app_id: &AppId) {
        let Some(path) = self.registry.find(app_id).map(|o| o.path().to_string()) else {
            warn!("uninstall notification for unknown app id {}", app_id);
            return;
        };

        // Ordering: unregister from the transport, capture metadata, remove
        // from the collection, then emit from the captured metadata.
        self.bus.unregister_object(&path);
        match self.registry.destroy(app_id) {
            Ok(removed) => {
                self.bus.send_signal(
                    BusConfig::MANAGER_PATH,
                    BusConfig::OBJECT_MANAGER_INTERFACE,
                    BusConfig::INTERFACES_REMOVED,
                    json!({
                        "path": removed.path,
                        "interfaces": removed.interface_names,
                    }),
                );
            }
            Err(e) => error!("failed to unpublish {}: {}", app_id, e),
        }
    }
}

/// Publish one record: create the registry object, export its `Uninstall`
/// method, and (unless this is startup population) announce it. Fails when
/// the registry refuses the record (duplicate id or object path).
fn publish(
    registry: &mut Registry,
    bus: &BusHandle,
    record: ApplicationRecord,
    announce: bool,
) -> Result<()> {
    let (path, interfaces) = {
        let object = registry.create(record)?;
        (object.path().to_string(), object.interfaces().clone())
    };

    report_export(bus, &path, BusConfig::APPLICATION_INTERFACE, "Uninstall");

    if announce {
        bus.send_signal(
            BusConfig::MANAGER_PATH,
            BusConfig::OBJECT_MANAGER_INTERFACE,
            BusConfig::INTERFACES_ADDED,
            json!({
                "path": path,
                "interfaces": interfaces,
            }),
        );
    }
    Ok(())
}

/// Export-completion reporting: failure leaves the object published but the
/// method unreachable, which callers see as an unknown-method error.
fn report_export(bus: &BusHandle, path: &str, interface: &str, method: &str) {
    if let Err(e) = bus.export_method(path, interface, method) {
        warn!(path, interface, method, "error exporting method: {}", e);
    }
}
