//! Berth Bus - transport and broker for the installed-application registry.
//!
//! Exposes the `berth-core` registry over a local object bus: a root manager
//! object at `/installed` with `Install` and `GetManagedObjects`, one child
//! object per installed application with an `Uninstall` method, and
//! `InterfacesAdded`/`InterfacesRemoved` lifecycle signals.
//!
//! Wire format: 4-byte big-endian length prefix followed by a UTF-8 JSON
//! [`protocol::BusMessage`]. Calls address `(path, interface, method)`.

pub mod client;
pub mod handle;
pub mod manager;
pub mod protocol;
pub mod server;

pub use client::{BusClient, SignalEvent};
pub use handle::BusHandle;
pub use manager::{BusCall, InstalledManager};
pub use protocol::BusMessage;
pub use server::{start_broker, BrokerHandle, BusServer, BusServerHandle};
