//! Centralized configuration constants for the berth broker.
//!
//! Object paths, interface names, and error-domain names live here so the
//! manager, the transport, and the tests all agree on the bus surface.

use std::time::Duration;

/// Bus surface and transport limits.
pub struct BusConfig;

impl BusConfig {
    /// Object path of the root manager object.
    pub const MANAGER_PATH: &'static str = "/installed";

    /// Interface exposing the enumerate-all snapshot on the root object.
    pub const OBJECT_MANAGER_INTERFACE: &'static str = "berth.bus.ObjectManager1";
    /// Interface exposing `Install` on the root object.
    pub const MANAGER_INTERFACE: &'static str = "berth.Installed.Manager1";
    /// Interface exported by every installed-application object.
    pub const APPLICATION_INTERFACE: &'static str = "berth.Installed.Application1";

    /// Error domain for failures of root-object methods.
    pub const MANAGER_ERROR: &'static str = "berth.Installed.Manager.Error";
    /// Error domain for failures of per-application methods.
    pub const APPLICATION_ERROR: &'static str = "berth.Installed.Application.Error";
    /// Transport-level error domains.
    pub const BUS_ERROR_UNKNOWN_OBJECT: &'static str = "berth.bus.Error.UnknownObject";
    pub const BUS_ERROR_UNKNOWN_METHOD: &'static str = "berth.bus.Error.UnknownMethod";
    pub const BUS_ERROR_FAILED: &'static str = "berth.bus.Error.Failed";

    /// Lifecycle signal members broadcast from the root manager path.
    pub const INTERFACES_ADDED: &'static str = "InterfacesAdded";
    pub const INTERFACES_REMOVED: &'static str = "InterfacesRemoved";

    /// Property names on `APPLICATION_INTERFACE`.
    pub const PROP_APP_ID: &'static str = "AppId";
    pub const PROP_INSTALLED_PATH: &'static str = "InstalledPath";

    /// Maximum accepted frame payload size.
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
    /// Maximum simultaneous bus connections.
    pub const MAX_CONNECTIONS: usize = 32;
    /// Buffered lifecycle signals per subscriber before lagging.
    pub const SIGNAL_BUFFER: usize = 64;
    /// Client-side connect timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
}
