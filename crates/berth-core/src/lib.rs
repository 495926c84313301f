//! Berth Core - headless model for the installed-application broker.
//!
//! This crate holds everything below the bus transport: application records
//! and their bus-facing property projections, the registry of published
//! remote objects, and the application-store contract with its synchronous
//! observer notifications. The `berth-bus` crate puts these on the wire.
//!
//! # Example
//!
//! ```rust
//! use berth_core::{ApplicationRecord, Registry};
//!
//! let mut registry = Registry::new();
//! let record = ApplicationRecord::new("app1", "/opt/packages/demo.wgt");
//! let object = registry.create(record).unwrap();
//! assert_eq!(object.path(), "/installed/app1");
//! ```

pub mod config;
pub mod error;
pub mod record;
pub mod registry;
pub mod store;

pub use config::BusConfig;
pub use error::{BerthError, Result};
pub use record::{AppId, ApplicationRecord, InterfaceMap, PropertyMap, PropertyValue};
pub use registry::{Registry, RemoteObject, RemovedObject};
pub use store::{ApplicationStore, MemoryStore, StoreObserver};
