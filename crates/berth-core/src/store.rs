//! Application store contract and an in-memory implementation.
//!
//! The store is the authoritative subsystem that actually installs and
//! uninstalls applications. The broker consumes it through the
//! [`ApplicationStore`] trait and reacts to lifecycle changes through
//! [`StoreObserver`] callbacks, which the store delivers synchronously from
//! inside `install`/`uninstall` — by the time those calls return, the
//! observer has already seen the corresponding event. The broker relies on
//! that ordering: the post-install registry lookup must succeed.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BerthError, Result};
use crate::record::{AppId, ApplicationRecord};

/// Observer for store lifecycle events.
///
/// Callbacks fire synchronously within the store's own `install`/`uninstall`
/// call, nesting registry mutation inside the store mutation.
pub trait StoreObserver {
    /// A new application finished installing.
    fn on_application_installed(&mut self, record: &ApplicationRecord);

    /// An application was uninstalled. Only the identity is still valid.
    fn on_application_uninstalled(&mut self, app_id: &AppId);
}

/// The application store as the broker sees it.
pub trait ApplicationStore {
    /// Currently installed applications, in install order.
    fn installed_applications(&self) -> Vec<ApplicationRecord>;

    /// Install the package at `path`, notifying `observer` before returning.
    fn install(&mut self, path: &Path, observer: &mut dyn StoreObserver) -> Result<AppId>;

    /// Uninstall `app_id`, notifying `observer` before returning. The store
    /// is not mutated on failure.
    fn uninstall(&mut self, app_id: &AppId, observer: &mut dyn StoreObserver) -> Result<()>;
}

/// In-memory store used by the binary and the tests.
///
/// Not a package installer: it accepts paths that look like packages,
/// assigns slot ids (`app1`, `app2`, …), and keeps records in install order.
/// Slot numbers are never reused, so identities stay unique for the process
/// lifetime.
#[derive(Debug, Default)]
pub struct MemoryStore {
    apps: Vec<ApplicationRecord>,
    next_slot: u64,
}

impl MemoryStore {
    const PACKAGE_EXTENSIONS: [&'static str; 2] = ["wgt", "xpk"];

    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the store with already-installed applications, e.g. to model
    /// state left over from an earlier run.
    ///
    /// The slot counter starts past the highest seeded slot id, so ids
    /// assigned by later installs never collide with a seeded identity.
    pub fn with_installed(records: Vec<ApplicationRecord>) -> Self {
        let next_slot = records
            .iter()
            .filter_map(|r| r.app_id.as_str().strip_prefix("app")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Self {
            apps: records,
            next_slot,
        }
    }

    fn is_package_path(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| Self::PACKAGE_EXTENSIONS.contains(&e))
            .unwrap_or(false)
    }
}

impl ApplicationStore for MemoryStore {
    fn installed_applications(&self) -> Vec<ApplicationRecord> {
        self.apps.clone()
    }

    fn install(&mut self, path: &Path, observer: &mut dyn StoreObserver) -> Result<AppId> {
        if !Self::is_package_path(path) {
            debug!("rejecting install, not a package path: {}", path.display());
            return Err(BerthError::InstallFailed {
                path: path.to_path_buf(),
            });
        }
        if self.apps.iter().any(|r| r.path == path) {
            debug!("rejecting install, already installed: {}", path.display());
            return Err(BerthError::InstallFailed {
                path: path.to_path_buf(),
            });
        }

        self.next_slot += 1;
        let record = ApplicationRecord {
            app_id: AppId::new(format!("app{}", self.next_slot)),
            path: PathBuf::from(path),
        };
        let app_id = record.app_id.clone();
        self.apps.push(record);

        // Synchronous delivery: the record is in the installed set before
        // the observer runs, and the observer runs before install returns.
        observer.on_application_installed(&self.apps[self.apps.len() - 1]);

        Ok(app_id)
    }

    fn uninstall(&mut self, app_id: &AppId, observer: &mut dyn StoreObserver) -> Result<()> {
        let index = self
            .apps
            .iter()
            .position(|r| &r.app_id == app_id)
            .ok_or_else(|| BerthError::UninstallFailed {
                app_id: app_id.clone(),
            })?;

        self.apps.remove(index);
        observer.on_application_uninstalled(app_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records each callback along with the installed-set size the store
    /// reported at delivery time.
    #[derive(Default)]
    struct RecordingObserver {
        installed: Vec<AppId>,
        uninstalled: Vec<AppId>,
    }

    impl StoreObserver for RecordingObserver {
        fn on_application_installed(&mut self, record: &ApplicationRecord) {
            self.installed.push(record.app_id.clone());
        }

        fn on_application_uninstalled(&mut self, app_id: &AppId) {
            self.uninstalled.push(app_id.clone());
        }
    }

    #[test]
    fn test_install_assigns_slot_ids_and_notifies() {
        let mut store = MemoryStore::new();
        let mut observer = RecordingObserver::default();

        let first = store
            .install(Path::new("/tmp/a.wgt"), &mut observer)
            .unwrap();
        let second = store
            .install(Path::new("/tmp/b.xpk"), &mut observer)
            .unwrap();

        assert_eq!(first.as_str(), "app1");
        assert_eq!(second.as_str(), "app2");
        assert_eq!(observer.installed, vec![first.clone(), second.clone()]);
        assert_eq!(
            store
                .installed_applications()
                .iter()
                .map(|r| r.app_id.clone())
                .collect::<Vec<_>>(),
            vec![first, second]
        );
    }

    #[test]
    fn test_install_rejects_non_package_paths() {
        let mut store = MemoryStore::new();
        let mut observer = RecordingObserver::default();

        let err = store
            .install(Path::new("/tmp/readme.txt"), &mut observer)
            .unwrap_err();

        assert!(matches!(err, BerthError::InstallFailed { .. }));
        assert!(observer.installed.is_empty());
        assert!(store.installed_applications().is_empty());
    }

    #[test]
    fn test_install_rejects_duplicate_path() {
        let mut store = MemoryStore::new();
        let mut observer = RecordingObserver::default();

        store
            .install(Path::new("/tmp/a.wgt"), &mut observer)
            .unwrap();
        let err = store
            .install(Path::new("/tmp/a.wgt"), &mut observer)
            .unwrap_err();

        assert!(matches!(err, BerthError::InstallFailed { .. }));
        assert_eq!(store.installed_applications().len(), 1);
    }

    #[test]
    fn test_uninstall_removes_and_notifies() {
        let mut store = MemoryStore::new();
        let mut observer = RecordingObserver::default();

        let app_id = store
            .install(Path::new("/tmp/a.wgt"), &mut observer)
            .unwrap();
        store.uninstall(&app_id, &mut observer).unwrap();

        assert!(store.installed_applications().is_empty());
        assert_eq!(observer.uninstalled, vec![app_id]);
    }

    #[test]
    fn test_uninstall_unknown_id_fails_without_mutation() {
        let mut store = MemoryStore::new();
        let mut observer = RecordingObserver::default();

        store
            .install(Path::new("/tmp/a.wgt"), &mut observer)
            .unwrap();
        let err = store
            .uninstall(&AppId::new("ghost"), &mut observer)
            .unwrap_err();

        assert!(matches!(err, BerthError::UninstallFailed { .. }));
        assert_eq!(store.installed_applications().len(), 1);
        assert!(observer.uninstalled.is_empty());
    }

    #[test]
    fn test_slot_ids_are_never_reused() {
        let mut store = MemoryStore::new();
        let mut observer = RecordingObserver::default();

        let first = store
            .install(Path::new("/tmp/a.wgt"), &mut observer)
            .unwrap();
        store.uninstall(&first, &mut observer).unwrap();
        let second = store
            .install(Path::new("/tmp/b.wgt"), &mut observer)
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(second.as_str(), "app2");
    }

    #[test]
    fn test_with_installed_advances_slot_counter_past_seeded_ids() {
        let mut store =
            MemoryStore::with_installed(vec![ApplicationRecord::new("app2", "/opt/seeded.wgt")]);
        let mut observer = RecordingObserver::default();

        let id = store
            .install(Path::new("/tmp/new.wgt"), &mut observer)
            .unwrap();

        assert_eq!(id.as_str(), "app3");
        assert_eq!(store.installed_applications().len(), 2);
    }

    #[test]
    fn test_with_installed_preserves_order() {
        let store = MemoryStore::with_installed(vec![
            ApplicationRecord::new("app1", "/opt/a.wgt"),
            ApplicationRecord::new("app2", "/opt/b.wgt"),
        ]);

        let ids: Vec<_> = store
            .installed_applications()
            .iter()
            .map(|r| r.app_id.to_string())
            .collect();
        assert_eq!(ids, vec!["app1", "app2"]);
    }
}
