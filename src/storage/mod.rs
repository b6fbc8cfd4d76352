//! Snapshot storage collaborators.
//!
//! Snapshots live in a content-addressed blob store. The write side goes
//! through `flush::Uploader`; the read side through [`SnapshotStore`].
//!
//! Submodules:
//! - `pinata`: Pinata pinning API and IPFS gateway client.

pub mod pinata;

use log::debug;

use crate::logging::{log_failure, Component};
use crate::model::{Snapshot, StoreError};

/// Read access to previously stored snapshots.
pub trait SnapshotStore {
    /// Content ids of every stored snapshot.
    fn list(&self) -> Result<Vec<String>, StoreError>;
    fn fetch(&self, cid: &str) -> Result<Snapshot, StoreError>;
}

/// Fetches every listed snapshot. A listing failure is an error; a snapshot
/// that cannot be fetched or parsed is logged and skipped.
pub fn load_snapshots(store: &dyn SnapshotStore) -> Result<Vec<Snapshot>, StoreError> {
    let cids = store.list()?;
    debug!(target: "storage", "{} stored snapshots listed", cids.len());

    let mut snapshots = Vec::with_capacity(cids.len());
    for cid in &cids {
        match store.fetch(cid) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => log_failure(Component::Storage, Some(cid.as_str()), "Snapshot fetch", &e),
        }
    }
    Ok(snapshots)
}
