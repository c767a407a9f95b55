//! Pending-sync records owed to the backend.

use crate::models::run::{Run, RunId};
use serde::{Deserialize, Serialize};

/// A create/update that has not reached the backend yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPendingSyncEntity {
    /// Locally generated run id (also the queue key)
    pub run_id: RunId,
    /// Full run snapshot at the time of the failed write
    pub run: Run,
    /// Raw map snapshot bytes to upload with the run
    pub map_picture: Vec<u8>,
    /// Owning user
    pub user_id: String,
}

/// A delete that has not reached the backend yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedRunSyncEntity {
    pub run_id: RunId,
    pub user_id: String,
}
