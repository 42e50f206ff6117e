use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VmListQuery {
    pub node_id: Option<Uuid>,
}

/// Lifecycle actions exposed on `/infrastructure/vms/{id}/{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmAction {
    Start,
    Stop,
    Restart,
}

impl VmAction {
    pub fn verb(&self) -> &'static str {
        match self {
            VmAction::Start => "start",
            VmAction::Stop => "stop",
            VmAction::Restart => "restart",
        }
    }

    pub fn progress_label(&self) -> &'static str {
        match self {
            VmAction::Start => "starting",
            VmAction::Stop => "stopping",
            VmAction::Restart => "restarting",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmActionResponse {
    pub status: String,
    pub task: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAccepted {
    pub status: String,
}
