use serde::{Deserialize, Serialize};

use crate::{ContainerDetails, ContainerState};

/// Live handle returned once a container has been started.
///
/// `details` is `None` when the post-start inspection failed; the
/// container is still considered started in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    pub name: String,
    /// `true` when an existing container was adopted instead of created.
    pub recovered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ContainerDetails>,
}

impl Instance {
    pub fn state(&self) -> Option<ContainerState> {
        self.details.as_ref().and_then(|d| d.state)
    }

    pub fn is_running(&self) -> bool {
        self.details.as_ref().is_some_and(|d| d.running)
    }
}
