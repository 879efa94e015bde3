use serde::{Deserialize, Serialize};

use crate::{ImageRef, Mount};

/// Short-lived run that executes to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaSpec {
    pub name: String,
    pub image: ImageRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
}

impl LambdaSpec {
    /// New lambda with a generated `lambda-<uuid>` name.
    pub fn new(image: ImageRef) -> Self {
        Self::named(format!("lambda-{}", uuid::Uuid::new_v4()), image)
    }

    pub fn named(name: impl Into<String>, image: ImageRef) -> Self {
        Self {
            name: name.into(),
            image,
            mounts: Vec::new(),
        }
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }
}
