use serde::{Deserialize, Serialize};
use std::fmt;

/// 父资源引用（资源名 + 标识），如 `loans/10`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource: String,
    pub id: i64,
}

impl ResourceRef {
    pub fn new(resource: impl Into<String>, id: i64) -> Self {
        Self {
            resource: resource.into(),
            id,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource, self.id)
    }
}
