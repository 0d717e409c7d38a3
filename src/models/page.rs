use serde::{Deserialize, Serialize};

/// One page of a list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    // Older service builds name the list after the resource
    #[serde(default = "Vec::new", alias = "tasks", alias = "templates")]
    pub items: Vec<T>,

    #[serde(default)]
    pub total: u64,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}
