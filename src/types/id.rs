// ABOUTME: Identifier newtype for container engine IDs.
// ABOUTME: Prevents container IDs from being swapped with other strings.

use std::fmt;

/// An opaque container identifier assigned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[must_use = "IDs reference resources and should not be ignored"]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
