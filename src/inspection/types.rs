//! Inspection types
//!
//! A named preset for a class of clusters. Selecting one scopes the task
//! universe and seeds the default feature set.

use serde::Serialize;

use crate::error::{KhronicleError, Result};

/// Registered inspection type.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionType {
    /// Stable id; used in URLs, so `/` is forbidden.
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    /// Presentation order; larger sorts first.
    pub priority: i32,
}

impl InspectionType {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            icon: String::new(),
            priority: 0,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() || self.id.contains('/') {
            return Err(KhronicleError::InvalidInspectionTypeId {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_in_id_is_rejected() {
        assert!(InspectionType::new("gke/autopilot", "GKE").validate().is_err());
        assert!(InspectionType::new("", "GKE").validate().is_err());
        assert!(InspectionType::new("gke", "GKE").validate().is_ok());
    }
}
