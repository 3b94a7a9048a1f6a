//! Bulk action results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use woosync_core::{DomainError, Sku};

/// One bucket of a sync plan.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Past-tense key used in API responses (`created`, `updated`, `deleted`).
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update => "updated",
            Self::Delete => "deleted",
        }
    }
}

impl core::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for SyncAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(DomainError::validation(format!(
                "unknown sync action {other:?} (expected create, update or delete)"
            ))),
        }
    }
}

/// Outcome of one item in a bulk action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    Failed(String),
    /// Create blocked by a ghost product; the operator must purge it first.
    ManualDelete(Sku),
}

/// Result of one bulk action. Keys are item codes (create/update) or SKUs (delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub action: SyncAction,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub errors: BTreeMap<String, String>,
    pub manual_delete: Vec<Sku>,
    /// The action was cancelled; items never started are in no list.
    #[serde(default)]
    pub cancelled: bool,
}

impl SyncResult {
    pub fn new(action: SyncAction) -> Self {
        Self {
            action,
            succeeded: Vec::new(),
            failed: Vec::new(),
            errors: BTreeMap::new(),
            manual_delete: Vec::new(),
            cancelled: false,
        }
    }

    pub fn record(&mut self, key: impl Into<String>, outcome: ItemOutcome) {
        let key = key.into();
        match outcome {
            ItemOutcome::Succeeded => self.succeeded.push(key),
            ItemOutcome::Failed(message) => {
                self.failed.push(key.clone());
                self.errors.insert(key, message);
            }
            ItemOutcome::ManualDelete(sku) => {
                if !self.manual_delete.contains(&sku) {
                    self.manual_delete.push(sku);
                }
            }
        }
    }

    /// Number of items attempted (manual-delete items count as attempted).
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.manual_delete.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parsing() {
        assert_eq!("create".parse::<SyncAction>().unwrap(), SyncAction::Create);
        assert_eq!(SyncAction::Delete.past_tense(), "deleted");
        assert!(matches!(
            "Create".parse::<SyncAction>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn outcomes_are_bucketed() {
        let mut result = SyncResult::new(SyncAction::Create);
        let ghost = Sku::new("SKU2").unwrap();
        result.record("SKU1", ItemOutcome::Succeeded);
        result.record("SKU2", ItemOutcome::ManualDelete(ghost.clone()));
        result.record("SKU3", ItemOutcome::Failed("HTTP 500".into()));

        assert_eq!(result.succeeded, vec!["SKU1".to_string()]);
        assert_eq!(result.failed, vec!["SKU3".to_string()]);
        assert_eq!(result.errors["SKU3"], "HTTP 500");
        assert_eq!(result.manual_delete, vec![ghost]);
        assert_eq!(result.attempted(), 3);
    }
}
