use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use woosync_catalog::{BucketCounts, PreviewReasons, SyncAction, SyncResult};
use woosync_core::{ItemCode, RunId, Sku, WcProductId};
use woosync_infra::{EmptyTrashReport, PreviewReport};

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct PreviewActions {
    pub create: Vec<ItemCode>,
    pub update: Vec<ItemCode>,
    pub delete: Vec<Sku>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub actions: PreviewActions,
    pub counts: BucketCounts,
    pub reasons: PreviewReasons,
    pub collisions: BTreeMap<Sku, Vec<WcProductId>>,
}

impl From<PreviewReport> for PreviewResponse {
    fn from(report: PreviewReport) -> Self {
        let counts = report.preview.counts();
        let preview = report.preview;
        Self {
            run_id: report.run_id,
            generated_at: report.generated_at,
            actions: PreviewActions {
                create: preview.create,
                update: preview.update,
                delete: preview.delete,
            },
            counts,
            reasons: preview.reasons,
            collisions: preview.collisions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SyncCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub manual_delete: usize,
}

/// Bulk action outcome. Succeeded keys are also listed under the action's
/// past tense (`created`, `updated`, `deleted`).
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub action: SyncAction,
    #[serde(flatten)]
    pub done: BTreeMap<&'static str, Vec<String>>,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub errors: BTreeMap<String, String>,
    pub manual_delete: Vec<Sku>,
    pub cancelled: bool,
    pub counts: SyncCounts,
}

impl From<SyncResult> for SyncResponse {
    fn from(result: SyncResult) -> Self {
        let counts = SyncCounts {
            succeeded: result.succeeded.len(),
            failed: result.failed.len(),
            manual_delete: result.manual_delete.len(),
        };
        Self {
            action: result.action,
            done: BTreeMap::from([(result.action.past_tense(), result.succeeded.clone())]),
            succeeded: result.succeeded,
            failed: result.failed,
            errors: result.errors,
            manual_delete: result.manual_delete,
            cancelled: result.cancelled,
            counts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct EmptyTrashResponse {
    #[serde(flatten)]
    pub report: EmptyTrashReport,
    pub removed_count: usize,
    pub failed_count: usize,
}

impl From<EmptyTrashReport> for EmptyTrashResponse {
    fn from(report: EmptyTrashReport) -> Self {
        Self {
            removed_count: report.removed.len(),
            failed_count: report.failed.len(),
            report,
        }
    }
}
