use crate::collaborators::HonoringAdapter;
use crate::error::CollaboratorError;
use crate::types::{ClearedTransfer, HonoringRecord, TransferId, TRANSFER_ID_METADATA_KEY};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledTransfer {
    pub transfer_id: TransferId,
    pub receipt_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountMismatch {
    pub transfer_id: TransferId,
    pub receipt_id: String,
    pub cleared_amount_minor: u64,
    pub cleared_currency: String,
    pub honored_amount_minor: u64,
    pub honored_currency: String,
}

/// Honoring record naming a transfer id the authority never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownTransfer {
    pub receipt_id: String,
    pub transfer_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub matched: Vec<ReconciledTransfer>,
    pub amount_mismatches: Vec<AmountMismatch>,
    pub unknown_transfers: Vec<UnknownTransfer>,
    /// Cleared transfers with no honoring record. Expected when honoring degraded.
    pub unhonored_transfers: Vec<TransferId>,
    /// Records without correlating metadata.
    pub skipped: usize,
}

impl ReconciliationReport {
    /// No record contradicts the clearing authority.
    pub fn is_consistent(&self) -> bool {
        self.amount_mismatches.is_empty() && self.unknown_transfers.is_empty()
    }
}

/// Read-only join of honoring records against cleared transfers.
pub struct Reconciler;

impl Reconciler {
    pub fn reconcile(records: &[HonoringRecord], cleared: &[ClearedTransfer]) -> ReconciliationReport {
        let by_transfer: BTreeMap<&str, &ClearedTransfer> = cleared
            .iter()
            .map(|transfer| (transfer.transfer_id.as_str(), transfer))
            .collect();
        let mut honored = BTreeSet::new();
        let mut report = ReconciliationReport::default();

        for record in records {
            let Some(transfer_ref) = record
                .metadata
                .get(TRANSFER_ID_METADATA_KEY)
                .filter(|value| !value.trim().is_empty())
            else {
                debug!(receipt_id = %record.receipt_id, "honoring record without transfer id skipped");
                report.skipped += 1;
                continue;
            };

            let Some(transfer) = by_transfer.get(transfer_ref.as_str()) else {
                report.unknown_transfers.push(UnknownTransfer {
                    receipt_id: record.receipt_id.clone(),
                    transfer_id: transfer_ref.clone(),
                });
                continue;
            };

            honored.insert(transfer.transfer_id.as_str());
            if transfer.amount_minor == record.amount_minor && transfer.currency == record.currency {
                report.matched.push(ReconciledTransfer {
                    transfer_id: transfer.transfer_id.clone(),
                    receipt_id: record.receipt_id.clone(),
                });
            } else {
                report.amount_mismatches.push(AmountMismatch {
                    transfer_id: transfer.transfer_id.clone(),
                    receipt_id: record.receipt_id.clone(),
                    cleared_amount_minor: transfer.amount_minor,
                    cleared_currency: transfer.currency.clone(),
                    honored_amount_minor: record.amount_minor,
                    honored_currency: record.currency.clone(),
                });
            }
        }

        report.unhonored_transfers = cleared
            .iter()
            .filter(|transfer| !honored.contains(transfer.transfer_id.as_str()))
            .map(|transfer| transfer.transfer_id.clone())
            .collect();

        report
    }

    /// Pull records from the adapter and reconcile them.
    pub async fn reconcile_adapter(
        adapter: &dyn HonoringAdapter,
        cleared: &[ClearedTransfer],
    ) -> Result<ReconciliationReport, CollaboratorError> {
        let records = adapter.list_records().await?;
        let report = Self::reconcile(&records, cleared);
        debug!(
            adapter = adapter.adapter_id(),
            records = records.len(),
            matched = report.matched.len(),
            skipped = report.skipped,
            "reconciliation complete"
        );
        Ok(report)
    }
}
