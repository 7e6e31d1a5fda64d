use async_trait::async_trait;
use chrono::Utc;
use clearing_core::collaborators::HonoringAdapter;
use clearing_core::error::CollaboratorError;
use clearing_core::types::{
    HonoringReceipt, HonoringRecord, HonoringRequest, TRANSFER_ID_METADATA_KEY,
};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Mock ACH rail for deterministic local honoring.
///
/// Keeps one record per transfer id; a repeated attempt for the same transfer returns
/// the receipt it already issued.
#[derive(Debug, Default)]
pub struct MockAchHonoringAdapter {
    ineligible_recipients: BTreeSet<String>,
    records: Mutex<Vec<HonoringRecord>>,
}

impl MockAchHonoringAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ineligible_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.ineligible_recipients.insert(recipient.into());
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<HonoringRecord>>, CollaboratorError> {
        self.records
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("ach record lock poisoned".into()))
    }
}

#[async_trait]
impl HonoringAdapter for MockAchHonoringAdapter {
    fn adapter_id(&self) -> &'static str {
        "ach"
    }

    async fn check_eligibility(&self, request: &HonoringRequest) -> Result<(), CollaboratorError> {
        if self.ineligible_recipients.contains(&request.recipient) {
            return Err(CollaboratorError::Ineligible(format!(
                "recipient '{}' is not eligible for ACH",
                request.recipient
            )));
        }
        Ok(())
    }

    async fn attempt(&self, request: &HonoringRequest) -> Result<HonoringReceipt, CollaboratorError> {
        let mut records = self.lock()?;

        let transfer_id = request.transfer_id.as_str();
        if let Some(existing) = records.iter().find(|record| {
            record
                .metadata
                .get(TRANSFER_ID_METADATA_KEY)
                .map(String::as_str)
                == Some(transfer_id)
        }) {
            debug!(transfer_id, receipt_id = %existing.receipt_id, "transfer already honored");
            return Ok(receipt(self.adapter_id(), existing));
        }

        let short_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let record = HonoringRecord {
            receipt_id: format!("ach-{short_id}"),
            recipient: request.recipient.clone(),
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
            metadata: request.metadata.clone(),
        };
        let issued = receipt(self.adapter_id(), &record);
        records.push(record);
        Ok(issued)
    }

    async fn list_records(&self) -> Result<Vec<HonoringRecord>, CollaboratorError> {
        Ok(self.lock()?.clone())
    }
}

fn receipt(adapter: &str, record: &HonoringRecord) -> HonoringReceipt {
    HonoringReceipt {
        receipt_id: record.receipt_id.clone(),
        adapter: adapter.to_string(),
        honored_at: Utc::now(),
        metadata: record.metadata.clone(),
    }
}

/// Deterministic failing adapter useful for chaos testing.
#[derive(Debug, Clone)]
pub struct AlwaysFailHonoringAdapter {
    adapter_name: &'static str,
    reason: String,
}

impl AlwaysFailHonoringAdapter {
    pub fn new(adapter_name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            adapter_name,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl HonoringAdapter for AlwaysFailHonoringAdapter {
    fn adapter_id(&self) -> &'static str {
        self.adapter_name
    }

    async fn attempt(&self, _request: &HonoringRequest) -> Result<HonoringReceipt, CollaboratorError> {
        Err(CollaboratorError::Rejected(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clearing_core::types::{IntentId, TransferId};
    use std::collections::BTreeMap;

    fn request(transfer: &str, recipient: &str) -> HonoringRequest {
        let mut metadata = BTreeMap::new();
        metadata.insert(TRANSFER_ID_METADATA_KEY.to_string(), transfer.to_string());
        HonoringRequest {
            intent_id: IntentId::new("intent-1").unwrap(),
            transfer_id: TransferId::new(transfer).unwrap(),
            recipient: recipient.into(),
            amount_minor: 500_000,
            currency: "USD".into(),
            metadata,
        }
    }

    #[tokio::test]
    async fn ach_records_one_entry_per_transfer() {
        let adapter = MockAchHonoringAdapter::new();
        let first = adapter.attempt(&request("T1", "emp-042")).await.unwrap();
        let again = adapter.attempt(&request("T1", "emp-042")).await.unwrap();

        assert_eq!(first.receipt_id, again.receipt_id);
        assert!(first.receipt_id.starts_with("ach-"));
        let records = adapter.list_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata.get(TRANSFER_ID_METADATA_KEY).unwrap(), "T1");
    }

    #[tokio::test]
    async fn ach_refuses_ineligible_recipient() {
        let adapter = MockAchHonoringAdapter::new().with_ineligible_recipient("emp-007");
        let err = adapter
            .check_eligibility(&request("T2", "emp-007"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Ineligible(_)));
        assert!(adapter.check_eligibility(&request("T3", "emp-042")).await.is_ok());
    }

    #[tokio::test]
    async fn always_fail_reports_reason() {
        let adapter = AlwaysFailHonoringAdapter::new("wire", "recipient not eligible");
        let err = adapter.attempt(&request("T4", "emp-042")).await.unwrap_err();
        assert_eq!(err.to_string(), "recipient not eligible");
        assert_eq!(adapter.adapter_id(), "wire");
        assert!(adapter.list_records().await.unwrap().is_empty());
    }
}
