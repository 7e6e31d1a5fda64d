use crate::error::{FailureClass, ObligationError};
use crate::narrative::NarrativeRecord;
use crate::submission::{panic_message, ObligationSubmissionService};
use crate::types::{BatchItemFailure, BatchResult, IntentId, ObligationIntent, ObligationResult};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Fans a bounded list of obligations through the submission service.
///
/// Items are independent: one item's failure, or panic, never interrupts the loop or
/// rolls back an item that already cleared.
pub struct BatchOrchestrator {
    service: Arc<ObligationSubmissionService>,
}

impl BatchOrchestrator {
    pub fn new(service: Arc<ObligationSubmissionService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<ObligationSubmissionService> {
        &self.service
    }

    /// Submit a batch with the configured `max_batch_size` as the limit.
    pub async fn submit_batch_default(
        &self,
        items: Vec<ObligationIntent>,
    ) -> Result<BatchResult, ObligationError> {
        let limit = self.service.config().max_batch_size;
        self.submit_batch(items, limit).await
    }

    /// Submit every item in order. Rejected whole, before any item runs, when empty or
    /// larger than `limit`.
    pub async fn submit_batch(
        &self,
        items: Vec<ObligationIntent>,
        limit: usize,
    ) -> Result<BatchResult, ObligationError> {
        if items.is_empty() {
            return Err(ObligationError::EmptyBatch);
        }
        if items.len() > limit {
            return Err(ObligationError::BatchTooLarge {
                size: items.len(),
                limit,
            });
        }

        let batch_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut results = Vec::with_capacity(items.len());
        let mut failures = Vec::new();
        let mut success_count = 0;
        let mut total_amount_minor = 0u64;
        let mut total_fees_minor = 0u64;

        for (index, mut intent) in items.into_iter().enumerate() {
            // Assigned up front so a panicking item still reports its key.
            let intent_id = intent.intent_id.clone().unwrap_or_else(IntentId::generate);
            intent.intent_id = Some(intent_id.clone());
            let amount_minor = intent.amount_minor;

            let result = match AssertUnwindSafe(self.service.submit(intent))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(
                        batch_id = %batch_id,
                        index,
                        intent_id = %intent_id,
                        panic = %message,
                        "batch item panicked"
                    );
                    ObligationResult::failed(
                        intent_id,
                        None,
                        FailureClass::BatchItem,
                        format!("batch item panicked: {message}"),
                    )
                }
            };

            if result.success {
                success_count += 1;
                total_amount_minor = total_amount_minor.saturating_add(amount_minor);
                total_fees_minor = total_fees_minor.saturating_add(result.total_fee_minor());
            } else {
                failures.push(BatchItemFailure {
                    index,
                    result: result.clone(),
                });
            }
            results.push(result);
        }

        let batch = BatchResult {
            batch_id,
            items: results,
            success_count,
            failures,
            total_amount_minor,
            total_fees_minor,
            elapsed: started.elapsed(),
        };

        info!(
            batch_id = %batch.batch_id,
            items = batch.items.len(),
            success_count = batch.success_count,
            failure_count = batch.failures.len(),
            total_amount_minor = batch.total_amount_minor,
            elapsed_ms = u64::try_from(batch.elapsed.as_millis()).unwrap_or(u64::MAX),
            "batch processed"
        );

        self.service
            .mirror()
            .dispatch(NarrativeRecord::batch_summary(&batch));
        Ok(batch)
    }
}
