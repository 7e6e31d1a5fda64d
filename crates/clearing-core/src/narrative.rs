use crate::types::{
    BatchResult, ClearingStatus, CorrectionType, FeeBreakdown, HonoringOutcome, IntentId,
    ObligationIntent, ObligationPurpose, ObligationResult, TransferId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Denormalized copy of one outcome for reporting.
///
/// A record may be missing, late, or duplicated without any effect on financial state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeRecord {
    pub record_id: String,
    pub recorded_at: DateTime<Utc>,
    /// blake3 over the serialized body.
    pub digest: String,
    pub body: NarrativeBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NarrativeBody {
    Obligation(ObligationNarrative),
    BatchSummary(BatchNarrative),
    Correction(CorrectionNarrative),
}

impl NarrativeBody {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Obligation(_) => "obligation",
            Self::BatchSummary(_) => "batch_summary",
            Self::Correction(_) => "correction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationNarrative {
    pub intent_id: IntentId,
    pub purpose: ObligationPurpose,
    pub amount_minor: u64,
    pub currency: String,
    pub debit_account: String,
    pub credit_account: String,
    pub description: String,
    pub clearing_status: ClearingStatus,
    pub transfer_id: Option<TransferId>,
    pub honoring_outcome: Option<HonoringOutcome>,
    pub fee_breakdown: Option<FeeBreakdown>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchNarrative {
    pub batch_id: String,
    pub item_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_amount_minor: u64,
    pub total_fees_minor: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionNarrative {
    pub correction_id: IntentId,
    pub original_ref: String,
    pub correction_type: CorrectionType,
    pub amount_minor: u64,
    pub reason: String,
    pub clearing_status: ClearingStatus,
    pub transfer_id: Option<TransferId>,
    pub error: Option<String>,
}

impl NarrativeRecord {
    pub fn new(body: NarrativeBody) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            digest: body_digest(&body),
            body,
        }
    }

    pub fn obligation(intent: &ObligationIntent, result: &ObligationResult) -> Self {
        Self::new(NarrativeBody::Obligation(ObligationNarrative {
            intent_id: result.intent_id.clone(),
            purpose: intent.purpose,
            amount_minor: intent.amount_minor,
            currency: intent.currency.clone(),
            debit_account: intent.debit_account.clone(),
            credit_account: intent.credit_account.clone(),
            description: intent.description.clone(),
            clearing_status: result.clearing_status,
            transfer_id: result.transfer_id.clone(),
            honoring_outcome: result.honoring_outcome.clone(),
            fee_breakdown: result.fee_breakdown.clone(),
            error: result.error.clone(),
        }))
    }

    pub fn batch_summary(result: &BatchResult) -> Self {
        Self::new(NarrativeBody::BatchSummary(BatchNarrative {
            batch_id: result.batch_id.clone(),
            item_count: result.items.len(),
            success_count: result.success_count,
            failure_count: result.failures.len(),
            total_amount_minor: result.total_amount_minor,
            total_fees_minor: result.total_fees_minor,
            elapsed_ms: u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
        }))
    }

    pub fn correction(narrative: CorrectionNarrative) -> Self {
        Self::new(NarrativeBody::Correction(narrative))
    }

    pub fn verify_digest(&self) -> bool {
        self.digest == body_digest(&self.body)
    }
}

fn body_digest(body: &NarrativeBody) -> String {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
