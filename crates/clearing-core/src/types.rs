use crate::error::{FailureClass, ObligationError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_CURRENCY: &str = "USD";

/// Honoring metadata key carrying the clearing transfer id.
pub const TRANSFER_ID_METADATA_KEY: &str = "transfer_id";
/// Honoring metadata key carrying the obligation intent id.
pub const INTENT_ID_METADATA_KEY: &str = "intent_id";

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// Idempotency key for one logically distinct obligation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IntentId(String);

impl IntentId {
    /// Mint a key for a brand-new obligation. Retries must reuse the original key instead.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(value: impl Into<String>) -> Result<Self, ObligationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ObligationError::validation("intent id must not be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IntentId {
    type Error = ObligationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IntentId> for String {
    fn from(value: IntentId) -> Self {
        value.0
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permanent identifier issued by the clearing authority. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransferId(String);

impl TransferId {
    pub fn new(value: impl Into<String>) -> Result<Self, ObligationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ObligationError::validation("transfer id must not be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TransferId {
    type Error = ObligationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TransferId> for String {
    fn from(value: TransferId) -> Self {
        value.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationPurpose {
    Salary,
    Bonus,
    Reimbursement,
    Contractor,
    Correction,
    Supplement,
}

impl ObligationPurpose {
    pub fn name(self) -> &'static str {
        match self {
            Self::Salary => "salary",
            Self::Bonus => "bonus",
            Self::Reimbursement => "reimbursement",
            Self::Contractor => "contractor",
            Self::Correction => "correction",
            Self::Supplement => "supplement",
        }
    }
}

impl fmt::Display for ObligationPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured metadata, one variant per obligation purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObligationMetadata {
    Salary {
        employee_id: String,
        pay_period_start: NaiveDate,
        pay_period_end: NaiveDate,
    },
    Bonus {
        employee_id: String,
        award: String,
    },
    Reimbursement {
        employee_id: String,
        expense_report_id: String,
    },
    Contractor {
        contractor_id: String,
        invoice_id: String,
    },
    Correction {
        original_ref: String,
        reason: String,
        #[serde(default)]
        recipient: Option<String>,
    },
    Supplement {
        original_ref: String,
        reason: String,
        #[serde(default)]
        recipient: Option<String>,
    },
}

impl ObligationMetadata {
    pub fn purpose(&self) -> ObligationPurpose {
        match self {
            Self::Salary { .. } => ObligationPurpose::Salary,
            Self::Bonus { .. } => ObligationPurpose::Bonus,
            Self::Reimbursement { .. } => ObligationPurpose::Reimbursement,
            Self::Contractor { .. } => ObligationPurpose::Contractor,
            Self::Correction { .. } => ObligationPurpose::Correction,
            Self::Supplement { .. } => ObligationPurpose::Supplement,
        }
    }

    /// Party the honoring adapter should pay, when the metadata names one.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::Salary { employee_id, .. }
            | Self::Bonus { employee_id, .. }
            | Self::Reimbursement { employee_id, .. } => Some(employee_id),
            Self::Contractor { contractor_id, .. } => Some(contractor_id),
            Self::Correction { recipient, .. } | Self::Supplement { recipient, .. } => {
                recipient.as_deref()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ObligationError> {
        match self {
            Self::Salary {
                employee_id,
                pay_period_start,
                pay_period_end,
            } => {
                require_non_empty("metadata.employee_id", employee_id)?;
                if pay_period_end < pay_period_start {
                    return Err(ObligationError::validation(format!(
                        "pay period ends ({pay_period_end}) before it starts ({pay_period_start})"
                    )));
                }
                Ok(())
            }
            Self::Bonus { employee_id, award } => {
                require_non_empty("metadata.employee_id", employee_id)?;
                require_non_empty("metadata.award", award)
            }
            Self::Reimbursement {
                employee_id,
                expense_report_id,
            } => {
                require_non_empty("metadata.employee_id", employee_id)?;
                require_non_empty("metadata.expense_report_id", expense_report_id)
            }
            Self::Contractor {
                contractor_id,
                invoice_id,
            } => {
                require_non_empty("metadata.contractor_id", contractor_id)?;
                require_non_empty("metadata.invoice_id", invoice_id)
            }
            Self::Correction {
                original_ref,
                reason,
                ..
            }
            | Self::Supplement {
                original_ref,
                reason,
                ..
            } => {
                require_non_empty("metadata.original_ref", original_ref)?;
                require_non_empty("metadata.reason", reason)
            }
        }
    }

    /// Flat labels handed to the honoring adapter alongside the correlation ids.
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("purpose".to_string(), self.purpose().name().to_string());
        match self {
            Self::Salary {
                pay_period_start,
                pay_period_end,
                ..
            } => {
                labels.insert("pay_period_start".to_string(), pay_period_start.to_string());
                labels.insert("pay_period_end".to_string(), pay_period_end.to_string());
            }
            Self::Bonus { award, .. } => {
                labels.insert("award".to_string(), award.clone());
            }
            Self::Reimbursement {
                expense_report_id, ..
            } => {
                labels.insert("expense_report_id".to_string(), expense_report_id.clone());
            }
            Self::Contractor { invoice_id, .. } => {
                labels.insert("invoice_id".to_string(), invoice_id.clone());
            }
            Self::Correction { original_ref, .. } | Self::Supplement { original_ref, .. } => {
                labels.insert("original_ref".to_string(), original_ref.clone());
            }
        }
        labels
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ObligationError> {
    if value.trim().is_empty() {
        return Err(ObligationError::validation(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

/// One financial obligation entering the clearing core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationIntent {
    /// Absent for a new obligation; set to the original key for a retry.
    #[serde(default)]
    pub intent_id: Option<IntentId>,
    pub debit_account: String,
    pub credit_account: String,
    pub amount_minor: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub description: String,
    pub purpose: ObligationPurpose,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    pub metadata: ObligationMetadata,
}

impl ObligationIntent {
    /// Build an intent whose purpose is taken from its metadata.
    pub fn new(
        debit_account: impl Into<String>,
        credit_account: impl Into<String>,
        amount_minor: u64,
        description: impl Into<String>,
        metadata: ObligationMetadata,
    ) -> Result<Self, ObligationError> {
        metadata.validate()?;
        Ok(Self {
            intent_id: None,
            debit_account: debit_account.into(),
            credit_account: credit_account.into(),
            amount_minor,
            currency: default_currency(),
            description: description.into(),
            purpose: metadata.purpose(),
            scheduled_date: None,
            metadata,
        })
    }

    pub fn with_intent_id(mut self, intent_id: IntentId) -> Self {
        self.intent_id = Some(intent_id);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_scheduled_date(mut self, date: NaiveDate) -> Self {
        self.scheduled_date = Some(date);
        self
    }

    /// Recipient for honoring: the metadata's party, else the credit account.
    pub fn recipient(&self) -> &str {
        self.metadata
            .recipient()
            .unwrap_or(self.credit_account.as_str())
    }

    /// Precondition check run before any collaborator is called.
    pub fn validate(&self) -> Result<(), ObligationError> {
        if self.amount_minor == 0 {
            return Err(ObligationError::validation(
                "amount_minor must be greater than zero",
            ));
        }
        require_non_empty("debit_account", &self.debit_account)?;
        require_non_empty("credit_account", &self.credit_account)?;
        require_non_empty("description", &self.description)?;
        if self.debit_account == self.credit_account {
            return Err(ObligationError::validation(format!(
                "debit and credit account are both '{}'",
                self.debit_account
            )));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ObligationError::validation(format!(
                "currency '{}' is not a three-letter code",
                self.currency
            )));
        }
        if self.metadata.purpose() != self.purpose {
            return Err(ObligationError::validation(format!(
                "metadata describes a {} obligation but purpose is {}",
                self.metadata.purpose(),
                self.purpose
            )));
        }
        self.metadata.validate()
    }
}

/// Input to the fee calculator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRequest {
    pub intent_id: IntentId,
    pub amount_minor: u64,
    pub currency: String,
    pub purpose: ObligationPurpose,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub schedule_version: String,
    pub processing_fee_minor: u64,
    pub honoring_fee_minor: u64,
    pub total_fee_minor: u64,
}

impl FeeBreakdown {
    pub fn new(
        schedule_version: impl Into<String>,
        processing_fee_minor: u64,
        honoring_fee_minor: u64,
    ) -> Self {
        Self {
            schedule_version: schedule_version.into(),
            processing_fee_minor,
            honoring_fee_minor,
            total_fee_minor: processing_fee_minor.saturating_add(honoring_fee_minor),
        }
    }

    pub fn zero(schedule_version: impl Into<String>) -> Self {
        Self::new(schedule_version, 0, 0)
    }
}

/// Intent as presented to the clearing authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearingRequest {
    pub intent_id: IntentId,
    pub debit_account: String,
    pub credit_account: String,
    pub amount_minor: u64,
    pub currency: String,
    pub purpose: ObligationPurpose,
    pub description: String,
    pub scheduled_date: Option<NaiveDate>,
    pub fee: FeeBreakdown,
}

impl ClearingRequest {
    pub fn from_intent(intent: &ObligationIntent, intent_id: IntentId, fee: FeeBreakdown) -> Self {
        Self {
            intent_id,
            debit_account: intent.debit_account.clone(),
            credit_account: intent.credit_account.clone(),
            amount_minor: intent.amount_minor,
            currency: intent.currency.clone(),
            purpose: intent.purpose,
            description: intent.description.clone(),
            scheduled_date: intent.scheduled_date,
            fee,
        }
    }
}

/// Authoritative clearing outcome. `Cleared` is terminal and carries a permanent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClearingResult {
    Cleared { transfer_id: TransferId },
    Rejected { error: String },
}

impl ClearingResult {
    pub fn cleared(transfer_id: TransferId) -> Self {
        Self::Cleared { transfer_id }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self::Rejected {
            error: error.into(),
        }
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self, Self::Cleared { .. })
    }

    pub fn transfer_id(&self) -> Option<&TransferId> {
        match self {
            Self::Cleared { transfer_id } => Some(transfer_id),
            Self::Rejected { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Cleared { .. } => None,
            Self::Rejected { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClearingStatus {
    Finalized,
    Failed,
}

/// Request handed to the honoring adapter for an already-cleared obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HonoringRequest {
    pub intent_id: IntentId,
    pub transfer_id: TransferId,
    pub recipient: String,
    pub amount_minor: u64,
    pub currency: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HonoringReceipt {
    pub receipt_id: String,
    pub adapter: String,
    pub honored_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

/// Descriptive honoring outcome. Never feeds back into the clearing status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HonoringOutcome {
    pub attempted: bool,
    pub succeeded: bool,
    pub receipt_id: Option<String>,
    pub error: Option<String>,
}

impl HonoringOutcome {
    pub fn honored(receipt_id: impl Into<String>) -> Self {
        Self {
            attempted: true,
            succeeded: true,
            receipt_id: Some(receipt_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            attempted: true,
            succeeded: false,
            receipt_id: None,
            error: Some(error.into()),
        }
    }
}

/// Adapter-side record of a fulfillment, used by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HonoringRecord {
    pub receipt_id: String,
    pub recipient: String,
    pub amount_minor: u64,
    pub currency: String,
    pub metadata: BTreeMap<String, String>,
}

/// Caller-facing result of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationResult {
    pub intent_id: IntentId,
    pub success: bool,
    pub clearing_status: ClearingStatus,
    pub transfer_id: Option<TransferId>,
    pub honoring_outcome: Option<HonoringOutcome>,
    pub fee_breakdown: Option<FeeBreakdown>,
    pub error: Option<String>,
    pub failure_class: Option<FailureClass>,
}

impl ObligationResult {
    pub fn finalized(
        intent_id: IntentId,
        transfer_id: TransferId,
        honoring_outcome: Option<HonoringOutcome>,
        fee_breakdown: FeeBreakdown,
    ) -> Self {
        Self {
            intent_id,
            success: true,
            clearing_status: ClearingStatus::Finalized,
            transfer_id: Some(transfer_id),
            honoring_outcome,
            fee_breakdown: Some(fee_breakdown),
            error: None,
            failure_class: None,
        }
    }

    pub fn failed(
        intent_id: IntentId,
        fee_breakdown: Option<FeeBreakdown>,
        failure_class: FailureClass,
        error: impl Into<String>,
    ) -> Self {
        Self {
            intent_id,
            success: false,
            clearing_status: ClearingStatus::Failed,
            transfer_id: None,
            honoring_outcome: None,
            fee_breakdown,
            error: Some(error.into()),
            failure_class: Some(failure_class),
        }
    }

    pub fn total_fee_minor(&self) -> u64 {
        self.fee_breakdown
            .as_ref()
            .map(|fee| fee.total_fee_minor)
            .unwrap_or(0)
    }
}

/// A failed batch entry, kept at its original position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemFailure {
    pub index: usize,
    pub result: ObligationResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: String,
    /// Per-item results in submission order.
    pub items: Vec<ObligationResult>,
    pub success_count: usize,
    pub failures: Vec<BatchItemFailure>,
    /// Sum over cleared items only.
    pub total_amount_minor: u64,
    /// Sum over cleared items only.
    pub total_fees_minor: u64,
    pub elapsed: Duration,
}

impl BatchResult {
    /// True when at least one item cleared. Does not mean every item cleared.
    pub fn success(&self) -> bool {
        self.success_count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionType {
    Correction,
    Supplement,
}

impl CorrectionType {
    pub fn purpose(self) -> ObligationPurpose {
        match self {
            Self::Correction => ObligationPurpose::Correction,
            Self::Supplement => ObligationPurpose::Supplement,
        }
    }
}

/// Amendment to a prior obligation, submitted as a new obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionIntent {
    /// Transfer id or intent id of the prior obligation. Context only.
    pub original_ref: String,
    pub correction_type: CorrectionType,
    pub amount_minor: u64,
    pub reason: String,
    pub effective_date: NaiveDate,
    /// Defaults to the original's debit account.
    #[serde(default)]
    pub debit_account: Option<String>,
    /// Defaults to the original's credit account.
    #[serde(default)]
    pub credit_account: Option<String>,
    /// Defaults to the original's currency.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
}

impl CorrectionIntent {
    pub fn new(
        original_ref: impl Into<String>,
        correction_type: CorrectionType,
        amount_minor: u64,
        reason: impl Into<String>,
        effective_date: NaiveDate,
    ) -> Self {
        Self {
            original_ref: original_ref.into(),
            correction_type,
            amount_minor,
            reason: reason.into(),
            effective_date,
            debit_account: None,
            credit_account: None,
            currency: None,
            recipient: None,
        }
    }

    pub fn with_accounts(
        mut self,
        debit_account: impl Into<String>,
        credit_account: impl Into<String>,
    ) -> Self {
        self.debit_account = Some(debit_account.into());
        self.credit_account = Some(credit_account.into());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }
}

/// Read-only view of a previously cleared obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationSnapshot {
    pub intent_id: IntentId,
    pub transfer_id: TransferId,
    pub debit_account: String,
    pub credit_account: String,
    pub amount_minor: u64,
    pub currency: String,
    pub purpose: ObligationPurpose,
    pub cleared_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionReceipt {
    /// Intent id of the new correction obligation.
    pub correction_id: IntentId,
    pub original_ref: String,
    pub new_clearing_id: TransferId,
    pub fee_amount_minor: u64,
    pub result: ObligationResult,
}

/// Cleared transfer as known to the authority, input to reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearedTransfer {
    pub transfer_id: TransferId,
    pub intent_id: IntentId,
    pub amount_minor: u64,
    pub currency: String,
}
