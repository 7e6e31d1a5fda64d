use clearing_core::collaborators::FeeCalculator;
use clearing_core::error::CollaboratorError;
use clearing_core::types::{FeeBreakdown, FeeRequest, ObligationPurpose};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reference fee schedule parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeScheduleConfig {
    pub version: String,
    /// Processing fee in basis points of the obligation amount, rounded down.
    pub processing_bps: u32,
    /// Flat honoring fee per obligation.
    pub honoring_fee_minor: u64,
    /// Purposes charged nothing.
    pub exempt_purposes: BTreeSet<ObligationPurpose>,
    pub supported_currencies: BTreeSet<String>,
}

impl Default for FeeScheduleConfig {
    fn default() -> Self {
        Self {
            version: "fees-v1".to_string(),
            processing_bps: 25,
            honoring_fee_minor: 30,
            exempt_purposes: BTreeSet::from([ObligationPurpose::Correction]),
            supported_currencies: ["USD", "EUR", "GBP"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    config: FeeScheduleConfig,
}

impl FeeSchedule {
    pub fn new(config: FeeScheduleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeeScheduleConfig {
        &self.config
    }
}

impl FeeCalculator for FeeSchedule {
    fn calculate(&self, request: &FeeRequest) -> Result<FeeBreakdown, CollaboratorError> {
        if !self.config.supported_currencies.contains(&request.currency) {
            return Err(CollaboratorError::Rejected(format!(
                "currency '{}' is not covered by fee schedule {}",
                request.currency, self.config.version
            )));
        }

        if self.config.exempt_purposes.contains(&request.purpose) {
            return Ok(FeeBreakdown::zero(self.config.version.clone()));
        }

        let processing =
            u128::from(request.amount_minor) * u128::from(self.config.processing_bps) / 10_000;
        let processing_fee_minor = u64::try_from(processing).map_err(|_| {
            CollaboratorError::Rejected(format!(
                "processing fee for {} overflows",
                request.amount_minor
            ))
        })?;

        Ok(FeeBreakdown::new(
            self.config.version.clone(),
            processing_fee_minor,
            self.config.honoring_fee_minor,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clearing_core::types::IntentId;

    fn request(amount_minor: u64, currency: &str, purpose: ObligationPurpose) -> FeeRequest {
        FeeRequest {
            intent_id: IntentId::new("intent-1").unwrap(),
            amount_minor,
            currency: currency.into(),
            purpose,
        }
    }

    #[test]
    fn charges_bps_plus_flat_fee() {
        let fees = FeeSchedule::default();
        let breakdown = fees
            .calculate(&request(500_000, "USD", ObligationPurpose::Salary))
            .unwrap();
        assert_eq!(breakdown.processing_fee_minor, 1_250);
        assert_eq!(breakdown.honoring_fee_minor, 30);
        assert_eq!(breakdown.total_fee_minor, 1_280);
        assert_eq!(breakdown.schedule_version, "fees-v1");
    }

    #[test]
    fn corrections_are_exempt_but_supplements_are_not() {
        let fees = FeeSchedule::default();
        let correction = fees
            .calculate(&request(10_000, "USD", ObligationPurpose::Correction))
            .unwrap();
        assert_eq!(correction.total_fee_minor, 0);

        let supplement = fees
            .calculate(&request(10_000, "USD", ObligationPurpose::Supplement))
            .unwrap();
        assert_eq!(supplement.total_fee_minor, 25 + 30);
    }

    #[test]
    fn rounds_down_and_handles_max_amount() {
        let fees = FeeSchedule::default();
        let small = fees
            .calculate(&request(399, "EUR", ObligationPurpose::Bonus))
            .unwrap();
        assert_eq!(small.processing_fee_minor, 0);

        let huge = fees
            .calculate(&request(u64::MAX, "USD", ObligationPurpose::Bonus))
            .unwrap();
        assert_eq!(huge.processing_fee_minor, u64::MAX / 400);
    }

    #[test]
    fn unsupported_currency_is_an_error() {
        let err = FeeSchedule::default()
            .calculate(&request(100, "JPY", ObligationPurpose::Salary))
            .unwrap_err();
        assert!(err.to_string().contains("JPY"));
    }
}
