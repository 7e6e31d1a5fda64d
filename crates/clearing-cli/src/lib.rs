#![deny(unsafe_code)]

use clearing_adapters::{
    AlwaysFailHonoringAdapter, FeeSchedule, FeeScheduleConfig, InMemoryClearingAuthority,
    MirrorStorageConfig, MockAchHonoringAdapter,
};
use clearing_core::{
    BatchOrchestrator, BatchResult, ClearingEngineConfig, CollaboratorError, CorrectionIntent,
    CorrectionReceipt, CorrectionService, ObligationError, ObligationIntent, ObligationResult,
    ObligationSubmissionService, Reconciler, ReconciliationReport,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Which honoring adapter the runtime wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HonoringMode {
    #[default]
    Ach,
    AlwaysFail,
    Disabled,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub engine: ClearingEngineConfig,
    pub fees: FeeScheduleConfig,
    pub mirror: MirrorStorageConfig,
    pub honoring: HonoringMode,
    pub ineligible_recipients: Vec<String>,
    pub rejected_accounts: Vec<String>,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("input IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("input serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Obligation(#[from] ObligationError),
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
}

#[derive(Debug, Serialize)]
pub struct CorrectionOutput {
    pub original: ObligationResult,
    pub correction: CorrectionReceipt,
}

#[derive(Debug, Serialize)]
pub struct ReconcileOutput {
    pub batch: BatchResult,
    pub report: ReconciliationReport,
}

/// Reference collaborators wired around one submission service.
pub struct ClearingRuntime {
    authority: Arc<InMemoryClearingAuthority>,
    ach: Option<Arc<MockAchHonoringAdapter>>,
    service: Arc<ObligationSubmissionService>,
}

impl ClearingRuntime {
    pub async fn bootstrap(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let RuntimeConfig {
            engine,
            fees,
            mirror,
            honoring,
            ineligible_recipients,
            rejected_accounts,
        } = config;

        let authority = Arc::new(
            rejected_accounts
                .into_iter()
                .fold(InMemoryClearingAuthority::new(), |authority, account| {
                    authority.with_rejected_account(account)
                }),
        );
        let narrative = mirror.build().await?;

        let mut service = ObligationSubmissionService::new(
            engine,
            authority.clone(),
            Arc::new(FeeSchedule::new(fees)),
        )
        .with_mirror(narrative);

        let mut ach = None;
        match honoring {
            HonoringMode::Ach => {
                let adapter = Arc::new(ineligible_recipients.into_iter().fold(
                    MockAchHonoringAdapter::new(),
                    |adapter, recipient| adapter.with_ineligible_recipient(recipient),
                ));
                service = service.with_honoring(adapter.clone());
                ach = Some(adapter);
            }
            HonoringMode::AlwaysFail => {
                service = service.with_honoring(Arc::new(AlwaysFailHonoringAdapter::new(
                    "ach",
                    "honoring rail unavailable",
                )));
            }
            HonoringMode::Disabled => {}
        }

        info!(
            mirror = mirror.label(),
            honoring = ?honoring,
            "clearing runtime ready"
        );

        Ok(Self {
            authority,
            ach,
            service: Arc::new(service),
        })
    }

    pub fn authority(&self) -> &Arc<InMemoryClearingAuthority> {
        &self.authority
    }

    pub async fn submit(&self, intent: ObligationIntent) -> ObligationResult {
        self.service.submit(intent).await
    }

    pub async fn batch(
        &self,
        items: Vec<ObligationIntent>,
        limit: Option<usize>,
    ) -> Result<BatchResult, RuntimeError> {
        let orchestrator = BatchOrchestrator::new(self.service.clone());
        let batch = match limit {
            Some(limit) => orchestrator.submit_batch(items, limit).await?,
            None => orchestrator.submit_batch_default(items).await?,
        };
        Ok(batch)
    }

    /// Submit `original`, then `correction` against the transfer it cleared.
    pub async fn correct(
        &self,
        original: ObligationIntent,
        mut correction: CorrectionIntent,
    ) -> Result<CorrectionOutput, RuntimeError> {
        let original = self.service.submit(original).await;
        let Some(transfer_id) = original.transfer_id.clone() else {
            return Err(ObligationError::Clearing(
                original
                    .error
                    .clone()
                    .unwrap_or_else(|| "original obligation did not clear".to_string()),
            )
            .into());
        };

        correction.original_ref = transfer_id.to_string();
        let corrections = CorrectionService::new(self.service.clone(), self.authority.clone());
        let correction = corrections.submit_correction(correction).await?;
        Ok(CorrectionOutput {
            original,
            correction,
        })
    }

    /// Run a batch, then reconcile honoring records against the authority journal.
    pub async fn reconcile(
        &self,
        items: Vec<ObligationIntent>,
    ) -> Result<ReconcileOutput, RuntimeError> {
        let batch = self.batch(items, None).await?;
        let cleared = self.authority.cleared_transfers()?;
        let report = match &self.ach {
            Some(ach) => Reconciler::reconcile_adapter(ach.as_ref(), &cleared).await?,
            None => Reconciler::reconcile(&[], &cleared),
        };
        Ok(ReconcileOutput { batch, report })
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, RuntimeError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
