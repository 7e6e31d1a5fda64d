use async_trait::async_trait;
use clearing_core::collaborators::NarrativeMirror;
use clearing_core::error::CollaboratorError;
use clearing_core::narrative::NarrativeRecord;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Keeps narrative records in process memory.
#[derive(Debug, Default)]
pub struct InMemoryNarrativeMirror {
    records: Mutex<Vec<NarrativeRecord>>,
}

impl InMemoryNarrativeMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Result<Vec<NarrativeRecord>, CollaboratorError> {
        Ok(self.lock()?.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<NarrativeRecord>>, CollaboratorError> {
        self.records
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("narrative store lock poisoned".into()))
    }
}

#[async_trait]
impl NarrativeMirror for InMemoryNarrativeMirror {
    async fn record(&self, record: NarrativeRecord) -> Result<(), CollaboratorError> {
        self.lock()?.push(record);
        Ok(())
    }
}

/// Emits each narrative record as a structured log event.
#[derive(Debug, Clone, Default)]
pub struct TracingNarrativeMirror;

#[async_trait]
impl NarrativeMirror for TracingNarrativeMirror {
    async fn record(&self, record: NarrativeRecord) -> Result<(), CollaboratorError> {
        let body = serde_json::to_string(&record.body)
            .map_err(|e| CollaboratorError::Rejected(format!("unserializable record: {e}")))?;
        info!(
            target: "clearing_narrative",
            record_id = %record.record_id,
            kind = record.body.kind(),
            recorded_at = %record.recorded_at,
            digest = %record.digest,
            body = %body,
            "narrative record"
        );
        Ok(())
    }
}
