use crate::collaborators::NarrativeMirror;
use crate::error::{CollaboratorError, ObligationError};
use crate::narrative::NarrativeRecord;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fire-and-forget dispatch of narrative records.
///
/// Every write runs on its own detached task. The dispatching call returns before the
/// task is polled and never observes its result; failures, timeouts and panics end in
/// the log and nowhere else.
#[derive(Clone)]
pub struct MirrorDispatcher {
    mirror: Option<Arc<dyn NarrativeMirror>>,
    timeout: Duration,
}

impl MirrorDispatcher {
    pub fn new(mirror: Arc<dyn NarrativeMirror>, timeout: Duration) -> Self {
        Self {
            mirror: Some(mirror),
            timeout,
        }
    }

    pub fn disabled() -> Self {
        Self {
            mirror: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mirror.is_some()
    }

    pub fn dispatch(&self, record: NarrativeRecord) {
        let Some(mirror) = self.mirror.clone() else {
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    record_id = %record.record_id,
                    kind = record.body.kind(),
                    "no async runtime available, narrative record dropped"
                );
                return;
            }
        };

        let timeout = self.timeout;
        let record_id = record.record_id.clone();
        let kind = record.body.kind();

        // The join handle is dropped: the task is never awaited.
        let _ = runtime.spawn(async move {
            let err = match tokio::time::timeout(timeout, mirror.record(record)).await {
                Ok(Ok(())) => {
                    debug!(record_id = %record_id, kind, "narrative record written");
                    return;
                }
                Ok(Err(e)) => e,
                Err(_) => CollaboratorError::Timeout(timeout),
            };
            let degradation = ObligationError::Mirror(err.to_string());
            warn!(
                record_id = %record_id,
                kind,
                failure_class = degradation.class().name(),
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                error = %degradation,
                "narrative record dropped"
            );
        });
    }
}

impl Default for MirrorDispatcher {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::{BatchNarrative, NarrativeBody};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct HangingMirror {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NarrativeMirror for HangingMirror {
        async fn record(&self, _record: NarrativeRecord) -> Result<(), CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    fn record() -> NarrativeRecord {
        NarrativeRecord::new(NarrativeBody::BatchSummary(BatchNarrative {
            batch_id: "b".into(),
            item_count: 0,
            success_count: 0,
            failure_count: 0,
            total_amount_minor: 0,
            total_fees_minor: 0,
            elapsed_ms: 0,
        }))
    }

    #[tokio::test]
    async fn dispatch_returns_without_waiting_for_hanging_mirror() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = MirrorDispatcher::new(
            Arc::new(HangingMirror {
                calls: calls.clone(),
            }),
            Duration::from_secs(60),
        );

        let started = Instant::now();
        dispatcher.dispatch(record());
        assert!(started.elapsed() < Duration::from_millis(50));

        // Give the detached task a chance to start.
        for _ in 0..50 {
            if calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timed_out_write_is_dropped_without_reaching_caller() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = MirrorDispatcher::new(
            Arc::new(HangingMirror {
                calls: calls.clone(),
            }),
            Duration::from_millis(10),
        );

        dispatcher.dispatch(record());
        dispatcher.dispatch(record());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dispatch_outside_runtime_drops_record() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = MirrorDispatcher::new(
            Arc::new(HangingMirror {
                calls: calls.clone(),
            }),
            Duration::from_secs(1),
        );
        dispatcher.dispatch(record());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disabled_dispatcher_is_a_no_op() {
        let dispatcher = MirrorDispatcher::disabled();
        assert!(!dispatcher.is_enabled());
        dispatcher.dispatch(record());
    }
}
