//! Audit writer for security events that are not part of a transactional
//! change: logins, refreshes, failed authentications.
//!
//! Entries go through a bounded queue to a background task that retries
//! failed inserts a few times before giving up. A caller that must not
//! proceed without a durable entry (successful login) uses [`AuditWriter::write`]
//! instead, which runs the same retry loop inline.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use crate::config::AuditConfig;
use crate::db::repositories::{AuditLogCommandRepository, RepoError};
use crate::domain::AuditRecord;

enum Message {
    Record(AuditRecord),
    Flush(oneshot::Sender<()>),
}

/// Wall clock that never repeats or goes backwards, so entries written by
/// this process sort in the order they were recorded.
#[derive(Default)]
struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let mut prev = self.last_micros.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self.last_micros.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
                Err(actual) => prev = actual,
            }
        }
    }
}

#[derive(Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

async fn persist(
    repo: &dyn AuditLogCommandRepository,
    record: &AuditRecord,
    policy: RetryPolicy,
) -> Result<i64, RepoError> {
    let mut attempt = 1;
    loop {
        match repo.append(record).await {
            Ok(id) => return Ok(id),
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    event = "audit_write_retry",
                    attempt,
                    action = record.action.as_str(),
                    error = %e,
                    "Audit write failed, retrying"
                );
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                metrics::counter!("audit_write_failures_total").increment(1);
                error!(
                    event = "audit_write_failed",
                    attempts = attempt,
                    action = record.action.as_str(),
                    resource = record.resource.as_str(),
                    error = %e,
                    "Audit entry could not be persisted"
                );
                return Err(e);
            }
        }
    }
}

pub struct AuditWriter {
    tx: mpsc::Sender<Message>,
    repo: Arc<dyn AuditLogCommandRepository>,
    clock: MonotonicClock,
    policy: RetryPolicy,
}

impl AuditWriter {
    /// Starts the background writer. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(repo: Arc<dyn AuditLogCommandRepository>, config: &AuditConfig) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel(config.queue_capacity.max(1));
        let policy = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        };

        let worker_repo = repo.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Record(record) => {
                        let _ = persist(worker_repo.as_ref(), &record, policy).await;
                    }
                    Message::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Arc::new(Self {
            tx,
            repo,
            clock: MonotonicClock::default(),
            policy,
        })
    }

    fn stamp(&self, mut record: AuditRecord) -> AuditRecord {
        record.occurred_at = self.clock.now();
        record
    }

    /// Queues an entry. Never fails the caller; a full queue drops the
    /// entry and counts it.
    pub fn record(&self, record: AuditRecord) {
        let record = self.stamp(record);
        if let Err(e) = self.tx.try_send(Message::Record(record)) {
            metrics::counter!("audit_events_dropped_total").increment(1);
            let record = match e {
                mpsc::error::TrySendError::Full(Message::Record(r))
                | mpsc::error::TrySendError::Closed(Message::Record(r)) => Some(r),
                _ => None,
            };
            error!(
                event = "audit_event_dropped",
                action = record.as_ref().map(|r| r.action.as_str()),
                "Audit queue unavailable, entry dropped"
            );
        }
    }

    /// Persists an entry before returning, with the same bounded retry as
    /// the background path.
    pub async fn write(&self, record: AuditRecord) -> Result<i64, RepoError> {
        let record = self.stamp(record);
        persist(self.repo.as_ref(), &record, self.policy).await
    }

    /// Waits until every entry queued before this call has been handled.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Message::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::RepoResult;
    use crate::domain::{AuditAction, AuditResource};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, SharedString, Unit};
    use std::sync::atomic::{AtomicU32, AtomicU64};

    #[derive(Default)]
    struct FlakyRepo {
        failures_left: AtomicU32,
        written: Mutex<Vec<AuditRecord>>,
    }

    #[async_trait]
    impl AuditLogCommandRepository for FlakyRepo {
        async fn append(&self, record: &AuditRecord) -> RepoResult<i64> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(RepoError::Unavailable("down".into()));
            }
            let mut written = self.written.lock().unwrap();
            written.push(record.clone());
            Ok(written.len() as i64)
        }
    }

    fn config(max_attempts: u32) -> AuditConfig {
        AuditConfig {
            queue_capacity: 64,
            max_attempts,
            retry_backoff_ms: 1,
        }
    }

    /// Counts `audit_events_dropped_total` and ignores every other metric.
    #[derive(Default)]
    struct DropCounter {
        dropped: Arc<AtomicU64>,
    }

    impl metrics::Recorder for DropCounter {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            if key.name() == "audit_events_dropped_total" {
                Counter::from_arc(self.dropped.clone())
            } else {
                Counter::noop()
            }
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    fn login() -> AuditRecord {
        AuditRecord::new(AuditAction::Login, AuditResource::Session)
    }

    #[tokio::test]
    async fn test_background_write_retries() {
        let repo = Arc::new(FlakyRepo::default());
        repo.failures_left.store(2, Ordering::SeqCst);
        let writer = AuditWriter::spawn(repo.clone(), &config(3));

        writer.record(login());
        writer.flush().await;

        assert_eq!(repo.written.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_write_gives_up_after_max_attempts() {
        let repo = Arc::new(FlakyRepo::default());
        repo.failures_left.store(5, Ordering::SeqCst);
        let writer = AuditWriter::spawn(repo.clone(), &config(2));

        assert!(writer.write(login()).await.is_err());
        assert!(repo.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let repo = Arc::new(FlakyRepo::default());
        let writer = AuditWriter::spawn(repo.clone(), &config(1));

        for _ in 0..50 {
            writer.record(login());
        }
        writer.flush().await;

        let written = repo.written.lock().unwrap();
        assert_eq!(written.len(), 50);
        assert!(written.windows(2).all(|w| w[0].occurred_at < w[1].occurred_at));
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_counts() {
        let repo = Arc::new(FlakyRepo::default());
        let writer = AuditWriter::spawn(
            repo.clone(),
            &AuditConfig {
                queue_capacity: 2,
                ..config(1)
            },
        );
        let recorder = DropCounter::default();

        // The worker cannot run between these sends, so only two fit.
        metrics::with_local_recorder(&recorder, || {
            for _ in 0..5 {
                writer.record(login());
            }
        });
        writer.flush().await;

        assert_eq!(recorder.dropped.load(Ordering::SeqCst), 3);
        assert_eq!(repo.written.lock().unwrap().len(), 2);
    }
}
