use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::{dispatcher::Dispatcher, error::DispatchError, job::EncodedJob};

/// In-process job queue.
///
/// Useful for embedding and for tests. With a capacity set, pushes beyond it
/// are rejected, which is how a full downstream queue looks to the server.
#[derive(Debug, Clone, Default)]
pub struct MemoryDispatcher {
    jobs: Arc<Mutex<Vec<EncodedJob>>>,
    attempts: Arc<AtomicUsize>,
    capacity: Option<usize>,
    notify: Arc<Notify>,
}

impl MemoryDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue holding at most `capacity` jobs. Zero rejects everything.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Jobs accepted so far, in push order.
    pub async fn jobs(&self) -> Vec<EncodedJob> {
        self.jobs.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of pushes, accepted or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until at least `expected` jobs have been accepted.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Rejected`] if the timeout passes first.
    pub async fn wait_for_count(
        &self,
        expected: usize,
        timeout: Duration,
    ) -> Result<(), DispatchError> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.len().await >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
        .map_err(|_| DispatchError::Rejected(format!("Timed out waiting for {expected} jobs")))
    }
}

#[async_trait]
impl Dispatcher for MemoryDispatcher {
    async fn push(&self, job: EncodedJob) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let mut jobs = self.jobs.lock().await;
        if let Some(capacity) = self.capacity {
            if jobs.len() >= capacity {
                return Err(DispatchError::Rejected(format!(
                    "Queue is full ({capacity} jobs)"
                )));
            }
        }

        jobs.push(job);
        drop(jobs);

        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use catchment_common::config::JobsConfig;
    use catchment_mime::ParsedMessage;
    use chrono::Utc;

    use super::*;
    use crate::{
        job::encode,
        payload::{AuthData, EmailData, EnvelopeData},
    };

    fn job(uuid: &str) -> EncodedJob {
        let email = EmailData::new(
            uuid,
            "127.0.0.1:1",
            EnvelopeData::default(),
            AuthData::default(),
            ParsedMessage::default(),
            Utc::now(),
        );
        encode(
            &email,
            &JobsConfig {
                queue: "test".into(),
                ..JobsConfig::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn push_keeps_order() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher.push(job("a")).await.unwrap();
        dispatcher.push(job("b")).await.unwrap();

        let jobs = dispatcher.jobs().await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].headers()["uuid"], vec!["a".to_string()]);
        assert_eq!(dispatcher.attempts(), 2);

        assert!(!dispatcher.is_empty().await);
    }

    #[tokio::test]
    async fn capacity_rejects() {
        let dispatcher = MemoryDispatcher::with_capacity(1);
        dispatcher.push(job("a")).await.unwrap();

        let err = dispatcher.push(job("b")).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(dispatcher.attempts(), 2);
        assert_eq!(dispatcher.len().await, 1);
    }

    #[tokio::test]
    async fn wait_for_count_sees_concurrent_push() {
        let dispatcher = MemoryDispatcher::new();
        let pusher = dispatcher.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pusher.push(job("late")).await.unwrap();
        });

        dispatcher
            .wait_for_count(1, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(
            dispatcher
                .wait_for_count(2, Duration::from_millis(50))
                .await
                .is_err()
        );
    }
}
