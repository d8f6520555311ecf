// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Continuation store.
//!
//! A continuation is a [`Traversal`] serialized as JSON, tagged with the phase
//! it resumes in. `take` removes the task in the same statement that reads it,
//! so two executions never resume the same position.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::CrawlError;
use crate::persistence::Persistence;
use crate::traversal::Traversal;

/// A continuation taken from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    /// Task id.
    pub id: String,
    /// Phase recorded when the task was saved.
    pub discriminator: String,
    /// Resume position.
    pub traversal: Traversal,
}

/// Saves and takes continuation tasks.
#[derive(Clone)]
pub struct ContinuationStore {
    persistence: Arc<dyn Persistence>,
}

impl ContinuationStore {
    /// Store backed by `persistence`.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    /// Persist `traversal` as a new task and return its id.
    pub async fn save(&self, traversal: &Traversal) -> Result<String, CrawlError> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(traversal)?;
        let discriminator = traversal.discriminator();

        self.persistence
            .insert_continuation(&id, discriminator, &payload)
            .await?;

        info!(
            continuation_id = %id,
            discriminator,
            frontier = traversal.frontier(),
            "Continuation saved"
        );
        Ok(id)
    }

    /// Remove and return the oldest task, or `None` if there is none.
    ///
    /// A task whose payload does not decode is still removed and surfaces as
    /// [`CrawlError::MalformedContinuation`].
    pub async fn take(&self) -> Result<Option<Continuation>, CrawlError> {
        let Some(record) = self.persistence.take_oldest_continuation().await? else {
            debug!("No pending continuation");
            return Ok(None);
        };

        let traversal: Traversal = serde_json::from_str(&record.payload).map_err(|e| {
            CrawlError::MalformedContinuation {
                id: record.id.clone(),
                reason: e.to_string(),
            }
        })?;

        info!(
            continuation_id = %record.id,
            discriminator = %record.discriminator,
            frontier = traversal.frontier(),
            "Continuation taken"
        );
        Ok(Some(Continuation {
            id: record.id,
            discriminator: record.discriminator,
            traversal,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqlitePersistence;
    use crate::traversal::{Event, FETCH_COMMITS, SCAN_REPOSITORIES};

    async fn store() -> (ContinuationStore, Arc<dyn Persistence>) {
        let persistence = crate::persistence::connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        (ContinuationStore::new(persistence.clone()), persistence)
    }

    #[tokio::test]
    async fn test_save_then_take() {
        let (store, persistence) = store().await;
        let repos = serde_json::from_value(serde_json::json!([
            {"id": 4, "name": "a", "full_name": "o/a"},
            {"id": 6, "name": "b", "full_name": "o/b"}
        ]))
        .unwrap();
        let (traversal, _) =
            Traversal::starting_at(4, Some(100)).absorb(Event::RepoPage(repos), false);

        let id = store.save(&traversal).await.unwrap();
        assert_eq!(persistence.count_continuations().await.unwrap(), 1);

        let taken = store.take().await.unwrap().unwrap();
        assert_eq!(taken.id, id);
        assert_eq!(taken.discriminator, FETCH_COMMITS);
        assert_eq!(taken.traversal, traversal);

        assert!(store.take().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_take_oldest_first() {
        let (store, _) = store().await;
        let first = store.save(&Traversal::starting_at(10, None)).await.unwrap();
        store.save(&Traversal::starting_at(20, None)).await.unwrap();

        let taken = store.take().await.unwrap().unwrap();
        assert_eq!(taken.id, first);
        assert_eq!(taken.discriminator, SCAN_REPOSITORIES);
        assert_eq!(taken.traversal.next_start(), 10);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_consumed() {
        let (store, persistence) = store().await;
        persistence
            .insert_continuation("bad", SCAN_REPOSITORIES, "{\"next_start\": \"soon\"}")
            .await
            .unwrap();

        let err = store.take().await.unwrap_err();
        assert!(matches!(err, CrawlError::MalformedContinuation { ref id, .. } if id == "bad"));
        assert_eq!(persistence.count_continuations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_from_path_store() {
        let dir = tempfile::tempdir().unwrap();
        let persistence: Arc<dyn Persistence> = Arc::new(
            SqlitePersistence::from_path(dir.path().join("c.db"))
                .await
                .unwrap(),
        );
        let store = ContinuationStore::new(persistence);
        store.save(&Traversal::starting_at(1, None)).await.unwrap();
        assert!(store.take().await.unwrap().is_some());
    }
}
