// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Concurrency registry.
//!
//! Every execution holds one lease while it works. A lease is granted only
//! while fewer than `ceiling` unexpired leases exist; the sweep of expired
//! leases, the count and the insert happen in one atomic unit in the backend.
//! Leases of executions killed by their host expire after `ttl` and are
//! reaped by the next `acquire`. A running execution keeps its lease alive
//! with a [`LeaseHeartbeat`], so work that outlasts `ttl` still counts
//! against the ceiling.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CrawlError;
use crate::persistence::{LeaseRecord, Persistence};

/// A granted execution lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Lease id.
    pub id: String,
    /// When the lease was granted.
    pub acquired_at: DateTime<Utc>,
    /// When the lease stops counting against the ceiling.
    pub expires_at: DateTime<Utc>,
}

/// Lease-based gate on the number of concurrently active executions.
#[derive(Clone)]
pub struct ConcurrencyRegistry {
    persistence: Arc<dyn Persistence>,
    ceiling: u32,
    ttl: Duration,
}

impl ConcurrencyRegistry {
    /// Registry allowing `ceiling` live leases, each valid for `ttl`.
    pub fn new(persistence: Arc<dyn Persistence>, ceiling: u32, ttl: Duration) -> Self {
        Self {
            persistence,
            ceiling,
            ttl,
        }
    }

    /// Configured ceiling.
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Try to register a new lease. `None` if the ceiling is reached.
    pub async fn acquire(&self) -> Result<Option<Lease>, CrawlError> {
        self.acquire_at(Utc::now()).await
    }

    /// [`ConcurrencyRegistry::acquire`] with an explicit clock reading.
    pub async fn acquire_at(&self, now: DateTime<Utc>) -> Result<Option<Lease>, CrawlError> {
        let ttl = self.chrono_ttl("acquire_lease")?;
        let lease = Lease {
            id: Uuid::new_v4().to_string(),
            acquired_at: now,
            expires_at: now + ttl,
        };
        let record = LeaseRecord {
            id: lease.id.clone(),
            acquired_at: lease.acquired_at.timestamp_millis(),
            expires_at: lease.expires_at.timestamp_millis(),
        };

        if self
            .persistence
            .try_insert_lease(&record, self.ceiling, now.timestamp_millis())
            .await?
        {
            info!(lease_id = %lease.id, expires_at = %lease.expires_at, "Lease acquired");
            Ok(Some(lease))
        } else {
            info!(ceiling = self.ceiling, "Concurrency ceiling reached");
            Ok(None)
        }
    }

    /// Push the expiry of `lease` to `ttl` from now.
    ///
    /// Returns false if the lease already expired or was released; the
    /// execution no longer holds a slot then.
    pub async fn renew(&self, lease: &Lease) -> Result<bool, CrawlError> {
        self.renew_at(lease, Utc::now()).await
    }

    /// [`ConcurrencyRegistry::renew`] with an explicit clock reading.
    pub async fn renew_at(&self, lease: &Lease, now: DateTime<Utc>) -> Result<bool, CrawlError> {
        let expires_at = now + self.chrono_ttl("renew_lease")?;
        let renewed = self
            .persistence
            .renew_lease(
                &lease.id,
                expires_at.timestamp_millis(),
                now.timestamp_millis(),
            )
            .await?;
        if renewed {
            debug!(lease_id = %lease.id, expires_at = %expires_at, "Lease renewed");
        }
        Ok(renewed)
    }

    /// Renew `lease` in the background every third of `ttl` until the
    /// returned heartbeat is stopped or dropped.
    pub fn keep_alive(&self, lease: &Lease) -> LeaseHeartbeat {
        let registry = self.clone();
        let lease = lease.clone();
        let period = (self.ttl / 3).max(Duration::from_millis(10));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match registry.renew(&lease).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(lease_id = %lease.id, "Lease expired before renewal, slot lost");
                        break;
                    }
                    Err(e) => warn!(lease_id = %lease.id, "Lease renewal failed: {}", e),
                }
            }
        });

        LeaseHeartbeat { handle }
    }

    /// Remove a lease. Releasing an unknown or already released lease is a no-op.
    pub async fn release(&self, lease: &Lease) -> Result<(), CrawlError> {
        if self.persistence.delete_lease(&lease.id).await? {
            debug!(lease_id = %lease.id, "Lease released");
        } else {
            warn!(lease_id = %lease.id, "Lease was already gone on release");
        }
        Ok(())
    }

    /// Number of registered leases.
    pub async fn count(&self) -> Result<i64, CrawlError> {
        self.persistence.count_leases().await
    }

    /// Delete leases that expired before `now`. Returns how many were deleted.
    pub async fn reap(&self, now: DateTime<Utc>) -> Result<u64, CrawlError> {
        let reaped = self
            .persistence
            .delete_expired_leases(now.timestamp_millis())
            .await?;
        if reaped > 0 {
            info!(reaped, "Reaped expired leases");
        }
        Ok(reaped)
    }

    fn chrono_ttl(&self, operation: &str) -> Result<chrono::Duration, CrawlError> {
        chrono::Duration::from_std(self.ttl).map_err(|e| CrawlError::database(operation, e))
    }
}

/// Background renewal of one lease. Stops when dropped.
#[derive(Debug)]
pub struct LeaseHeartbeat {
    handle: JoinHandle<()>,
}

impl LeaseHeartbeat {
    /// Stop renewing.
    pub fn stop(self) {
        self.handle.abort();
    }

    /// Whether the renewal loop has ended, e.g. because the lease was lost.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for LeaseHeartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry(ceiling: u32, ttl: Duration) -> ConcurrencyRegistry {
        let persistence = crate::persistence::connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        ConcurrencyRegistry::new(persistence, ceiling, ttl)
    }

    #[tokio::test]
    async fn test_acquire_up_to_ceiling() {
        let registry = registry(2, Duration::from_secs(60)).await;

        let a = registry.acquire().await.unwrap().unwrap();
        let b = registry.acquire().await.unwrap().unwrap();
        assert_ne!(a.id, b.id);
        assert!(registry.acquire().await.unwrap().is_none());
        assert_eq!(registry.count().await.unwrap(), 2);

        registry.release(&a).await.unwrap();
        assert!(registry.acquire().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let registry = registry(1, Duration::from_secs(60)).await;
        let lease = registry.acquire().await.unwrap().unwrap();

        registry.release(&lease).await.unwrap();
        registry.release(&lease).await.unwrap();
        assert_eq!(registry.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_lease_is_reaped_by_acquire() {
        let registry = registry(1, Duration::from_secs(60)).await;
        let start = Utc::now();

        let orphan = registry.acquire_at(start).await.unwrap().unwrap();
        assert_eq!((orphan.expires_at - orphan.acquired_at).num_seconds(), 60);
        assert!(
            registry
                .acquire_at(start + chrono::Duration::seconds(30))
                .await
                .unwrap()
                .is_none()
        );

        let fresh = registry
            .acquire_at(start + chrono::Duration::seconds(61))
            .await
            .unwrap();
        assert!(fresh.is_some());
        assert_eq!(registry.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_renewed_lease_outlives_ttl() {
        let registry = registry(1, Duration::from_secs(60)).await;
        let start = Utc::now();
        let lease = registry.acquire_at(start).await.unwrap().unwrap();

        let renewal = start + chrono::Duration::seconds(50);
        assert!(registry.renew_at(&lease, renewal).await.unwrap());

        // Past the original expiry, within the renewed one.
        let later = start + chrono::Duration::seconds(90);
        assert!(registry.acquire_at(later).await.unwrap().is_none());
        assert_eq!(registry.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_lease_cannot_be_renewed() {
        let registry = registry(1, Duration::from_secs(60)).await;
        let start = Utc::now();
        let lease = registry.acquire_at(start).await.unwrap().unwrap();

        let late = start + chrono::Duration::seconds(61);
        assert!(!registry.renew_at(&lease, late).await.unwrap());

        registry.release(&lease).await.unwrap();
        assert!(!registry.renew_at(&lease, start).await.unwrap());
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_lease_alive() {
        let registry = registry(1, Duration::from_millis(300)).await;
        let lease = registry.acquire().await.unwrap().unwrap();
        let heartbeat = registry.keep_alive(&lease);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(registry.acquire().await.unwrap().is_none());
        assert!(!heartbeat.is_finished());

        heartbeat.stop();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(registry.acquire().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reap() {
        let registry = registry(5, Duration::from_secs(10)).await;
        let start = Utc::now();
        registry.acquire_at(start).await.unwrap();
        registry.acquire_at(start).await.unwrap();

        assert_eq!(registry.reap(start).await.unwrap(), 0);
        assert_eq!(
            registry
                .reap(start + chrono::Duration::seconds(11))
                .await
                .unwrap(),
            2
        );
        assert_eq!(registry.count().await.unwrap(), 0);
    }
}
