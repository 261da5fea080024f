// src/pipeline/commit.rs

//! The committer: the only writer to the store while a run is in flight.
//!
//! Walkers and expiry re-checks send [`Observation`]s through a bounded
//! channel; a blocking task owning the store reconciles them one at a time,
//! each in its own transaction. The first failed transaction stops the task.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::{CommitStats, Observation};
use crate::pipeline::reconcile::{Outcome, reconcile};
use crate::storage::ListingStore;

/// Queue size between the crawl and the committer.
pub const DEFAULT_CAPACITY: usize = 64;

/// Handle for sending observations to the committer.
#[derive(Debug, Clone)]
pub struct CommitSender {
    tx: mpsc::Sender<Observation>,
}

impl CommitSender {
    /// Queue an observation; fails once the committer has stopped.
    pub async fn send(&self, observation: Observation) -> Result<()> {
        self.tx
            .send(observation)
            .await
            .map_err(|e| AppError::committer(format!("dropped {}: channel closed", e.0.item_id())))
    }
}

/// A running committer task.
pub struct Committer<S> {
    handle: JoinHandle<Result<(S, CommitStats)>>,
}

impl<S: ListingStore + 'static> Committer<S> {
    /// Move `store` onto a blocking task and start reconciling.
    pub fn spawn(store: S, capacity: usize) -> (Self, CommitSender) {
        let (tx, mut rx) = mpsc::channel::<Observation>(capacity.max(1));

        let handle = tokio::task::spawn_blocking(move || {
            let mut stats = CommitStats::default();
            while let Some(observation) = rx.blocking_recv() {
                match reconcile(&store, &observation, Utc::now()) {
                    Ok(outcome) => tally(&mut stats, outcome),
                    Err(e) => {
                        log::error!(
                            "Commit failed for listing {}: {}",
                            observation.item_id(),
                            e
                        );
                        return Err(e);
                    }
                }
            }
            Ok((store, stats))
        });

        (Self { handle }, CommitSender { tx })
    }

    /// Wait for every queued observation to be committed.
    ///
    /// All senders must be dropped first or this never returns.
    pub async fn finish(self) -> Result<(S, CommitStats)> {
        self.handle
            .await
            .map_err(|e| AppError::committer(format!("task failed: {e}")))?
    }
}

fn tally(stats: &mut CommitStats, outcome: Outcome) {
    match outcome {
        Outcome::Inserted => stats.inserted += 1,
        Outcome::Updated => stats.updated += 1,
        Outcome::Unchanged => stats.unchanged += 1,
        Outcome::Expired => stats.expired += 1,
        Outcome::Confirmed => stats.confirmed += 1,
        Outcome::Rejected => stats.rejected += 1,
        Outcome::Skipped => stats.skipped += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::listing::fixtures::observed;
    use crate::storage::SqliteStore;
    use crate::storage::testing::BrokenStore;

    fn listing(item_id: &str, price: i64) -> Observation {
        Observation::Listing(Box::new(observed(item_id, price, "2026-01-10 09:30")))
    }

    #[tokio::test]
    async fn test_commits_in_order() {
        let (committer, sender) = Committer::spawn(SqliteStore::in_memory().unwrap(), 2);

        for obs in [
            listing("1", 800),
            listing("2", 900),
            listing("1", 750),
            listing("1", 750),
            listing("3", -1),
        ] {
            sender.send(obs).await.unwrap();
        }
        drop(sender);

        let (store, stats) = committer.finish().await.unwrap();
        assert_eq!(
            stats,
            CommitStats {
                inserted: 2,
                updated: 1,
                unchanged: 1,
                rejected: 1,
                ..CommitStats::default()
            }
        );
        assert_eq!(store.find_by_item_id("1").unwrap().unwrap().current_price, 750);
    }

    #[tokio::test]
    async fn test_persistence_failure_stops_committer() {
        let store = BrokenStore(SqliteStore::in_memory().unwrap());
        let (committer, sender) = Committer::spawn(store, 1);

        sender.send(listing("1", 800)).await.unwrap();

        // Once the task has stopped, further sends fail.
        let mut closed = false;
        for i in 0..100 {
            if sender.send(listing(&format!("x{i}"), 800)).await.is_err() {
                closed = true;
                break;
            }
        }
        drop(sender);

        assert!(closed);
        let err = committer.finish().await.err().unwrap();
        assert!(err.is_persistence());
    }
}
