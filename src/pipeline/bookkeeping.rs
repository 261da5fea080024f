// src/pipeline/bookkeeping.rs

//! Run bookkeeping: what a run reads before crawling and writes after.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{Config, ExpiryCandidate, ExpirySignal, KnownItems, Observation};
use crate::pipeline::commit::CommitSender;
use crate::services::{DetailPage, Fetcher, fetch_detail};
use crate::storage::ListingStore;

/// State loaded from the store at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub started_at: DateTime<Utc>,
    /// Timestamp of the previous run
    pub watermark: DateTime<Utc>,
    pub known: KnownItems,
    pub candidates: Vec<ExpiryCandidate>,
}

impl RunContext {
    pub fn load<S: ListingStore>(store: &S, config: &Config, now: DateTime<Utc>) -> Result<Self> {
        let watermark = store.read_watermark()?;
        let known = store.known_items()?;
        let cutoff = now - TimeDelta::days(i64::from(config.expiry.recheck_after_days));
        let candidates = store.due_for_expiration(cutoff)?;

        log::info!("Timestamp of last run: {}", watermark.format("%Y-%m-%d %H:%M:%S"));
        log::debug!("Got {} known items", known.len());
        if !candidates.is_empty() {
            log::info!("Got {} items due for expiration", candidates.len());
        }

        Ok(Self {
            started_at: now,
            watermark,
            known,
            candidates,
        })
    }
}

/// Re-fetch every expiry candidate and report what was found.
///
/// Returns the number of candidates that produced an observation; fetch
/// failures leave the candidate queued for the next run.
pub async fn recheck_expiry(
    candidates: Vec<ExpiryCandidate>,
    fetcher: &dyn Fetcher,
    config: &Config,
    commits: &CommitSender,
) -> Result<usize> {
    let delay = Duration::from_millis(config.crawler.request_delay_ms);
    let concurrency = config.crawler.max_concurrent.max(1);

    let mut checks = stream::iter(candidates)
        .map(|candidate| async move {
            let result = fetch_detail(
                fetcher,
                &candidate.url,
                &config.site,
                config.crawler.max_redirects,
            )
            .await;
            (candidate, result)
        })
        .buffer_unordered(concurrency);

    let mut checked = 0;
    while let Some((candidate, result)) = checks.next().await {
        let observation = match result {
            Ok(DetailPage::Gone { .. }) => Observation::Expired(ExpirySignal {
                item_id: candidate.item_id,
                row_id: Some(candidate.row_id),
                url: candidate.url,
                expiry_date: Utc::now().date_naive(),
            }),
            Ok(DetailPage::Live { .. }) => Observation::StillListed {
                row_id: candidate.row_id,
                item_id: candidate.item_id,
            },
            Err(e) => {
                log::warn!(
                    "Expiry check failed for {} ({}): {}",
                    candidate.item_id,
                    candidate.url,
                    e
                );
                continue;
            }
        };

        commits.send(observation).await?;
        checked += 1;

        if delay.as_millis() > 0 {
            tokio::time::sleep(delay).await;
        }
    }

    Ok(checked)
}

/// Advance the watermark at the end of a drained run.
///
/// `retry_from` is the oldest index date of a detail page that failed; the
/// watermark stops there so the next walk reaches that entry again. Never
/// moves backwards.
pub fn finish_run<S: ListingStore>(
    store: &S,
    context: &RunContext,
    now: DateTime<Utc>,
    retry_from: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>> {
    let end = retry_from.map_or(now, |at| at.min(now));
    let at = end.max(context.watermark);
    store.write_watermark(at)?;
    Ok(at)
}

/// Move the watermark back by `hours` so the next run re-examines that window.
pub fn rewind<S: ListingStore>(store: &S, hours: u32) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let old = store.read_watermark()?;
    let new = (old - TimeDelta::hours(i64::from(hours))).max(DateTime::UNIX_EPOCH);
    store.write_watermark(new)?;
    log::info!(
        "Rewound watermark from {} to {}",
        old.format("%Y-%m-%d %H:%M:%S"),
        new.format("%Y-%m-%d %H:%M:%S")
    );
    Ok((old, new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::listing::fixtures::observed;
    use crate::pipeline::commit::Committer;
    use crate::pipeline::reconcile::{new_record, reconcile};
    use crate::services::fixtures::StaticFetcher;
    use crate::storage::SqliteStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.crawler.request_delay_ms = 0;
        config
    }

    fn seed(store: &SqliteStore, item_id: &str, checked_days_ago: i64) -> i64 {
        let mut listing = observed(item_id, 800, "2026-01-10 09:30");
        listing.url = format!("https://www.willhaben.at/iad/immobilien/d/mietwohnungen/x-{item_id}/");
        store
            .insert(&new_record(&listing, now() - TimeDelta::days(checked_days_ago)))
            .unwrap()
    }

    #[test]
    fn test_load_context() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store, "stale", 40);
        seed(&store, "fresh", 3);

        let context = RunContext::load(&store, &Config::default(), now()).unwrap();
        assert_eq!(context.watermark, DateTime::UNIX_EPOCH);
        assert_eq!(context.known.len(), 2);
        assert_eq!(context.candidates.len(), 1);
        assert_eq!(context.candidates[0].item_id, "stale");
    }

    #[test]
    fn test_watermark_never_moves_back() {
        let store = SqliteStore::in_memory().unwrap();
        let later = now() + TimeDelta::days(1);
        store.write_watermark(later).unwrap();

        let context = RunContext::load(&store, &Config::default(), now()).unwrap();
        assert_eq!(finish_run(&store, &context, now(), None).unwrap(), later);
        assert_eq!(store.read_watermark().unwrap(), later);

        let even_later = later + TimeDelta::hours(2);
        finish_run(&store, &context, even_later, None).unwrap();
        assert_eq!(store.read_watermark().unwrap(), even_later);
    }

    #[test]
    fn test_failed_entry_holds_watermark() {
        let store = SqliteStore::in_memory().unwrap();
        let start = now() - TimeDelta::days(2);
        store.write_watermark(start).unwrap();
        let context = RunContext::load(&store, &Config::default(), now()).unwrap();

        let failed_at = now() - TimeDelta::hours(5);
        assert_eq!(finish_run(&store, &context, now(), Some(failed_at)).unwrap(), failed_at);
        assert_eq!(store.read_watermark().unwrap(), failed_at);

        // Never behind the watermark the run started from.
        let before_start = start - TimeDelta::hours(1);
        assert_eq!(finish_run(&store, &context, now(), Some(before_start)).unwrap(), start);
    }

    #[test]
    fn test_rewind() {
        let store = SqliteStore::in_memory().unwrap();
        store.write_watermark(now()).unwrap();

        let (old, new) = rewind(&store, 3).unwrap();
        assert_eq!(old, now());
        assert_eq!(new, now() - TimeDelta::hours(3));
        assert_eq!(store.read_watermark().unwrap(), new);

        store.write_watermark(DateTime::UNIX_EPOCH).unwrap();
        let (_, clamped) = rewind(&store, 3).unwrap();
        assert_eq!(clamped, DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_recheck_marks_gone_and_confirms_live() {
        let store = SqliteStore::in_memory().unwrap();
        let gone = seed(&store, "gone", 40);
        let live = seed(&store, "live", 40);
        seed(&store, "flaky", 40);

        let context = RunContext::load(&store, &Config::default(), now()).unwrap();
        assert_eq!(context.candidates.len(), 3);

        let fetcher = StaticFetcher::new()
            .redirect(
                "https://www.willhaben.at/iad/immobilien/d/mietwohnungen/x-gone/",
                "https://www.willhaben.at/iad/immobilien/mietwohnungen/",
            )
            .page(
                "https://www.willhaben.at/iad/immobilien/d/mietwohnungen/x-live/",
                "<html></html>",
            );

        let config = quiet_config();
        let (committer, sender) = Committer::spawn(store, 8);
        let checked = recheck_expiry(context.candidates, &fetcher, &config, &sender)
            .await
            .unwrap();
        drop(sender);
        let (store, stats) = committer.finish().await.unwrap();

        assert_eq!(checked, 2);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.confirmed, 1);
        assert!(store.find_by_id(gone).unwrap().unwrap().expiry_date.is_some());

        let live_row = store.find_by_id(live).unwrap().unwrap();
        assert!(live_row.expiry_date.is_none());
        assert!(live_row.expiry_last_check > now() - TimeDelta::days(1));

        let still_due = store.due_for_expiration(now() - TimeDelta::days(31)).unwrap();
        assert_eq!(still_due.len(), 1);
        assert_eq!(still_due[0].item_id, "flaky");

        // A later price observation does not revive the expired row.
        let mut relisted = observed("gone", 650, "2026-03-02 08:00");
        relisted.url = "https://example.test/relisted".into();
        reconcile(&store, &Observation::Listing(Box::new(relisted)), now()).unwrap();
        let row = store.find_by_id(gone).unwrap().unwrap();
        assert!(row.expiry_date.is_some());
        assert_eq!(row.current_price, 800);
    }
}
