// src/pipeline/crawl.rs

//! One full crawl-and-reconcile run.

use chrono::Utc;
use futures::future::join_all;

use crate::error::Result;
use crate::models::{Config, RunReport};
use crate::pipeline::bookkeeping::{RunContext, finish_run, recheck_expiry};
use crate::pipeline::commit::{Committer, DEFAULT_CAPACITY};
use crate::pipeline::walk::IndexWalker;
use crate::services::{DetailExtractor, Fetcher};
use crate::storage::ListingStore;
use crate::utils::log;

/// Run the crawler against `store`.
///
/// The watermark is only advanced when every observation was committed; on
/// a persistence failure the error is returned and the watermark is left as
/// it was. A failed detail page holds the watermark at its index date. The
/// store is handed back for further use.
pub async fn run_crawler<S: ListingStore + 'static>(
    config: &Config,
    fetcher: &dyn Fetcher,
    store: S,
) -> Result<(S, RunReport)> {
    log::header("Listing crawler starting");

    let extractor = DetailExtractor::from_config(config)?;
    let context = RunContext::load(&store, config, Utc::now())?;

    let (committer, commits) = Committer::spawn(store, DEFAULT_CAPACITY);

    let (expiry_result, walk_results) = {
        let walker = IndexWalker::new(
            config,
            fetcher,
            &extractor,
            context.watermark,
            &context.known,
            commits.clone(),
        );
        let walks = join_all(config.site.categories.iter().map(|c| walker.walk(c)));
        let recheck = recheck_expiry(context.candidates.clone(), fetcher, config, &commits);
        futures::join!(recheck, walks)
    };
    // Close the channel so the committer can drain.
    drop(commits);

    let commit_result = committer.finish().await;

    let (store, commit_stats) = commit_result?;
    let expiry_checked = expiry_result?;
    let categories = walk_results.into_iter().collect::<Result<Vec<_>>>()?;

    let report = RunReport {
        categories,
        commits: commit_stats,
        expiry_checked,
    };

    let watermark = finish_run(&store, &context, Utc::now(), report.retry_from())?;
    log_report(&report);
    log::sub_item(&format!(
        "Watermark advanced to {}",
        watermark.format("%Y-%m-%d %H:%M:%S")
    ));

    Ok((store, report))
}

fn log_report(report: &RunReport) {
    for category in &report.categories {
        let s = &category.stats;
        log::summary(
            &category.label,
            &[
                ("seen", s.seen.to_string()),
                ("crawled", s.crawled.to_string()),
                ("new", s.new.to_string()),
                ("price changed", s.price_changed.to_string()),
                ("pages", s.pages.to_string()),
                ("failed", s.failed.to_string()),
                ("reached last run", s.stopped.to_string()),
            ],
        );
    }

    let c = &report.commits;
    log::summary(
        "Committed",
        &[
            ("inserted", c.inserted.to_string()),
            ("updated", c.updated.to_string()),
            ("unchanged", c.unchanged.to_string()),
            ("expired", c.expired.to_string()),
            ("confirmed", c.confirmed.to_string()),
            ("rejected", c.rejected.to_string()),
            ("skipped", c.skipped.to_string()),
            ("expiry checks", report.expiry_checked.to_string()),
        ],
    );

    let interesting: Vec<_> = report.interesting().collect();
    if !interesting.is_empty() {
        log::separator();
        ::log::info!("Found {} new interesting items:", interesting.len());
        for item in interesting {
            log::sub_item(&format!(
                "{} > [{}EUR / {} m² / #{}] {}",
                item.title, item.price, item.size, item.room_count, item.url
            ));
        }
    }
}
