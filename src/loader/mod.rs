pub use source::{HttpSource, RangeSource, SourceError};
pub use updater::{next_refresh_delay, RangeUpdater};

mod source;
mod updater;

use crate::clock::{Clock, SystemClock};
use crate::dataset;
use crate::store::{IntervalStore, StoreError};

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(r#"Error while downloading ranges: {0}"#)]
    Source(#[from] SourceError),
    #[error("Error while unpacking downloaded ranges: {0}")]
    Unpack(#[source] std::io::Error),
    #[error("Downloaded dataset holds no valid ranges, all {skipped} records were skipped")]
    NoValidRecords { skipped: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Refresh task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The store was already refreshed today
    Skipped,
    Replaced { loaded: usize, skipped: usize },
}

/// Keeps the interval store current by replacing its contents from a [RangeSource]
pub struct RangeLoader<S, C = SystemClock> {
    store: Arc<IntervalStore>,
    source: S,
    clock: C,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl<S, C> RangeLoader<S, C>
where
    S: RangeSource,
    C: Clock,
{
    pub fn new(store: Arc<IntervalStore>, source: S, clock: C) -> Self {
        Self {
            store,
            source,
            clock,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<IntervalStore> {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Download and swap in a new interval set unless it was already done today (UTC).
    ///
    /// On error the store keeps its previous contents and marker, so the next call starts over.
    pub async fn refresh_if_stale(&self) -> Result<RefreshOutcome, LoaderError> {
        let _guard = self.refresh_lock.lock().await;

        let today = self.clock.today();
        if self.store.last_refreshed() == Some(today) {
            log::info!("Ranges are up to date, skipping refresh");
            return Ok(RefreshOutcome::Skipped);
        }

        log::info!(r#"Downloading ranges from "{}""#, self.source);
        let body = self.source.fetch().await?;

        let store = self.store.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<_, LoaderError> {
            let decoded = dataset::decode_gzip(body.as_ref()).map_err(LoaderError::Unpack)?;
            for skipped in &decoded.skipped {
                log::warn!("{skipped}");
            }
            if decoded.intervals.is_empty() {
                if !decoded.skipped.is_empty() {
                    return Err(LoaderError::NoValidRecords {
                        skipped: decoded.skipped.len(),
                    });
                }
                log::warn!("Downloaded dataset is empty");
            }
            let outcome = RefreshOutcome::Replaced {
                loaded: decoded.intervals.len(),
                skipped: decoded.skipped.len(),
            };
            store.replace_and_mark(decoded.intervals, today)?;
            Ok(outcome)
        })
        .await??;

        if let RefreshOutcome::Replaced { loaded, skipped } = outcome {
            log::info!(
                r#"Ranges updated from "{}": {loaded} loaded, {skipped} skipped"#,
                self.source
            );
        }
        Ok(outcome)
    }
}
