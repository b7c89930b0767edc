use super::{RangeLoader, RangeSource, RefreshOutcome};
use crate::clock::Clock;

use chrono::{DateTime, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Time left until the next `at` o'clock UTC, strictly after `now`
pub fn next_refresh_delay(now: DateTime<Utc>, at: NaiveTime) -> Duration {
    let today_at = now.date_naive().and_time(at).and_utc();
    let next = if today_at > now {
        Some(today_at)
    } else {
        now.date_naive()
            .succ_opt()
            .map(|tomorrow| tomorrow.and_time(at).and_utc())
    };
    next.and_then(|next| (next - now).to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}

/// Background task refreshing the ranges at startup and then daily
pub struct RangeUpdater {
    refresh_at: NaiveTime,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl RangeUpdater {
    pub fn new(refresh_at: NaiveTime) -> Self {
        Self {
            refresh_at,
            handle: None,
        }
    }

    pub fn start<S, C>(
        &mut self,
        loader: Arc<RangeLoader<S, C>>,
    ) -> Option<&tokio::task::JoinHandle<()>>
    where
        S: RangeSource + 'static,
        C: Clock + 'static,
    {
        if self.handle.is_some() {
            return None;
        }

        let refresh_at = self.refresh_at;
        self.handle = tokio::spawn(async move {
            loop {
                match loader.refresh_if_stale().await {
                    Ok(RefreshOutcome::Skipped) => {}
                    Ok(RefreshOutcome::Replaced { .. }) => {
                        let intervals = loader.store().intervals();
                        log::info!(
                            "Serving {} ipv4 and {} ipv6 ranges",
                            intervals.ipv4_len(),
                            intervals.ipv6_len()
                        );
                    }
                    Err(err) => {
                        log::error!("Error while refreshing ranges: {err}");
                    }
                }
                let delay = next_refresh_delay(loader.clock().now(), refresh_at);
                log::debug!("Next ranges refresh in {delay:?}");
                tokio::time::sleep(delay).await;
            }
        })
        .into();
        self.handle.as_ref()
    }
}

impl Drop for RangeUpdater {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveTime {
        s.parse().unwrap()
    }

    fn now(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn later_today() {
        assert_eq!(
            next_refresh_delay(now("2024-05-01T00:00:00Z"), at("00:30:00")),
            Duration::from_secs(30 * 60)
        );
    }

    #[test]
    fn tomorrow() {
        assert_eq!(
            next_refresh_delay(now("2024-05-01T00:30:00Z"), at("00:30:00")),
            Duration::from_secs(24 * 60 * 60)
        );
        assert_eq!(
            next_refresh_delay(now("2024-05-01T23:00:00Z"), at("00:30:00")),
            Duration::from_secs(90 * 60)
        );
    }

    #[test]
    fn across_month_end() {
        assert_eq!(
            next_refresh_delay(now("2024-02-29T12:00:00Z"), at("06:00:00")),
            Duration::from_secs(18 * 60 * 60)
        );
    }

    #[test]
    fn local_offset_is_ignored() {
        // 01:00+02:00 is 23:00 UTC the day before
        assert_eq!(
            next_refresh_delay(now("2024-05-02T01:00:00+02:00"), at("00:30:00")),
            Duration::from_secs(90 * 60)
        );
    }
}
