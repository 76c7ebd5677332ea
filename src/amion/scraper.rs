use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::fetcher::{FetchError, HttpFetcher};
use crate::html::extractor::{self, RawShift, SelectorConfig};
use crate::rate_limiter::RateLimiter;
use crate::validation::ValidationResult;
use crate::worker_pool::{PoolError, WorkerPool};

/// A month as (year, 1-indexed month).
pub type YearMonth = (i32, u32);

/// The six failure categories a single month's scrape job can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapingErrorKind {
    Http,
    Network,
    Parse,
    Retry,
    Queue,
    Unknown,
}

impl From<&FetchError> for ScrapingErrorKind {
    fn from(e: &FetchError) -> Self {
        match e {
            FetchError::Http { .. } => ScrapingErrorKind::Http,
            FetchError::Network(_) | FetchError::UrlParse(_) => ScrapingErrorKind::Network,
            FetchError::Retry { .. } => ScrapingErrorKind::Retry,
            FetchError::Cancelled => ScrapingErrorKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingError {
    pub month: String,
    pub kind: ScrapingErrorKind,
    pub message: String,
}

/// The scraper's output: deterministically ordered by (month, row_index)
/// within the fixed target month list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapedShifts {
    pub shifts: Vec<RawShift>,
    pub errors: Vec<ScrapingError>,
    pub warnings: ValidationResult,
    pub duplicate_count: usize,
    pub months_processed: usize,
    pub months_failed: usize,
}

const QUEUE_FULL_RETRY_DELAY: Duration = Duration::from_millis(50);

fn month_label(ym: YearMonth) -> String {
    format!("{:04}-{:02}", ym.0, ym.1)
}

fn relative_url(base_url: &str, ym: YearMonth) -> String {
    format!("{}/schedule/{}", base_url.trim_end_matches('/'), month_label(ym))
}

/// Enumerates `count` consecutive months starting at `start`, advancing one
/// month at a time with year rollover, skipping any repeat of a month
/// already enumerated.
fn enumerate_months(start: YearMonth, count: usize) -> Vec<YearMonth> {
    let mut months = Vec::with_capacity(count);
    let mut seen = HashSet::new();
    let (mut year, mut month) = start;
    for _ in 0..count {
        if seen.insert((year, month)) {
            months.push((year, month));
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    months
}

enum JobMsg {
    Shifts {
        month: YearMonth,
        shifts: Vec<RawShift>,
        extractor_errors: ValidationResult,
    },
    Error {
        month: YearMonth,
        kind: ScrapingErrorKind,
        message: String,
    },
    Duplicate,
}

/// Builds the per-month job closure: acquire the rate limit, fetch, extract,
/// filter to the month, dedup against the pool's shared seen-set, and
/// publish the outcome on `tx`. Shared by the initial submit and the
/// one-shot queue-full retry, which each need their own fresh job (a `Job`
/// is `FnOnce` and is consumed by the first `submit` attempt).
fn build_job(
    ym: YearMonth,
    url: String,
    fetcher: HttpFetcher,
    limiter: Arc<RateLimiter>,
    selectors: SelectorConfig,
    pool_for_seen: Arc<WorkerPool>,
    tx: mpsc::UnboundedSender<JobMsg>,
) -> crate::worker_pool::Job {
    Box::new(move |job_token| {
        async move {
            limiter.acquire().await;
            if job_token.is_cancelled() {
                let _ = tx.send(JobMsg::Error {
                    month: ym,
                    kind: ScrapingErrorKind::Unknown,
                    message: "cancelled before fetch".to_string(),
                });
                return;
            }

            let body = match fetcher.fetch_text(&url, &job_token).await {
                Ok(body) => body,
                Err(e) => {
                    let kind = ScrapingErrorKind::from(&e);
                    let _ = tx.send(JobMsg::Error {
                        month: ym,
                        kind,
                        message: e.to_string(),
                    });
                    return;
                }
            };

            let document = extractor::parse_document(&body);
            let result = extractor::extract(&document, &selectors);
            let month_prefix = month_label(ym);
            let in_month = extractor::filter_month(result.raw_shifts, &month_prefix);

            let mut surviving = Vec::with_capacity(in_month.len());
            for row in in_month {
                let key = format!("{}|{}", row.date, row.shift_type);
                if pool_for_seen.mark_seen(key).await {
                    surviving.push(row);
                } else {
                    let _ = tx.send(JobMsg::Duplicate);
                }
            }

            let _ = tx.send(JobMsg::Shifts {
                month: ym,
                shifts: surviving,
                extractor_errors: result.errors,
            });
        }
        .boxed()
    })
}

/// Composes the fetcher, worker pool, rate limiter, and HTML extractor to
/// produce a deduplicated, per-month batch of raw shifts: fetch, extract,
/// dedup, accumulate. `pool` doubles as the shared, mutex-guarded seen-set
/// for cross-job dedup.
pub async fn scrape(
    fetcher: HttpFetcher,
    pool: Arc<WorkerPool>,
    limiter: Arc<RateLimiter>,
    selectors: SelectorConfig,
    base_url: &str,
    start: YearMonth,
    month_count: usize,
    token: &CancellationToken,
) -> ScrapedShifts {
    let target_months = enumerate_months(start, month_count.max(1));
    let (tx, mut rx) = mpsc::unbounded_channel::<JobMsg>();

    for &ym in &target_months {
        let url = relative_url(base_url, ym);
        let job = build_job(
            ym,
            url.clone(),
            fetcher.clone(),
            limiter.clone(),
            selectors.clone(),
            pool.clone(),
            tx.clone(),
        );

        match pool.submit(token, job) {
            Ok(()) => {}
            Err(PoolError::QueueFull) => {
                tokio::time::sleep(QUEUE_FULL_RETRY_DELAY).await;
                let retry_job = build_job(
                    ym,
                    url,
                    fetcher.clone(),
                    limiter.clone(),
                    selectors.clone(),
                    pool.clone(),
                    tx.clone(),
                );
                if let Err(_e) = pool.submit(token, retry_job) {
                    tracing::warn!(month = %month_label(ym), "scraper queue full after one retry");
                    let _ = tx.send(JobMsg::Error {
                        month: ym,
                        kind: ScrapingErrorKind::Queue,
                        message: "worker pool queue full after one retry".to_string(),
                    });
                }
            }
            Err(PoolError::PoolClosed) => {
                let _ = tx.send(JobMsg::Error {
                    month: ym,
                    kind: ScrapingErrorKind::Queue,
                    message: "worker pool already closed".to_string(),
                });
            }
        }
    }

    drop(tx);
    let _ = pool.wait(token).await;

    let mut shifts_by_month: HashMap<YearMonth, Vec<RawShift>> = HashMap::new();
    let mut errors = Vec::new();
    let mut warnings = ValidationResult::new();
    let mut duplicate_count = 0usize;
    let mut error_months: HashSet<YearMonth> = HashSet::new();

    while let Some(msg) = rx.recv().await {
        match msg {
            JobMsg::Shifts {
                month,
                shifts,
                extractor_errors,
            } => {
                warnings.merge(&extractor_errors);
                shifts_by_month.entry(month).or_default().extend(shifts);
            }
            JobMsg::Error { month, kind, message } => {
                error_months.insert(month);
                errors.push(ScrapingError {
                    month: month_label(month),
                    kind,
                    message,
                });
            }
            JobMsg::Duplicate => duplicate_count += 1,
        }
    }

    let mut shifts = Vec::new();
    for &ym in &target_months {
        if let Some(mut month_shifts) = shifts_by_month.remove(&ym) {
            month_shifts.sort_by_key(|s| s.row_index);
            shifts.extend(month_shifts);
        }
    }

    let months_failed = error_months.len();
    ScrapedShifts {
        shifts,
        errors,
        warnings,
        duplicate_count,
        months_processed: target_months.len() - months_failed,
        months_failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_months_rolls_year_over() {
        let months = enumerate_months((2025, 11), 4);
        assert_eq!(months, vec![(2025, 11), (2025, 12), (2026, 1), (2026, 2)]);
    }

    #[test]
    fn enumerate_months_skips_repeats() {
        // A degenerate zero-advance wrap (defensive — real callers always
        // advance) still yields each month once.
        let months = enumerate_months((2025, 12), 1);
        assert_eq!(months, vec![(2025, 12)]);
    }

    #[test]
    fn relative_url_uses_year_dash_month() {
        assert_eq!(
            relative_url("https://amion.example", (2025, 11)),
            "https://amion.example/schedule/2025-11"
        );
    }
}
