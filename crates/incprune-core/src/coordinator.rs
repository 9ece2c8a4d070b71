//! Parallel scan coordination.
//!
//! One task per file, gated by a semaphore so at most `max_concurrent`
//! analyses run at once. Every task is joined before returning, and results
//! come back sorted by path regardless of completion order.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::scanner::{scan_file, AnalysisOracle, ScanParams};

/// Candidate line numbers found in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub path: PathBuf,
    pub lines: BTreeSet<usize>,
}

/// Scan every file concurrently with at most `max_concurrent` in flight.
///
/// A scan that fails or panics contributes an empty set for its file.
#[instrument(skip(oracle, files, params), fields(files = files.len()))]
pub async fn scan_all<O>(
    oracle: Arc<O>,
    files: Vec<PathBuf>,
    params: Arc<ScanParams>,
    max_concurrent: usize,
) -> Vec<ScanResult>
where
    O: AnalysisOracle + ?Sized + 'static,
{
    let sem = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = Vec::with_capacity(files.len());

    for path in files {
        let oracle = Arc::clone(&oracle);
        let params = Arc::clone(&params);
        let sem = Arc::clone(&sem);
        let task_path = path.clone();

        let task = tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            info!(file = %task_path.display(), "Scanning");
            scan_file(oracle.as_ref(), &task_path, &params).await
        });
        tasks.push((path, task));
    }

    let (paths, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let joined = join_all(handles).await;

    let mut results: Vec<ScanResult> = paths
        .into_iter()
        .zip(joined)
        .map(|(path, outcome)| {
            let lines = match outcome {
                Ok(lines) => lines,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "scan task aborted");
                    BTreeSet::new()
                }
            };
            ScanResult { path, lines }
        })
        .collect();

    results.sort_by(|a, b| a.path.cmp(&b.path));
    results
}
