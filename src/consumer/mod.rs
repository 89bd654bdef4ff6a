//! Consumer side: region discovery and the supervised worker pool.

pub mod worker;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::broker::Broker;
use crate::config::ConsumerConfig;
use crate::error::{Error, SourceError};

pub use worker::{RegionWorker, WorkerSummary};

/// Distinct regions in the intermediate record set, sorted for
/// deterministic worker startup.
pub fn discover_regions(path: &Path) -> Result<Vec<String>, SourceError> {
    if !path.exists() {
        return Err(SourceError::IntermediateMissing(
            path.display().to_string(),
        ));
    }
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut regions = BTreeSet::new();
    for row in reader.records() {
        let row = row?;
        if let Some(region) = row.get(1) {
            let region = region.trim();
            if !region.is_empty() {
                regions.insert(region.to_string());
            }
        }
    }
    Ok(regions.into_iter().collect())
}

/// Run one worker per discovered region and wait for all of them.
///
/// The pool is sized to the region cardinality. Workers are supervised:
/// a single worker failing (or panicking) is logged with its region and
/// does not affect the others.
pub async fn run_workers(
    broker: Arc<dyn Broker>,
    config: &ConsumerConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<WorkerSummary>, Error> {
    let regions = discover_regions(&config.intermediate_path)?;
    tracing::info!(regions = regions.len(), "Starting region workers");

    let mut pool = JoinSet::new();
    for region in regions {
        let worker = RegionWorker::new(
            Arc::clone(&broker),
            &region,
            &config.output_dir,
            config.thresholds,
            shutdown.clone(),
        );
        pool.spawn(async move { (region, worker.run().await) });
    }

    let mut summaries = Vec::new();
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok((region, Ok(summary))) => {
                tracing::info!(
                    region = %region,
                    received = summary.received,
                    matched = summary.matched,
                    dropped = summary.dropped,
                    "Region worker finished"
                );
                summaries.push(summary);
            }
            Ok((region, Err(e))) => {
                tracing::error!(region = %region, error = %e, "Region worker failed");
            }
            Err(e) => {
                tracing::error!(error = %e, "Region worker panicked");
            }
        }
    }
    Ok(summaries)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_regions_dedups_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intermediate_file.csv");
        std::fs::write(
            &path,
            "Country,Region,Year,Life Expectancy,GDP Per Capita\n\
             France,Europe,2019,82.5,40000.0\n\
             Chad,Africa,2019,54.1,700.0\n\
             Spain,Europe,2019,83.2,29000.0\n",
        )
        .unwrap();

        let regions = discover_regions(&path).unwrap();
        assert_eq!(regions, vec!["Africa".to_string(), "Europe".to_string()]);
    }

    #[test]
    fn discover_regions_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_regions(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, SourceError::IntermediateMissing(_)));
    }

    #[test]
    fn discover_regions_empty_file_yields_no_regions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intermediate_file.csv");
        std::fs::write(
            &path,
            "Country,Region,Year,Life Expectancy,GDP Per Capita\n",
        )
        .unwrap();
        assert!(discover_regions(&path).unwrap().is_empty());
    }
}
