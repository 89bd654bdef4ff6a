//! Producer / router: reads the source dataset, writes the normalized
//! intermediate record set, and publishes each record to its region queue.

use std::sync::Arc;

use crate::broker::Broker;
use crate::config::ProducerConfig;
use crate::error::{Error, SourceError};
use crate::record::Record;

/// Header of the intermediate record set.
pub const INTERMEDIATE_HEADER: [&str; 5] =
    ["Country", "Region", "Year", "Life Expectancy", "GDP Per Capita"];

/// Columns the producer requires in the source dataset.
const REQUIRED_COLUMNS: [&str; 5] =
    ["Country", "Region", "Year", "Life_expectancy", "GDP_per_capita"];

/// What a producer run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerReport {
    pub published: usize,
    pub skipped: usize,
}

/// Streams the source CSV into region queues, pacing each publish.
pub struct Producer {
    broker: Arc<dyn Broker>,
    config: ProducerConfig,
}

impl Producer {
    pub fn new(broker: Arc<dyn Broker>, config: ProducerConfig) -> Self {
        Self { broker, config }
    }

    /// Run the producer to completion.
    ///
    /// The five required columns are resolved against the header once, up
    /// front; a missing column is fatal. Individual rows that fail numeric
    /// validation are logged and skipped, never retried.
    pub async fn run(&self) -> Result<ProducerReport, Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.config.input_path)
            .map_err(SourceError::from)?;
        let headers = reader.headers().map_err(SourceError::from)?.clone();
        let columns = resolve_columns(&headers)?;

        let mut writer =
            csv::Writer::from_path(&self.config.intermediate_path).map_err(SourceError::from)?;
        writer
            .write_record(INTERMEDIATE_HEADER)
            .map_err(SourceError::from)?;

        let mut published = 0;
        let mut skipped = 0;

        for (i, result) in reader.records().enumerate() {
            // 1-based for humans, +1 for the header row.
            let row_number = i + 2;
            let row = result.map_err(SourceError::from)?;
            let field = |slot: usize| row.get(columns[slot]).unwrap_or("");

            let record =
                match Record::from_fields(field(0), field(1), field(2), field(3), field(4)) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(row = row_number, error = %e, "Skipping malformed input row");
                        skipped += 1;
                        continue;
                    }
                };

            writer
                .write_record([
                    record.country.as_str(),
                    record.region.as_str(),
                    record.year.as_str(),
                    record.life_expectancy.as_str(),
                    record.gdp_per_capita.as_str(),
                ])
                .map_err(SourceError::from)?;

            let queue = record.queue_name();
            self.broker
                .publish(&queue, record.encode().as_bytes())
                .await?;
            tracing::info!(country = %record.country, queue = %queue, "Sent message");
            published += 1;

            if !self.config.publish_delay.is_zero() {
                tokio::time::sleep(self.config.publish_delay).await;
            }
        }

        writer.flush().map_err(SourceError::Io)?;
        tracing::info!(
            published,
            skipped,
            path = %self.config.intermediate_path.display(),
            "Data written to intermediate file"
        );

        Ok(ProducerReport { published, skipped })
    }
}

/// Map required column names to indexes in the source header.
fn resolve_columns(headers: &csv::StringRecord) -> Result<[usize; 5], SourceError> {
    let mut columns = [0usize; 5];
    for (slot, name) in REQUIRED_COLUMNS.iter().enumerate() {
        match headers.iter().position(|h| h == *name) {
            Some(idx) => columns[slot] = idx,
            None => {
                return Err(SourceError::MissingColumn {
                    column: (*name).to_string(),
                    headers: headers.iter().map(str::to_string).collect(),
                });
            }
        }
    }
    Ok(columns)
}

// ── Tests ───────────────────────────────────────────────────────────
