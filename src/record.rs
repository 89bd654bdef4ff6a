//! The pipeline's record type and its wire format.
//!
//! Messages on the broker are comma-joined five-field strings
//! (`country,region,year,life_expectancy,gdp_per_capita`) with no structured
//! encoding. Numeric fields keep their source text verbatim so that output
//! rows match the input byte for byte.

use crate::config::Thresholds;
use crate::error::RecordError;

/// Number of fields in a wire message.
pub const FIELD_COUNT: usize = 5;

/// A numeric CSV field that keeps its source text verbatim alongside the
/// parsed value. The text is what gets re-emitted; the value drives the
/// filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericField {
    raw: String,
    value: f64,
}

impl NumericField {
    /// Parse a field, trimming surrounding whitespace.
    pub fn parse(field: &str, raw: &str) -> Result<Self, RecordError> {
        let trimmed = raw.trim();
        let value = trimmed
            .parse::<f64>()
            .map_err(|_| RecordError::InvalidNumber {
                field: field.to_string(),
                raw: raw.to_string(),
            })?;
        Ok(Self {
            raw: trimmed.to_string(),
            value,
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// One life-expectancy record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub country: String,
    pub region: String,
    pub year: String,
    pub life_expectancy: NumericField,
    pub gdp_per_capita: NumericField,
}

impl Record {
    /// Build a record from five textual fields, validating the numeric ones.
    pub fn from_fields(
        country: &str,
        region: &str,
        year: &str,
        life_expectancy: &str,
        gdp_per_capita: &str,
    ) -> Result<Self, RecordError> {
        Ok(Self {
            country: country.trim().to_string(),
            region: region.trim().to_string(),
            year: year.trim().to_string(),
            life_expectancy: NumericField::parse("life_expectancy", life_expectancy)?,
            gdp_per_capita: NumericField::parse("gdp_per_capita", gdp_per_capita)?,
        })
    }

    /// Decode a wire message body.
    pub fn decode(body: &[u8]) -> Result<Self, RecordError> {
        let line = std::str::from_utf8(body).map_err(|_| RecordError::InvalidUtf8)?;
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != FIELD_COUNT {
            return Err(RecordError::FieldCount {
                expected: FIELD_COUNT,
                found: fields.len(),
            });
        }
        Self::from_fields(fields[0], fields[1], fields[2], fields[3], fields[4])
    }

    /// Encode to the wire format: a comma-joined five-field line.
    pub fn encode(&self) -> String {
        [
            self.country.as_str(),
            self.region.as_str(),
            self.year.as_str(),
            self.life_expectancy.as_str(),
            self.gdp_per_capita.as_str(),
        ]
        .join(",")
    }

    /// The durable queue this record routes to.
    pub fn queue_name(&self) -> String {
        queue_name(&self.region)
    }

    /// Filter predicate: both numeric fields strictly above their thresholds.
    /// Pure function of the two values; deterministic under re-evaluation.
    pub fn passes(&self, thresholds: &Thresholds) -> bool {
        self.life_expectancy.value() > thresholds.life_expectancy
            && self.gdp_per_capita.value() > thresholds.gdp_per_capita
    }
}

/// Queue name for a region: `queue_<region>` with spaces replaced by
/// underscores.
pub fn queue_name(region: &str) -> String {
    format!("queue_{}", region.replace(' ', "_"))
}

// ── Tests ───────────────────────────────────────────────────────────
