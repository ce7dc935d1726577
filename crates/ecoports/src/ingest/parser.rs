//! Metric extraction from report text.
//!
//! Reports arrive as free-form prose; the parser looks for labeled readings
//! such as `Air Quality: 42.5` and keeps the first occurrence of each metric.
//! Metrics that never appear are left untouched rather than zeroed.

use regex::Regex;

use crate::ports::domain::Port;

/// Compiled patterns for the four tracked metrics.
#[derive(Debug)]
pub struct MetricParser {
    air_quality: Regex,
    water_quality: Regex,
    co2_emissions: Regex,
    incidents: Regex,
}

impl MetricParser {
    pub fn new() -> Self {
        Self {
            air_quality: Regex::new(r"(?i)air\s*quality[:\s]*(\d+\.?\d*)")
                .expect("air quality pattern compiles"),
            water_quality: Regex::new(r"(?i)water\s*quality[:\s]*(\d+\.?\d*)")
                .expect("water quality pattern compiles"),
            co2_emissions: Regex::new(r"(?i)co2\s*emissions?[:\s]*(\d+\.?\d*)")
                .expect("co2 emissions pattern compiles"),
            incidents: Regex::new(r"(?i)incidents?[:\s]*(\d+)")
                .expect("incidents pattern compiles"),
        }
    }

    /// Scans the text for metric readings. Fails only when no pattern
    /// matches at all; a partial set of readings is a normal outcome.
    pub fn parse(&self, text: &str) -> Result<MetricUpdate, NoMatchingData> {
        let update = MetricUpdate {
            air_quality: capture_f64(&self.air_quality, text),
            water_quality: capture_f64(&self.water_quality, text),
            co2_emissions: capture_f64(&self.co2_emissions, text),
            incidents: capture_u32(&self.incidents, text),
        };

        if update.is_empty() {
            Err(NoMatchingData)
        } else {
            Ok(update)
        }
    }
}

impl Default for MetricParser {
    fn default() -> Self {
        Self::new()
    }
}

fn capture_f64(pattern: &Regex, text: &str) -> Option<f64> {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|group| group.as_str().parse().ok())
}

fn capture_u32(pattern: &Regex, text: &str) -> Option<u32> {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        // The group is all digits, so the only way parsing fails is
        // overflow; an absurd reading still counts as a match.
        .map(|group| group.as_str().parse().unwrap_or(u32::MAX))
}

/// Parsed readings. Absent fields keep their stored value when applied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricUpdate {
    pub air_quality: Option<f64>,
    pub water_quality: Option<f64>,
    pub co2_emissions: Option<f64>,
    pub incidents: Option<u32>,
}

impl MetricUpdate {
    pub fn is_empty(&self) -> bool {
        self.air_quality.is_none()
            && self.water_quality.is_none()
            && self.co2_emissions.is_none()
            && self.incidents.is_none()
    }

    /// Names of the metrics present, in canonical field order.
    pub fn updated_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.air_quality.is_some() {
            fields.push("air_quality");
        }
        if self.water_quality.is_some() {
            fields.push("water_quality");
        }
        if self.co2_emissions.is_some() {
            fields.push("co2_emissions");
        }
        if self.incidents.is_some() {
            fields.push("incidents");
        }
        fields
    }

    /// Writes the present readings onto the stored record.
    pub fn apply_to(&self, port: &mut Port) {
        if let Some(value) = self.air_quality {
            port.air_quality = value;
        }
        if let Some(value) = self.water_quality {
            port.water_quality = value;
        }
        if let Some(value) = self.co2_emissions {
            port.co2_emissions = value;
        }
        if let Some(value) = self.incidents {
            port.incidents = value;
        }
    }
}

/// No recognizable metric appeared anywhere in the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no matching data found in report text")]
pub struct NoMatchingData;
