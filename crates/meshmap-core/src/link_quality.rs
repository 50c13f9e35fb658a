//! Link-quality tiers
//!
//! Raw metrics are on the 0-255 scale of the 802.15.4 link quality
//! indicator. Thread's coarse 0-3 link quality is mapped onto the same scale
//! with [`scale_thread_lq`] so one threshold table covers both sources.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ordinal quality tier, `Poor < Fair < Good < Excellent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl LinkQuality {
    pub fn label(&self) -> &'static str {
        match self {
            LinkQuality::Poor => "Poor",
            LinkQuality::Fair => "Fair",
            LinkQuality::Good => "Good",
            LinkQuality::Excellent => "Excellent",
        }
    }

    /// Number of filled bars out of three
    pub fn bars(&self) -> usize {
        match self {
            LinkQuality::Poor => 0,
            LinkQuality::Fair => 1,
            LinkQuality::Good => 2,
            LinkQuality::Excellent => 3,
        }
    }
}

impl std::fmt::Display for LinkQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("link quality thresholds must be ascending (fair {fair} < good {good} < excellent {excellent})")]
pub struct ThresholdError {
    pub fair: i64,
    pub good: i64,
    pub excellent: i64,
}

/// Lower bounds of each tier above `Poor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_fair")]
    pub fair: i64,
    #[serde(default = "default_good")]
    pub good: i64,
    #[serde(default = "default_excellent")]
    pub excellent: i64,
}

fn default_fair() -> i64 {
    64
}

fn default_good() -> i64 {
    128
}

fn default_excellent() -> i64 {
    192
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fair: default_fair(),
            good: default_good(),
            excellent: default_excellent(),
        }
    }
}

impl Thresholds {
    /// Build a validated table
    pub fn new(fair: i64, good: i64, excellent: i64) -> Result<Self, ThresholdError> {
        let table = Self { fair, good, excellent };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), ThresholdError> {
        if self.fair < self.good && self.good < self.excellent {
            Ok(())
        } else {
            Err(ThresholdError {
                fair: self.fair,
                good: self.good,
                excellent: self.excellent,
            })
        }
    }

    /// Classify a raw metric. A missing metric is `Poor`.
    pub fn classify(&self, metric: Option<i64>) -> LinkQuality {
        match metric {
            None => LinkQuality::Poor,
            Some(m) if m >= self.excellent => LinkQuality::Excellent,
            Some(m) if m >= self.good => LinkQuality::Good,
            Some(m) if m >= self.fair => LinkQuality::Fair,
            Some(_) => LinkQuality::Poor,
        }
    }
}

/// Map Thread link quality 0..=3 onto the 0-255 metric scale
pub fn scale_thread_lq(lq: u8) -> i64 {
    i64::from(lq.min(3)) * 85
}
