//! Expiry-correction logging.
//!
//! Every time a user fixes an extracted expiry date, the correction is
//! recorded together with the raw OCR text that produced the wrong
//! value. The log is the raw material for tuning the extraction
//! heuristics; persistence itself lives behind the [`CorrectionLog`]
//! trait.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum CorrectionError {
    #[error("correction storage failure: {0}")]
    Storage(String),
}

/// One user correction of an extracted expiry date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryCorrection {
    pub batch_id: u64,
    pub original_expiry: NaiveDate,
    pub corrected_expiry: NaiveDate,
    /// The raw OCR text the wrong extraction came from.
    pub raw_ocr_text: String,
    pub recorded_at: DateTime<Utc>,
}

impl ExpiryCorrection {
    pub fn new(
        batch_id: u64,
        original_expiry: NaiveDate,
        corrected_expiry: NaiveDate,
        raw_ocr_text: impl Into<String>,
    ) -> Self {
        Self {
            batch_id,
            original_expiry,
            corrected_expiry,
            raw_ocr_text: raw_ocr_text.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Signed size of the correction in days; positive when the user
    /// pushed the expiry further out.
    pub fn shift_days(&self) -> i64 {
        self.corrected_expiry
            .signed_duration_since(self.original_expiry)
            .num_days()
    }
}

#[async_trait]
pub trait CorrectionLog: Send + Sync {
    async fn record(&self, correction: ExpiryCorrection) -> Result<(), CorrectionError>;
}

/// In-memory correction log for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryCorrectionLog {
    entries: Mutex<Vec<ExpiryCorrection>>,
}

impl InMemoryCorrectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<ExpiryCorrection> {
        self.entries.lock().await.clone()
    }

    /// Mean signed shift across all recorded corrections; `None` when
    /// nothing has been recorded. A consistently positive value means
    /// the extractor is guessing too conservative an expiry.
    pub async fn mean_shift_days(&self) -> Option<f64> {
        let entries = self.entries.lock().await;
        if entries.is_empty() {
            return None;
        }
        let total: i64 = entries.iter().map(ExpiryCorrection::shift_days).sum();
        Some(total as f64 / entries.len() as f64)
    }
}

#[async_trait]
impl CorrectionLog for InMemoryCorrectionLog {
    async fn record(&self, correction: ExpiryCorrection) -> Result<(), CorrectionError> {
        self.entries.lock().await.push(correction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn shift_is_signed() {
        let pushed_out =
            ExpiryCorrection::new(1, date(2030, 1, 1), date(2030, 1, 11), "EXP 01/01/2030");
        assert_eq!(pushed_out.shift_days(), 10);

        let pulled_in =
            ExpiryCorrection::new(2, date(2030, 1, 11), date(2030, 1, 1), "EXP 11/01/2030");
        assert_eq!(pulled_in.shift_days(), -10);
    }

    #[tokio::test]
    async fn log_records_and_averages() {
        let log = InMemoryCorrectionLog::new();
        assert_eq!(log.mean_shift_days().await, None);

        log.record(ExpiryCorrection::new(
            1,
            date(2030, 1, 1),
            date(2030, 1, 5),
            "text",
        ))
        .await
        .unwrap();
        log.record(ExpiryCorrection::new(
            2,
            date(2030, 1, 1),
            date(2030, 1, 11),
            "text",
        ))
        .await
        .unwrap();

        assert_eq!(log.all().await.len(), 2);
        assert_eq!(log.mean_shift_days().await, Some(7.0));
    }
}
