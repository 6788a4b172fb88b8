use serde::Serialize;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ReadingError {
    #[error("meter value is not a finite number")]
    NotFinite,
    #[error("meter value is negative")]
    Negative,
}

/// A metered energy quantity in whole kWh.
///
/// Rules:
/// - The source value must be finite and non-negative.
/// - Fractional kWh are truncated toward zero, so `42.9` becomes `42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeterReading {
    pub kwh: u64,
}

impl MeterReading {
    pub fn from_power_value(raw: f64) -> Result<Self, ReadingError> {
        if !raw.is_finite() {
            return Err(ReadingError::NotFinite);
        }
        if raw < 0.0 {
            return Err(ReadingError::Negative);
        }
        Ok(Self {
            kwh: raw.trunc() as u64,
        })
    }
}
