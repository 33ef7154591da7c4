// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wall-clock timestamps in `{secondsPastEpoch, nanoseconds, userTag}` form.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Point in time attached to every attribute and status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeStamp {
    pub seconds_past_epoch: u64,
    pub nanoseconds: u32,
    pub user_tag: u32,
}

impl TimeStamp {
    pub fn new(seconds_past_epoch: u64, nanoseconds: u32, user_tag: u32) -> Self {
        Self {
            seconds_past_epoch,
            nanoseconds: nanoseconds.min(NANOS_PER_SEC - 1),
            user_tag,
        }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::new(now.as_secs(), now.subsec_nanos(), 0)
    }

    /// Convert seconds since the epoch, truncating the fractional part to
    /// whole nanoseconds. Negative inputs clamp to the epoch.
    pub fn from_time(seconds: f64) -> Self {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Self::default();
        }
        let whole = seconds.trunc() as u64;
        let nanos = ((seconds % 1.0) / 1e-9) as u32;
        Self::new(whole, nanos, 0)
    }

    /// Seconds since the epoch as a float.
    pub fn to_time(&self) -> f64 {
        self.seconds_past_epoch as f64 + f64::from(self.nanoseconds) * 1e-9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_time_truncates() {
        let ts = TimeStamp::from_time(1437663079.853469);
        assert_eq!(ts.seconds_past_epoch, 1437663079);
        assert_eq!(ts.nanoseconds, 853468894);
        assert_eq!(ts.user_tag, 0);

        let ts = TimeStamp::from_time(1437663842.11881113);
        assert_eq!(ts.seconds_past_epoch, 1437663842);
        assert_eq!(ts.nanoseconds, 118811130);
    }

    #[test]
    fn test_to_time() {
        let ts = TimeStamp::new(12, 500_000_000, 0);
        assert!((ts.to_time() - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_negative_clamps() {
        assert_eq!(TimeStamp::from_time(-3.5), TimeStamp::default());
        assert_eq!(TimeStamp::from_time(f64::NAN), TimeStamp::default());
    }

    #[test]
    fn test_now_is_recent() {
        let ts = TimeStamp::now();
        assert!(ts.seconds_past_epoch > 1_600_000_000);
        assert!(ts.nanoseconds < NANOS_PER_SEC);
    }

    #[test]
    fn test_wire_field_order() {
        let ts = TimeStamp::new(1437663079, 853468894, 0);
        assert_eq!(
            serde_json::to_string(&ts).unwrap(),
            r#"{"secondsPastEpoch":1437663079,"nanoseconds":853468894,"userTag":0}"#
        );
    }
}
