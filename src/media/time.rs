use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Nanosecond timescale used by the host clock
pub const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// A point on a media timeline, expressed as `value / timescale` seconds
///
/// Comparison is by the represented instant, so `1/2` and `2/4` are equal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "RawTimestamp")]
pub struct Timestamp {
    value: i64,
    timescale: u32,
}

/// Serialized form, normalized through `Timestamp::new` on the way in
#[derive(Deserialize)]
struct RawTimestamp {
    value: i64,
    timescale: u32,
}

impl From<RawTimestamp> for Timestamp {
    fn from(raw: RawTimestamp) -> Self {
        Timestamp::new(raw.value, raw.timescale)
    }
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        value: 0,
        timescale: 1,
    };

    /// Create a timestamp. A timescale of 0 is treated as 1.
    pub const fn new(value: i64, timescale: u32) -> Self {
        let timescale = if timescale == 0 { 1 } else { timescale };
        Self { value, timescale }
    }

    pub fn from_duration(duration: Duration) -> Self {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Self::new(nanos, NANOS_PER_SECOND)
    }

    pub fn from_millis(millis: i64) -> Self {
        Self::new(millis, 1000)
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Self::new(seconds, 1)
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    pub fn as_seconds_f64(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Distance from zero. Negative timestamps saturate to zero.
    pub fn as_duration(&self) -> Duration {
        if self.value <= 0 {
            return Duration::ZERO;
        }
        let nanos = self.value as i128 * NANOS_PER_SECOND as i128 / self.timescale as i128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    fn cross(&self, other: &Self) -> (i128, i128) {
        (
            self.value as i128 * other.timescale as i128,
            other.value as i128 * self.timescale as i128,
        )
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        let (lhs, rhs) = self.cross(other);
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_seconds_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_across_timescales() {
        assert_eq!(Timestamp::new(1, 2), Timestamp::new(2, 4));
        assert_eq!(Timestamp::from_seconds(3), Timestamp::from_millis(3000));
    }

    #[test]
    fn test_ordering_across_timescales() {
        assert!(Timestamp::new(1, 3) < Timestamp::new(34, 100));
        assert!(Timestamp::from_millis(999) < Timestamp::from_seconds(1));
        assert!(Timestamp::new(-1, 1) < Timestamp::ZERO);
    }

    #[test]
    fn test_zero_timescale_is_normalized() {
        let ts = Timestamp::new(5, 0);
        assert_eq!(ts.timescale(), 1);
        assert_eq!(ts, Timestamp::from_seconds(5));
    }

    #[test]
    fn test_duration_conversion() {
        let ts = Timestamp::from_duration(Duration::from_millis(1500));
        assert_eq!(ts.timescale(), NANOS_PER_SECOND);
        assert_eq!(ts.as_duration(), Duration::from_millis(1500));
        assert_eq!(Timestamp::new(-10, 1).as_duration(), Duration::ZERO);
    }

    #[test]
    fn test_deserialize_normalizes_zero_timescale() {
        let ts: Timestamp = serde_json::from_str(r#"{"value":5,"timescale":0}"#).unwrap();
        assert_eq!(ts.timescale(), 1);
        assert_eq!(ts, Timestamp::from_seconds(5));
        assert_ne!(ts, Timestamp::new(7, 0));
        assert_eq!(ts.as_duration(), Duration::from_secs(5));

        let json = serde_json::to_string(&Timestamp::from_millis(250)).unwrap();
        assert_eq!(json, r#"{"value":250,"timescale":1000}"#);
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(), 250);
        assert_eq!(back.timescale(), 1000);
    }
}
