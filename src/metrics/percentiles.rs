use std::fmt;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// 50th/90th/99th percentile latency for one API call dimension.
/// Each field is set independently; unset fields stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencyDistribution {
    pub perc50: Duration,
    pub perc90: Duration,
    pub perc99: Duration,
}

impl LatencyDistribution {
    /// Read the three percentiles from a histogram of microsecond values.
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::default();
        }

        Self {
            perc50: Duration::from_micros(hist.value_at_quantile(0.50)),
            perc90: Duration::from_micros(hist.value_at_quantile(0.90)),
            perc99: Duration::from_micros(hist.value_at_quantile(0.99)),
        }
    }

    /// Set the percentile matching `quantile`. Returns false, leaving the
    /// distribution untouched, for any quantile other than 0.5/0.9/0.99.
    pub fn set_quantile(&mut self, quantile: f64, latency: Duration) -> bool {
        let slot = if quantile == 0.50 {
            &mut self.perc50
        } else if quantile == 0.90 {
            &mut self.perc90
        } else if quantile == 0.99 {
            &mut self.perc99
        } else {
            return false;
        };
        *slot = latency;
        true
    }

    /// Convenience: has any percentile been populated?
    pub fn has_data(&self) -> bool {
        !(self.perc50.is_zero() && self.perc90.is_zero() && self.perc99.is_zero())
    }
}

impl fmt::Display for LatencyDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "perc50: {:?}, perc90: {:?}, perc99: {:?}",
            self.perc50, self.perc90, self.perc99
        )
    }
}

/// Fractional milliseconds, keeping sub-millisecond precision.
pub fn as_millis_f64(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_quantile_is_ignored() {
        let mut dist = LatencyDistribution::default();
        assert!(!dist.set_quantile(0.95, Duration::from_secs(1)));
        assert!(!dist.has_data());
    }

    #[test]
    fn empty_histogram_is_zeroed() {
        let hist = Histogram::<u64>::new(3).unwrap();
        assert_eq!(LatencyDistribution::from_histogram(&hist), LatencyDistribution::default());
    }

    #[test]
    fn millis_keep_fraction() {
        assert_eq!(as_millis_f64(Duration::from_micros(1_500)), 1.5);
    }
}
