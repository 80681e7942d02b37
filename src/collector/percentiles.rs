use hdrhistogram::Histogram;

/// Duration percentiles for one (action, thread) series, in milliseconds.
/// Built from a microsecond HdrHistogram.
#[derive(Debug, Clone)]
pub struct PercentileSet {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub count: u64,
}

fn ms(us: u64) -> f64 {
    us as f64 / 1_000.0
}

impl PercentileSet {
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            p50_ms: ms(hist.value_at_percentile(50.0)),
            p95_ms: ms(hist.value_at_percentile(95.0)),
            max_ms: ms(hist.max()),
            count: hist.len(),
        }
    }

    pub fn empty() -> Self {
        Self {
            p50_ms: 0.0,
            p95_ms: 0.0,
            max_ms: 0.0,
            count: 0,
        }
    }
}
