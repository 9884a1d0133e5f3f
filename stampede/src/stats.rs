//! Order-insensitive building blocks for the streaming aggregator: a
//! numerically stable running-stats accumulator, a bounded latency histogram
//! and run-length status-code compression.

/// Running count/sum/sum-of-squares/min/max accumulator.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RunningStats {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn update(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
        if v < self.min || self.count == 1 {
            self.min = v;
        }
        if v > self.max || self.count == 1 {
            self.max = v;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    pub fn stddev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let div = (self.count * (self.count - 1)) as f64;
        let num = self.count as f64 * self.sum_sq - self.sum * self.sum;
        // Rounding can push `num` slightly negative for constant streams.
        (num / div).max(0.0).sqrt()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Bin {
    /// Weighted mean of the samples merged into this bin.
    pub value: f64,
    pub count: u64,
}

/// Latency histogram with a bounded bin count. Bins stay sorted by value;
/// on overflow the two adjacent bins with the smallest gap are merged into
/// their weighted mean.
#[derive(Debug)]
pub(crate) struct Histogram {
    max_bins: usize,
    bins: Vec<Bin>,
}

impl Histogram {
    pub fn new(max_bins: usize) -> Self {
        Self {
            max_bins,
            bins: Vec::with_capacity(max_bins + 1),
        }
    }

    pub fn insert(&mut self, v: f64) {
        let idx = self.bins.partition_point(|bin| bin.value < v);
        self.bins.insert(idx, Bin { value: v, count: 1 });
        self.trim();
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    fn trim(&mut self) {
        while self.bins.len() > self.max_bins {
            let mut min_delta = f64::MAX;
            let mut min_idx = 1;
            for i in 1..self.bins.len() {
                let delta = self.bins[i].value - self.bins[i - 1].value;
                if delta < min_delta {
                    min_delta = delta;
                    min_idx = i;
                }
            }

            let hi = self.bins.remove(min_idx);
            let lo = &mut self.bins[min_idx - 1];
            let total = lo.count + hi.count;
            lo.value = (lo.value * lo.count as f64 + hi.value * hi.count as f64) / total as f64;
            lo.count = total;
        }
    }
}

/// Collapses consecutive identical status codes into `CODExN` segments:
/// `["200", "200", "200"]` becomes `["200x3"]` while `["200", "500", "200"]`
/// stays three separate segments.
pub(crate) fn merge_codes(codes: &[String]) -> Vec<String> {
    let mut merged = Vec::new();
    let mut last: Option<&str> = None;
    let mut n = 0u64;

    for code in codes {
        match last {
            Some(prev) if prev == code.as_str() => n += 1,
            _ => {
                if let Some(prev) = last {
                    merged.push(format_code(prev, n));
                }
                last = Some(code.as_str());
                n = 1;
            }
        }
    }
    if let Some(prev) = last {
        merged.push(format_code(prev, n));
    }

    merged
}

fn format_code(code: &str, n: u64) -> String {
    if n > 1 {
        format!("{code}x{n}")
    } else {
        code.to_string()
    }
}
