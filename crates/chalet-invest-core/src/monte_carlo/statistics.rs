use serde::{Deserialize, Serialize};

/// Percentile summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

/// A single histogram bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

/// Distribution summary of one output metric across the surviving trials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSummary {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: McPercentiles,
    pub skewness: f64,
    pub kurtosis: f64,
    /// Share of trials strictly above zero
    pub probability_positive: f64,
    pub histogram: Vec<HistogramBin>,
}

/// Linear-interpolated percentile of an ascending slice. `p` is 0..=100.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0.0;
    };
    let rank = (p / 100.0).clamp(0.0, 1.0) * last as f64;
    let below = rank.floor() as usize;
    let weight = rank - below as f64;
    match sorted.get(below + 1) {
        Some(&next) if weight > 0.0 => sorted[below] + (next - sorted[below]) * weight,
        _ => sorted[below],
    }
}

impl McPercentiles {
    fn of_sorted(sorted: &[f64]) -> Self {
        let at = |p| percentile_sorted(sorted, p);
        McPercentiles {
            p5: at(5.0),
            p10: at(10.0),
            p25: at(25.0),
            p50: at(50.0),
            p75: at(75.0),
            p90: at(90.0),
            p95: at(95.0),
        }
    }
}

/// Share of values strictly greater than zero.
pub fn probability_positive(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|v| **v > 0.0).count() as f64 / values.len() as f64
}

/// Equal-width histogram over the range of an ascending slice. A flat
/// sample collapses to one bin.
pub fn build_histogram(sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    let (Some(&lo), Some(&hi)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    let bins = if hi - lo > f64::EPSILON { num_bins } else { 1 };
    if bins == 0 {
        return Vec::new();
    }

    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0u32; bins];
    for &v in sorted {
        let slot = if width > 0.0 {
            ((v - lo) / width) as usize
        } else {
            0
        };
        counts[slot.min(bins - 1)] += 1;
    }

    let total = sorted.len() as f64;
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: lo + i as f64 * width,
            upper: if i + 1 == bins { hi } else { lo + (i + 1) as f64 * width },
            count,
            frequency: f64::from(count) / total,
        })
        .collect()
}

/// Descriptive statistics over `values`, which are sorted in place.
/// Non-finite values are dropped first.
pub fn summarize(name: &str, values: &mut Vec<f64>) -> MetricSummary {
    values.retain(|v| v.is_finite());
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    if values.is_empty() {
        return MetricSummary {
            name: name.to_string(),
            count: 0,
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            min: 0.0,
            max: 0.0,
            percentiles: McPercentiles::of_sorted(&[]),
            skewness: 0.0,
            kurtosis: 0.0,
            probability_positive: 0.0,
            histogram: Vec::new(),
        };
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let percentiles = McPercentiles::of_sorted(values);
    let median = percentiles.p50;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    // Population skewness and excess kurtosis
    let (skewness, kurtosis) = if std_dev > f64::EPSILON {
        let m3 = values.iter().map(|v| ((v - mean) / std_dev).powi(3)).sum::<f64>() / n;
        let m4 = values.iter().map(|v| ((v - mean) / std_dev).powi(4)).sum::<f64>() / n;
        (m3, m4 - 3.0)
    } else {
        (0.0, 0.0)
    };

    MetricSummary {
        name: name.to_string(),
        count: values.len(),
        mean,
        median,
        std_dev,
        min: values[0],
        max: values[values.len() - 1],
        percentiles,
        skewness,
        kurtosis,
        probability_positive: probability_positive(values),
        histogram: build_histogram(values, 20),
    }
}

/// Pearson correlation of two equally long series.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    if vx <= 0.0 || vy <= 0.0 {
        return 0.0;
    }
    cov / (vx.sqrt() * vy.sqrt())
}
