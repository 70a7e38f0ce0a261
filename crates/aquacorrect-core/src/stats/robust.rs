use super::moments::mean_std;

/// Median via `select_nth_unstable`, O(n) without a full sort.
///
/// The slice is reordered. Returns NaN for an empty slice.
pub fn median(values: &mut [f32]) -> f32 {
    let n = values.len();
    if n == 0 {
        f32::NAN
    } else if n == 1 {
        values[0]
    } else if n % 2 == 1 {
        let mid = n / 2;
        *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1
    } else {
        let mid = n / 2;
        values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        values[..mid].select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b));
        (values[mid - 1] + values[mid]) / 2.0
    }
}

/// Index range kept by a trimmed statistic over `n` sorted samples.
///
/// `ratio` is the total fraction discarded; half comes off each tail.
pub fn trimmed_range(n: usize, ratio: f64) -> std::ops::Range<usize> {
    if ratio <= 0.0 {
        return 0..n;
    }
    let left = (n as f64 * ratio / 2.0) as usize;
    let right = ((n as f64 * (1.0 - ratio / 2.0)) as usize).min(n);
    if left >= right {
        // Too few samples to trim anything meaningful.
        0..n
    } else {
        left..right
    }
}

/// Trimmed mean and population std. The slice is sorted in place.
pub fn trimmed_mean_std(values: &mut [f32], ratio: f64) -> (f64, f64) {
    if ratio <= 0.0 {
        return mean_std(values);
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let range = trimmed_range(values.len(), ratio);
    mean_std(&values[range])
}
