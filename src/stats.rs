//! Binned spike statistics shared by the aggregation engines.
//!
//! All routines are pure slice-in/vec-out; the engines own the buffers.

/// Count spikes into `nbins` fixed-width bins covering `[0, nbins * binsize)`.
///
/// Spikes outside the covered window are ignored. Callers shift spike
/// timestamps relative to the aligning event before binning.
pub fn bin_counts(spikes: &[f64], nbins: usize, binsize: f64) -> Vec<u32> {
    let mut counts = vec![0u32; nbins];
    let span = nbins as f64 * binsize;
    for &t in spikes {
        if t >= 0.0 && t < span {
            let idx = (t / binsize) as usize;
            if idx < nbins {
                counts[idx] += 1;
            }
        }
    }
    counts
}

/// Rate curve: bin counts scaled to spikes/second and averaged over trials
pub fn rate_curve(counts: &[u32], binsize: f64, trials: usize) -> Vec<f64> {
    let norm = binsize * trials.max(1) as f64;
    counts.iter().map(|&c| c as f64 / norm).collect()
}

/// 1-D Gaussian smoothing with a truncated kernel and reflected boundary.
///
/// Kernel radius is `4 * sigma` rounded (the `scipy.ndimage.gaussian_filter1d`
/// defaults the upstream analysis chain was calibrated against), boundary
/// handling mirrors the curve around the edge samples.
pub fn gaussian_smooth(curve: &[f64], sigma: f64) -> Vec<f64> {
    let n = curve.len();
    if n == 0 || sigma <= 0.0 {
        return curve.to_vec();
    }

    let radius = (4.0 * sigma + 0.5) as usize;
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    for i in 0..=2 * radius {
        let x = i as f64 - radius as f64;
        kernel.push((-0.5 * (x / sigma).powi(2)).exp());
    }
    let kernel_sum: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= kernel_sum;
    }

    // reflect mode: (d c b a | a b c d | d c b a)
    let reflect = |mut i: isize| -> usize {
        let n = n as isize;
        loop {
            if i < 0 {
                i = -i - 1;
            } else if i >= n {
                i = 2 * n - i - 1;
            } else {
                return i as usize;
            }
        }
    };

    let mut smoothed = vec![0.0; n];
    for (i, out) in smoothed.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (k, &w) in kernel.iter().enumerate() {
            let j = i as isize + k as isize - radius as isize;
            acc += w * curve[reflect(j)];
        }
        *out = acc;
    }
    smoothed
}

/// Arithmetic mean, 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation, 0 for an empty slice
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Local extrema of a curve from the sign changes of its first difference.
///
/// A local maximum is any bin where the difference turns from non-negative
/// to negative, a local minimum is the mirror case. Returns
/// `(maxima_indices, minima_indices)`.
pub fn local_extrema(curve: &[f64]) -> (Vec<usize>, Vec<usize>) {
    let mut maxima = Vec::new();
    let mut minima = Vec::new();
    if curve.len() < 3 {
        return (maxima, minima);
    }
    let diff: Vec<f64> = curve.windows(2).map(|w| w[1] - w[0]).collect();
    for i in 1..diff.len() {
        if diff[i - 1] >= 0.0 && diff[i] < 0.0 {
            maxima.push(i);
        } else if diff[i - 1] < 0.0 && diff[i] >= 0.0 {
            minima.push(i);
        }
    }
    (maxima, minima)
}
