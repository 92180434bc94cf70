use ndarray::ArrayView2;

/// Mean gradient magnitude on a stride-subsampled grid. Higher = sharper.
///
/// The forward differences in x and y are combined as sqrt(dx^2 + dy^2) and
/// averaged over the interior of the subsampled window.
pub fn local_contrast(data: ArrayView2<'_, u8>, stride: usize) -> f64 {
    let (h, w) = data.dim();
    let stride = stride.max(1);
    let sh = h.div_ceil(stride);
    let sw = w.div_ceil(stride);
    if sh < 2 || sw < 2 {
        return 0.0;
    }

    let at = |r: usize, c: usize| data[[r * stride, c * stride]] as f64;

    let mut sum = 0.0f64;
    for row in 1..sh {
        for col in 1..sw {
            let dx = at(row, col) - at(row, col - 1);
            let dy = at(row, col) - at(row - 1, col);
            sum += (dx * dx + dy * dy).sqrt();
        }
    }

    sum / ((sh - 1) * (sw - 1)) as f64
}

/// Structure measure of a window: the smaller of the mean absolute forward
/// differences in x and y. Insensitive to one-directional edges, which makes
/// it a good anchor/alignment-point selector.
pub fn quality_measure(data: ArrayView2<'_, u8>) -> f64 {
    let (h, w) = data.dim();
    if h < 2 || w < 2 {
        return 0.0;
    }

    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    for row in 1..h {
        for col in 1..w {
            sum_x += (data[[row, col]] as f64 - data[[row, col - 1]] as f64).abs();
            sum_y += (data[[row, col]] as f64 - data[[row - 1, col]] as f64).abs();
        }
    }

    let count = ((h - 1) * (w - 1)) as f64;
    (sum_x / count).min(sum_y / count)
}
