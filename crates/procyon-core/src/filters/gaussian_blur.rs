use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Apply Gaussian blur to an 8-bit view using separable 1D convolution.
///
/// `width` is the odd tap count; the sigma is derived from it the same way
/// video-processing stacks do (`0.3*((width-1)/2 - 1) + 0.8`).
pub fn gaussian_blur_u8(data: &Array2<u8>, width: usize) -> Array2<u8> {
    let taps = kernel_weights(width);
    let horizontal = horizontal_pass(data, &taps);
    vertical_pass(&horizontal, &taps)
}

/// Normalized Gaussian tap weights for an odd window width.
fn kernel_weights(width: usize) -> Vec<f32> {
    let width = width.max(1) | 1;
    let half = (width / 2) as isize;
    let sigma = 0.3 * (half as f32 - 1.0) + 0.8;
    let denom = 2.0 * sigma * sigma;

    let mut taps: Vec<f32> = (-half..=half)
        .map(|offset| (-((offset * offset) as f32) / denom).exp())
        .collect();
    let total: f32 = taps.iter().sum();
    for tap in &mut taps {
        *tap /= total;
    }
    taps
}

/// Source index for every (position, tap) pair along one axis, with the
/// first and last element repeated past the borders.
fn edge_repeated_indices(len: usize, tap_count: usize) -> Vec<usize> {
    let half = (tap_count / 2) as isize;
    let last = len as isize - 1;
    let mut table = Vec::with_capacity(len * tap_count);
    for position in 0..len as isize {
        for tap in -half..=half {
            table.push((position + tap).clamp(0, last) as usize);
        }
    }
    table
}

fn horizontal_pass(data: &Array2<u8>, taps: &[f32]) -> Array2<f32> {
    let (h, w) = data.dim();
    let columns = edge_repeated_indices(w, taps.len());

    let blur_row = |row: usize| -> Vec<f32> {
        (0..w)
            .map(|col| {
                let sources = &columns[col * taps.len()..(col + 1) * taps.len()];
                taps.iter()
                    .zip(sources)
                    .map(|(tap, &src)| tap * data[[row, src]] as f32)
                    .sum()
            })
            .collect()
    };

    let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(blur_row).collect()
    } else {
        (0..h).map(blur_row).collect()
    };

    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((h, w), flat).expect("row-major data matches dimensions")
}

fn vertical_pass(data: &Array2<f32>, taps: &[f32]) -> Array2<u8> {
    let (h, w) = data.dim();
    let rows_table = edge_repeated_indices(h, taps.len());

    let blur_row = |row: usize| -> Vec<u8> {
        let sources = &rows_table[row * taps.len()..(row + 1) * taps.len()];
        (0..w)
            .map(|col| {
                let acc: f32 = taps
                    .iter()
                    .zip(sources)
                    .map(|(tap, &src)| tap * data[[src, col]])
                    .sum();
                acc.round().clamp(0.0, 255.0) as u8
            })
            .collect()
    };

    let rows: Vec<Vec<u8>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(blur_row).collect()
    } else {
        (0..h).map(blur_row).collect()
    };

    let flat: Vec<u8> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((h, w), flat).expect("row-major data matches dimensions")
}
