//! Centre-of-brightness registration for compact objects on a dark
//! background.
//!
//! The image is binarized at half its maximum brightness and the first
//! moments of the surviving pixels give the object centre. Fast, naturally
//! robust against faint background structure, and independent of the anchor
//! rectangle machinery used for extended surfaces.

use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Compute the centre of brightness of a frame.
///
/// Returns `(center_row, center_col)`. An all-black frame yields the
/// geometric centre.
pub fn center_of_brightness(data: &Array2<u8>) -> (f64, f64) {
    let (h, w) = data.dim();
    let max_val = data.iter().copied().max().unwrap_or(0);

    if max_val == 0 {
        return (h as f64 / 2.0, w as f64 / 2.0);
    }

    // Binary threshold at half-max: every pixel above counts with weight 1.
    let cutoff = max_val / 2;

    let (sum_r, sum_c, count) = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        moments_parallel(data, cutoff, h, w)
    } else {
        moments_sequential(data, cutoff, h, w)
    };

    if count > 0 {
        (sum_r as f64 / count as f64, sum_c as f64 / count as f64)
    } else {
        (h as f64 / 2.0, w as f64 / 2.0)
    }
}

fn moments_parallel(data: &Array2<u8>, cutoff: u8, h: usize, w: usize) -> (u64, u64, u64) {
    let row_sums: Vec<(u64, u64, u64)> = (0..h)
        .into_par_iter()
        .map(|row| {
            let mut sum_r = 0u64;
            let mut sum_c = 0u64;
            let mut count = 0u64;
            for col in 0..w {
                if data[[row, col]] > cutoff {
                    sum_r += row as u64;
                    sum_c += col as u64;
                    count += 1;
                }
            }
            (sum_r, sum_c, count)
        })
        .collect();

    row_sums
        .into_iter()
        .fold((0, 0, 0), |(ar, ac, an), (r, c, n)| {
            (ar + r, ac + c, an + n)
        })
}

fn moments_sequential(data: &Array2<u8>, cutoff: u8, h: usize, w: usize) -> (u64, u64, u64) {
    let mut sum_r = 0u64;
    let mut sum_c = 0u64;
    let mut count = 0u64;

    for row in 0..h {
        for col in 0..w {
            if data[[row, col]] > cutoff {
                sum_r += row as u64;
                sum_c += col as u64;
                count += 1;
            }
        }
    }

    (sum_r, sum_c, count)
}
