use ndarray::{Array2, ArrayView2};
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::consts::CORRELATION_EPSILON;
use crate::error::{ProcyonError, Result};
use crate::frame::Shift;

/// Measured integer displacement plus whether it sits on the edge of the
/// representable range (half the window size), where the wrap-around makes
/// the sign ambiguous.
#[derive(Clone, Copy, Debug)]
pub struct Translation {
    pub shift: Shift,
    pub saturated: bool,
}

/// Return the translation that registers `target` with `reference`.
///
/// Cross-correlation via FFT: `C = IFFT2(F_R * conj(F_T) / (|F_R|*|F_T| + eps))`,
/// peak location wrapped into a signed shift. The result means `target` must
/// be shifted by this amount to line up with `reference`.
pub fn translation(reference: ArrayView2<'_, u8>, target: ArrayView2<'_, u8>) -> Result<Translation> {
    let (h, w) = reference.dim();
    if (h, w) != target.dim() {
        return Err(ProcyonError::Internal(format!(
            "correlation window size mismatch: {}x{} vs {}x{}",
            h,
            w,
            target.dim().0,
            target.dim().1
        )));
    }

    let ref_fft = fft2d(reference);
    let tgt_fft = fft2d(target);

    // Cross spectrum normalized by the magnitude product.
    let mut cross = Array2::<Complex<f64>>::zeros((h, w));
    for row in 0..h {
        for col in 0..w {
            let product = ref_fft[[row, col]] * tgt_fft[[row, col]].conj();
            let magnitude = ref_fft[[row, col]].norm() * tgt_fft[[row, col]].norm();
            cross[[row, col]] = product / (magnitude + CORRELATION_EPSILON);
        }
    }

    let correlation = ifft2d_magnitude(&cross);

    let mut peak_row = 0;
    let mut peak_col = 0;
    let mut peak_val = f64::NEG_INFINITY;
    for row in 0..h {
        for col in 0..w {
            if correlation[[row, col]] > peak_val {
                peak_val = correlation[[row, col]];
                peak_row = row;
                peak_col = col;
            }
        }
    }

    // Peaks past the half-way point wrap to negative shifts.
    let dy = if peak_row > h / 2 {
        peak_row as isize - h as isize
    } else {
        peak_row as isize
    };
    let dx = if peak_col > w / 2 {
        peak_col as isize - w as isize
    } else {
        peak_col as isize
    };

    let saturated = dy.unsigned_abs() >= h / 2 || dx.unsigned_abs() >= w / 2;

    Ok(Translation {
        shift: Shift::new(dy, dx),
        saturated,
    })
}

/// Forward 2D FFT of an 8-bit window.
fn fft2d(data: ArrayView2<'_, u8>) -> Array2<Complex<f64>> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let fft_row = planner.plan_fft_forward(w);
    let fft_col = planner.plan_fft_forward(h);

    let mut result = Array2::<Complex<f64>>::zeros((h, w));
    for row in 0..h {
        for col in 0..w {
            result[[row, col]] = Complex::new(data[[row, col]] as f64, 0.0);
        }
    }

    transform_rows_then_cols(&mut result, fft_row.as_ref(), fft_col.as_ref());
    result
}

/// Inverse 2D FFT, returning the magnitude surface (scaled by 1/(h*w)).
fn ifft2d_magnitude(spectrum: &Array2<Complex<f64>>) -> Array2<f64> {
    let (h, w) = spectrum.dim();
    let mut planner = FftPlanner::new();
    let ifft_row = planner.plan_fft_inverse(w);
    let ifft_col = planner.plan_fft_inverse(h);

    let mut work = spectrum.clone();
    transform_rows_then_cols(&mut work, ifft_row.as_ref(), ifft_col.as_ref());

    let norm = (h * w) as f64;
    work.mapv(|v| v.norm() / norm)
}

fn transform_rows_then_cols(
    data: &mut Array2<Complex<f64>>,
    row_fft: &dyn rustfft::Fft<f64>,
    col_fft: &dyn rustfft::Fft<f64>,
) {
    let (h, w) = data.dim();

    let mut row_buf = vec![Complex::default(); w];
    for row in 0..h {
        for col in 0..w {
            row_buf[col] = data[[row, col]];
        }
        row_fft.process(&mut row_buf);
        for col in 0..w {
            data[[row, col]] = row_buf[col];
        }
    }

    let mut col_buf = vec![Complex::default(); h];
    for col in 0..w {
        for row in 0..h {
            col_buf[row] = data[[row, col]];
        }
        col_fft.process(&mut col_buf);
        for row in 0..h {
            data[[row, col]] = col_buf[row];
        }
    }
}
