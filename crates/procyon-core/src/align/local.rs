use ndarray::{s, Array2};

use tracing::debug;

use crate::align::correlation::translation;
use crate::align::subpixel::sub_pixel_solve;
use crate::error::Result;
use crate::frame::{Shift, Window};

/// Local shift measurement technique.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ApMethod {
    /// Exhaustive squared-difference minimization over the integer search
    /// grid, with optional quadratic sub-pixel refinement.
    #[default]
    LocalSearch,
    /// FFT cross-correlation of the box windows. Preferable when the search
    /// radius is large relative to the box.
    Fft,
}

/// A per-(frame, alignment point) warp shift.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalShift {
    pub shift: Shift,
    /// The measurement ran into the edge of the search range; the shift is
    /// kept but treated as low-confidence.
    pub saturated: bool,
}

/// Measure the local shift of one frame at one alignment point.
///
/// `box_window` is given in intersection-local (reference) coordinates; the
/// matching window of the frame sits at `box + intersection_origin -
/// frame_shift`. The returned shift follows the global convention: the frame
/// content must move by it to register with the reference. Its components
/// never exceed `search_width + 1` in magnitude.
#[allow(clippy::too_many_arguments)]
pub fn measure_local_shift(
    reference: &Array2<u8>,
    frame_blurred: &Array2<u8>,
    box_window: Window,
    intersection: Window,
    frame_shift: Shift,
    method: ApMethod,
    search_width: usize,
    subpixel: bool,
) -> Result<LocalShift> {
    let base_y = box_window.y_low as isize + intersection.y_low as isize - frame_shift.dy;
    let base_x = box_window.x_low as isize + intersection.x_low as isize - frame_shift.dx;

    match method {
        ApMethod::LocalSearch => Ok(search_local_match(
            reference,
            frame_blurred,
            box_window,
            base_y,
            base_x,
            search_width,
            subpixel,
        )),
        ApMethod::Fft => fft_local_match(
            reference,
            frame_blurred,
            box_window,
            base_y,
            base_x,
            search_width,
        ),
    }
}

/// Exhaustive SSD search over `(2*search_width + 1)^2` candidate shifts.
fn search_local_match(
    reference: &Array2<u8>,
    frame_blurred: &Array2<u8>,
    box_window: Window,
    base_y: isize,
    base_x: isize,
    search_width: usize,
    subpixel: bool,
) -> LocalShift {
    let (frame_h, frame_w) = frame_blurred.dim();
    let box_h = box_window.height();
    let box_w = box_window.width();
    let radius = search_width as isize;
    let side = 2 * search_width + 1;

    let reference_box = reference.slice(s![
        box_window.y_low..box_window.y_high,
        box_window.x_low..box_window.x_high
    ]);

    let mut deviations = vec![u64::MAX; side * side];
    let mut best_index: Option<usize> = None;
    let mut best_value = u64::MAX;

    for (iy, ly) in (-radius..=radius).enumerate() {
        for (ix, lx) in (-radius..=radius).enumerate() {
            // Candidate shift l samples the frame window at base - l.
            let src_y = base_y - ly;
            let src_x = base_x - lx;
            if src_y < 0
                || src_x < 0
                || src_y + box_h as isize > frame_h as isize
                || src_x + box_w as isize > frame_w as isize
            {
                continue;
            }
            let sy = src_y as usize;
            let sx = src_x as usize;

            let mut ssd = 0u64;
            for row in 0..box_h {
                for col in 0..box_w {
                    let diff = reference_box[[row, col]] as i32
                        - frame_blurred[[sy + row, sx + col]] as i32;
                    ssd += (diff * diff) as u64;
                }
            }

            let flat = iy * side + ix;
            deviations[flat] = ssd;
            if ssd < best_value {
                best_value = ssd;
                best_index = Some(flat);
            }
        }
    }

    let Some(best_flat) = best_index else {
        // The search window lies entirely outside the frame.
        return LocalShift {
            shift: Shift::default(),
            saturated: true,
        };
    };

    let min_iy = best_flat / side;
    let min_ix = best_flat % side;
    let int_dy = min_iy as isize - radius;
    let int_dx = min_ix as isize - radius;

    let at_border = min_iy == 0 || min_iy == side - 1 || min_ix == 0 || min_ix == side - 1;
    if at_border {
        return LocalShift {
            shift: Shift::new(int_dy, int_dx),
            saturated: true,
        };
    }

    if !subpixel {
        return LocalShift {
            shift: Shift::new(int_dy, int_dx),
            saturated: false,
        };
    }

    // 3x3 stencil around the minimum; incomplete stencils (neighbour window
    // fell outside the frame) keep the integer result.
    let mut values = [0.0f64; 9];
    let mut complete = true;
    for stencil_y in 0..3 {
        for stencil_x in 0..3 {
            let flat = (min_iy + stencil_y - 1) * side + (min_ix + stencil_x - 1);
            if deviations[flat] == u64::MAX {
                complete = false;
            } else {
                values[stencil_y * 3 + stencil_x] = deviations[flat] as f64;
            }
        }
    }

    if !complete {
        return LocalShift {
            shift: Shift::new(int_dy, int_dx),
            saturated: false,
        };
    }

    match sub_pixel_solve(&values) {
        Some((y_correction, x_correction)) => {
            let dy = (int_dy as f64 + y_correction.clamp(-1.0, 1.0)).round() as isize;
            let dx = (int_dx as f64 + x_correction.clamp(-1.0, 1.0)).round() as isize;
            let limit = search_width as isize + 1;
            LocalShift {
                shift: Shift::new(dy.clamp(-limit, limit), dx.clamp(-limit, limit)),
                saturated: false,
            }
        }
        None => {
            debug!("degenerate sub-pixel fit, keeping integer minimum");
            LocalShift {
                shift: Shift::new(int_dy, int_dx),
                saturated: false,
            }
        }
    }
}

/// FFT cross-correlation of the box windows.
fn fft_local_match(
    reference: &Array2<u8>,
    frame_blurred: &Array2<u8>,
    box_window: Window,
    base_y: isize,
    base_x: isize,
    search_width: usize,
) -> Result<LocalShift> {
    let (frame_h, frame_w) = frame_blurred.dim();
    let box_h = box_window.height();
    let box_w = box_window.width();

    if box_h > frame_h || box_w > frame_w {
        return Ok(LocalShift {
            shift: Shift::default(),
            saturated: true,
        });
    }

    // Clamp the window into the frame and fold the displacement back into
    // the measured shift afterwards.
    let clamped_y = base_y.clamp(0, (frame_h - box_h) as isize);
    let clamped_x = base_x.clamp(0, (frame_w - box_w) as isize);
    let displacement = Shift::new(clamped_y - base_y, clamped_x - base_x);

    let reference_box = reference.slice(s![
        box_window.y_low..box_window.y_high,
        box_window.x_low..box_window.x_high
    ]);
    let target = frame_blurred.slice(s![
        clamped_y as usize..clamped_y as usize + box_h,
        clamped_x as usize..clamped_x as usize + box_w
    ]);

    let measured = translation(reference_box, target)?;
    let raw = Shift::new(
        measured.shift.dy - displacement.dy,
        measured.shift.dx - displacement.dx,
    );

    let limit = search_width as isize + 1;
    let saturated = measured.saturated || raw.max_abs() > search_width;
    Ok(LocalShift {
        shift: Shift::new(raw.dy.clamp(-limit, limit), raw.dx.clamp(-limit, limit)),
        saturated,
    })
}
