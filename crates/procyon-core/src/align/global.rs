use ndarray::{s, Array2};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use crate::align::correlation::translation;
use crate::align::planet::center_of_brightness;
use crate::consts::PARALLEL_FRAME_THRESHOLD;
use crate::error::{ProcyonError, Result};
use crate::frame::{Shift, Window};
use crate::quality::contrast::quality_measure;
use crate::quality::rank::FrameRanking;
use crate::store::FrameStore;

/// Global registration model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AlignMode {
    /// Extended objects (lunar/solar surface): FFT cross-correlation inside a
    /// high-gradient anchor rectangle of the best frame.
    #[default]
    Surface,
    /// Compact object on dark background: centre-of-brightness registration.
    Planet,
}

/// Result of the global alignment activities.
#[derive(Clone, Debug)]
pub struct GlobalAlignment {
    /// The anchor (sharpest) frame; its shift is (0, 0).
    pub anchor: usize,
    /// Anchor rectangle in frame coordinates (surface mode only).
    pub anchor_rect: Option<Window>,
    /// Per-frame shift registering the frame with the anchor.
    pub shifts: Vec<Shift>,
    /// Frames excluded from all later activities (decode failures and
    /// `max_shift` outliers).
    pub excluded: Vec<bool>,
}

/// Pick the anchor rectangle inside the best frame by exhaustive tiling.
///
/// The frame is divided into `scale x scale` non-overlapping rectangles and
/// the one with the highest structure measure on the blurred view wins.
pub fn select_alignment_rect(blurred: &Array2<u8>, scale: usize) -> Window {
    let (h, w) = blurred.dim();
    let rect_h = h / scale;
    let rect_w = w / scale;

    let mut best = Window::new(0, rect_h.max(1), 0, rect_w.max(1));
    let mut best_quality = -1.0f64;

    let mut x_low = 0;
    while x_low + rect_w <= w {
        let mut y_low = 0;
        while y_low + rect_h <= h {
            let window = blurred.slice(s![y_low..y_low + rect_h, x_low..x_low + rect_w]);
            let quality = quality_measure(window);
            if quality > best_quality {
                best_quality = quality;
                best = Window::new(y_low, y_low + rect_h, x_low, x_low + rect_w);
            }
            y_low += rect_h;
        }
        x_low += rect_w;
    }

    debug!(?best, quality = best_quality, "anchor rectangle selected");
    best
}

/// Grow the anchor rectangle by up to `search_width` on each side, clamped to
/// the frame, so shifts up to the search width stay measurable.
fn expanded_window(rect: Window, shape: (usize, usize), search_width: usize) -> Window {
    let (h, w) = shape;
    Window::new(
        rect.y_low.saturating_sub(search_width),
        (rect.y_high + search_width).min(h),
        rect.x_low.saturating_sub(search_width),
        (rect.x_high + search_width).min(w),
    )
}

/// Compute the integer (dy, dx) registration shift of every usable frame
/// against the anchor.
///
/// Surface mode fails with `SearchOutOfBounds` when a measured shift
/// saturates the correlation window. `on_frame_done` receives the number of
/// frames processed so far.
pub fn compute_shifts(
    store: &FrameStore,
    ranking: &FrameRanking,
    mode: AlignMode,
    rect_scale: usize,
    search_width: usize,
    on_frame_done: impl Fn(usize) + Send + Sync,
) -> Result<GlobalAlignment> {
    let total = store.frame_count();
    let anchor = ranking.best;
    let anchor_blurred = store.blurred(anchor)?;
    let shape = anchor_blurred.dim();
    let counter = AtomicUsize::new(0);

    let (anchor_rect, shifts) = match mode {
        AlignMode::Surface => {
            let rect = select_alignment_rect(&anchor_blurred, rect_scale);
            let window = expanded_window(rect, shape, search_width);
            let reference = anchor_blurred
                .slice(s![window.y_low..window.y_high, window.x_low..window.x_high])
                .to_owned();

            let shift_one = |index: usize| -> Result<Shift> {
                let shift = if index == anchor || !store.is_usable(index) {
                    Shift::default()
                } else {
                    let blurred = store.blurred(index)?;
                    let target =
                        blurred.slice(s![window.y_low..window.y_high, window.x_low..window.x_high]);
                    let measured = translation(reference.view(), target)?;
                    if measured.saturated {
                        return Err(ProcyonError::SearchOutOfBounds { frame: index });
                    }
                    measured.shift
                };
                let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                on_frame_done(done);
                Ok(shift)
            };

            let shifts: Vec<Shift> = if total >= PARALLEL_FRAME_THRESHOLD {
                (0..total)
                    .into_par_iter()
                    .map(shift_one)
                    .collect::<Result<_>>()?
            } else {
                (0..total).map(shift_one).collect::<Result<_>>()?
            };
            (Some(rect), shifts)
        }
        AlignMode::Planet => {
            let anchor_center = center_of_brightness(&anchor_blurred);

            let shift_one = |index: usize| -> Result<Shift> {
                let shift = if index == anchor || !store.is_usable(index) {
                    Shift::default()
                } else {
                    let blurred = store.blurred(index)?;
                    let center = center_of_brightness(&blurred);
                    Shift::new(
                        (anchor_center.0 - center.0).round() as isize,
                        (anchor_center.1 - center.1).round() as isize,
                    )
                };
                let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                on_frame_done(done);
                Ok(shift)
            };

            let shifts: Vec<Shift> = if total >= PARALLEL_FRAME_THRESHOLD {
                (0..total)
                    .into_par_iter()
                    .map(shift_one)
                    .collect::<Result<_>>()?
            } else {
                (0..total).map(shift_one).collect::<Result<_>>()?
            };
            (None, shifts)
        }
    };

    let excluded: Vec<bool> = (0..total).map(|i| !store.is_usable(i)).collect();
    info!(anchor, mode = ?mode, "global alignment complete");

    Ok(GlobalAlignment {
        anchor,
        anchor_rect,
        shifts,
        excluded,
    })
}

/// Flag `max_shift` outliers and compute the rectangle common to all
/// remaining shifted frames, in anchor coordinates.
pub fn compute_intersection(
    alignment: &mut GlobalAlignment,
    shape: (usize, usize),
    max_shift: usize,
) -> Result<Window> {
    let (h, w) = shape;

    for (index, shift) in alignment.shifts.iter().enumerate() {
        if alignment.excluded[index] {
            continue;
        }
        if shift.max_abs() > max_shift {
            warn!(
                frame = index,
                dy = shift.dy,
                dx = shift.dx,
                "global shift exceeds max_shift, excluding frame"
            );
            alignment.excluded[index] = true;
        }
    }

    let usable = alignment.excluded.iter().filter(|&&e| !e).count();
    if usable < 2 {
        return Err(ProcyonError::TooFewFrames { usable });
    }

    let included = alignment
        .shifts
        .iter()
        .zip(alignment.excluded.iter())
        .filter(|(_, &excluded)| !excluded)
        .map(|(shift, _)| shift);

    let mut dy_max = isize::MIN;
    let mut dy_min = isize::MAX;
    let mut dx_max = isize::MIN;
    let mut dx_min = isize::MAX;
    for shift in included {
        dy_max = dy_max.max(shift.dy);
        dy_min = dy_min.min(shift.dy);
        dx_max = dx_max.max(shift.dx);
        dx_min = dx_min.min(shift.dx);
    }

    // The anchor contributes (0, 0), so lows are >= 0 and highs <= frame size.
    let y_low = dy_max;
    let y_high = dy_min + h as isize;
    let x_low = dx_max;
    let x_high = dx_min + w as isize;

    if y_low >= y_high || x_low >= x_high {
        return Err(ProcyonError::EmptyIntersection);
    }

    let intersection = Window::new(
        y_low as usize,
        y_high as usize,
        x_low as usize,
        x_high as usize,
    );
    info!(
        height = intersection.height(),
        width = intersection.width(),
        excluded = alignment.excluded.iter().filter(|&&e| e).count(),
        "intersection window set"
    );
    Ok(intersection)
}
