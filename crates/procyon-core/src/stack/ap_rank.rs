use ndarray::{s, Array2};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};

use crate::align::global::GlobalAlignment;
use crate::align::local::{measure_local_shift, ApMethod, LocalShift};
use crate::error::Result;
use crate::frame::{Shift, Window};
use crate::pipeline::CancelToken;
use crate::quality::contrast::local_contrast;
use crate::stack::ap_grid::ApGrid;
use crate::store::FrameStore;

/// A frame selected for stacking at one alignment point.
#[derive(Clone, Copy, Debug)]
pub struct ApFrameEntry {
    pub frame: usize,
    /// Local warp shift of this frame at this point.
    pub shift: Shift,
    /// Local sharpness at the de-warped box.
    pub quality: f64,
    /// The shift measurement hit the search limit.
    pub saturated: bool,
}

/// Per-AP frame selection plus the frame-indexed lookup consumed read-only
/// by the stacker.
#[derive(Clone, Debug)]
pub struct ApSelection {
    /// Number of frames stacked at every alignment point.
    pub stack_size: usize,
    /// For each AP, the selected frames sorted by local quality descending
    /// (ties broken by frame index ascending).
    pub per_ap: Vec<Vec<ApFrameEntry>>,
    /// For each frame, the alignment points that selected it.
    pub frame_to_aps: Vec<Vec<usize>>,
}

/// For every (usable frame, alignment point) pair measure the local warp
/// shift and the local sharpness, then select the `stack_size` locally
/// sharpest frames per point.
#[allow(clippy::too_many_arguments)]
pub fn compute_frame_qualities(
    store: &FrameStore,
    reference: &Array2<u8>,
    grid: &ApGrid,
    alignment: &GlobalAlignment,
    intersection: Window,
    method: ApMethod,
    search_width: usize,
    subpixel: bool,
    quality_stride: usize,
    stack_size: usize,
    cancel: &CancelToken,
    on_frame_done: impl Fn(usize) + Send + Sync,
) -> Result<ApSelection> {
    let total = store.frame_count();
    let ap_count = grid.points.len();
    let counter = AtomicUsize::new(0);

    // Shift + quality for every AP of one frame.
    let measure_frame = |frame_index: usize| -> Result<Option<Vec<(LocalShift, f64)>>> {
        if alignment.excluded[frame_index] {
            let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
            on_frame_done(done);
            return Ok(None);
        }
        cancel.checkpoint()?;

        let blurred = store.blurred(frame_index)?;
        let frame_shift = alignment.shifts[frame_index];
        let mut measurements = Vec::with_capacity(ap_count);

        for point in &grid.points {
            let local = measure_local_shift(
                reference,
                &blurred,
                point.box_window,
                intersection,
                frame_shift,
                method,
                search_width,
                subpixel,
            )?;
            let quality = dewarped_box_quality(
                &blurred,
                point.box_window,
                intersection,
                frame_shift,
                local.shift,
                quality_stride,
            );
            measurements.push((local, quality));
        }

        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
        on_frame_done(done);
        Ok(Some(measurements))
    };

    let per_frame: Vec<Option<Vec<(LocalShift, f64)>>> = (0..total)
        .into_par_iter()
        .map(measure_frame)
        .collect::<Result<_>>()?;

    cancel.checkpoint()?;

    let mut per_ap: Vec<Vec<ApFrameEntry>> = Vec::with_capacity(ap_count);
    for ap_index in 0..ap_count {
        let mut entries: Vec<ApFrameEntry> = per_frame
            .iter()
            .enumerate()
            .filter_map(|(frame, measurements)| {
                measurements.as_ref().map(|m| {
                    let (local, quality) = m[ap_index];
                    ApFrameEntry {
                        frame,
                        shift: local.shift,
                        quality,
                        saturated: local.saturated,
                    }
                })
            })
            .collect();

        entries.sort_by(|a, b| b.quality.total_cmp(&a.quality).then(a.frame.cmp(&b.frame)));
        entries.truncate(stack_size);
        per_ap.push(entries);
    }

    let mut frame_to_aps: Vec<Vec<usize>> = vec![Vec::new(); total];
    for (ap_index, entries) in per_ap.iter().enumerate() {
        for entry in entries {
            frame_to_aps[entry.frame].push(ap_index);
        }
    }

    let saturated: usize = per_ap
        .iter()
        .flatten()
        .filter(|entry| entry.saturated)
        .count();
    if saturated > 0 {
        debug!(saturated, "low-confidence local shifts among selected entries");
    }
    info!(
        alignment_points = ap_count,
        stack_size, "per-point frame selection complete"
    );

    Ok(ApSelection {
        stack_size,
        per_ap,
        frame_to_aps,
    })
}

/// Local contrast of the frame's box window displaced by its global and
/// local shifts, clamped into the frame.
fn dewarped_box_quality(
    blurred: &Array2<u8>,
    box_window: Window,
    intersection: Window,
    frame_shift: Shift,
    local_shift: Shift,
    stride: usize,
) -> f64 {
    let (frame_h, frame_w) = blurred.dim();
    let box_h = box_window.height();
    let box_w = box_window.width();

    let y = box_window.y_low as isize + intersection.y_low as isize
        - frame_shift.dy
        - local_shift.dy;
    let x = box_window.x_low as isize + intersection.x_low as isize
        - frame_shift.dx
        - local_shift.dx;

    let y = y.clamp(0, (frame_h - box_h) as isize) as usize;
    let x = x.clamp(0, (frame_w - box_w) as isize) as usize;

    local_contrast(blurred.slice(s![y..y + box_h, x..x + box_w]), stride)
}
