use ndarray::{Array2, Array3};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use crate::align::global::GlobalAlignment;
use crate::consts::COUNTER_EPSILON;
use crate::error::Result;
use crate::frame::Window;
use crate::pipeline::CancelToken;
use crate::stack::ap_grid::{AlignmentPoint, ApGrid};
use crate::stack::ap_rank::ApSelection;
use crate::store::FrameStore;

/// The final composite, scaled to the full 16-bit range.
#[derive(Clone, Debug)]
pub struct StackedImage {
    /// Shape (height, width, channels) over the intersection window.
    pub data: Array3<u16>,
}

impl StackedImage {
    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }
}

/// Accumulated patch of one alignment point: float pixel sums plus the
/// per-pixel count of contributing frames (clipping makes counts uneven).
struct ApBuffer {
    sums: Array3<f32>,
    counts: Array2<f32>,
}

/// De-warp and accumulate every selected (frame, alignment point) patch,
/// then merge the point buffers into one normalized 16-bit image.
///
/// Work is parallel over alignment points: each point owns its buffer, so no
/// locking is needed, and the sequential merge keeps the result independent
/// of worker count.
pub fn stack_frames(
    store: &FrameStore,
    grid: &ApGrid,
    selection: &ApSelection,
    alignment: &GlobalAlignment,
    intersection: Window,
    cancel: &CancelToken,
    on_point_done: impl Fn(usize) + Send + Sync,
) -> Result<StackedImage> {
    let channels = store.info().channels;
    let counter = AtomicUsize::new(0);

    let buffers: Vec<ApBuffer> = grid
        .points
        .par_iter()
        .map(|point| {
            cancel.checkpoint()?;
            let buffer = accumulate_point(store, point, selection, alignment, intersection, channels)?;
            let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
            on_point_done(done);
            Ok(buffer)
        })
        .collect::<Result<_>>()?;

    cancel.checkpoint()?;

    // Merge in point order; overlapping patches normalize out through the
    // shared contribution counter.
    let height = intersection.height();
    let width = intersection.width();
    let mut sums = Array3::<f32>::zeros((height, width, channels));
    let mut counts = Array2::<f32>::from_elem((height, width), COUNTER_EPSILON);

    for (point, buffer) in grid.points.iter().zip(buffers.iter()) {
        let patch = point.patch_window;
        for row in 0..patch.height() {
            for col in 0..patch.width() {
                counts[[patch.y_low + row, patch.x_low + col]] += buffer.counts[[row, col]];
                for plane in 0..channels {
                    sums[[patch.y_low + row, patch.x_low + col, plane]] +=
                        buffer.sums[[row, col, plane]];
                }
            }
        }
    }

    // Normalize and scale to the full 16-bit range.
    let scale: f32 = if store.info().depth <= 8 { 257.0 } else { 1.0 };
    let mut data = Array3::<u16>::zeros((height, width, channels));
    for row in 0..height {
        for col in 0..width {
            let count = counts[[row, col]];
            for plane in 0..channels {
                let value = sums[[row, col, plane]] / count * scale;
                data[[row, col, plane]] = value.round().clamp(0.0, 65535.0) as u16;
            }
        }
    }

    info!(
        height,
        width, channels, "stacking complete"
    );

    Ok(StackedImage { data })
}

/// Accumulate all selected frames of one alignment point into its patch
/// buffer.
fn accumulate_point(
    store: &FrameStore,
    point: &AlignmentPoint,
    selection: &ApSelection,
    alignment: &GlobalAlignment,
    intersection: Window,
    channels: usize,
) -> Result<ApBuffer> {
    let patch = point.patch_window;
    let patch_h = patch.height();
    let patch_w = patch.width();
    let mut sums = Array3::<f32>::zeros((patch_h, patch_w, channels));
    let mut counts = Array2::<f32>::zeros((patch_h, patch_w));

    for entry in &selection.per_ap[point.index] {
        let original = store.original(entry.frame)?;
        let (frame_h, frame_w, _) = original.dim();
        let frame_shift = alignment.shifts[entry.frame];

        // Source window of the de-warped patch in frame coordinates.
        let src_y = patch.y_low as isize + intersection.y_low as isize
            - frame_shift.dy
            - entry.shift.dy;
        let src_x = patch.x_low as isize + intersection.x_low as isize
            - frame_shift.dx
            - entry.shift.dx;

        // Clip symmetrically where the warp pushes the window over the frame
        // edge; skipped source pixels leave their target pixels untouched.
        let (src_y_low, dst_y_low) = clip_low(src_y);
        let src_y_high = ((src_y + patch_h as isize).min(frame_h as isize)) as usize;
        let (src_x_low, dst_x_low) = clip_low(src_x);
        let src_x_high = ((src_x + patch_w as isize).min(frame_w as isize)) as usize;

        if src_y_low >= src_y_high || src_x_low >= src_x_high {
            continue;
        }

        let copy_h = src_y_high - src_y_low;
        let copy_w = src_x_high - src_x_low;

        for row in 0..copy_h {
            for col in 0..copy_w {
                counts[[dst_y_low + row, dst_x_low + col]] += 1.0;
                for plane in 0..channels {
                    sums[[dst_y_low + row, dst_x_low + col, plane]] +=
                        original[[src_y_low + row, src_x_low + col, plane]] as f32;
                }
            }
        }
    }

    Ok(ApBuffer { sums, counts })
}

/// Clamp a possibly-negative source coordinate, returning the adjusted
/// source start and the matching target start.
fn clip_low(src: isize) -> (usize, usize) {
    if src < 0 {
        (0, (-src) as usize)
    } else {
        (src as usize, 0)
    }
}
