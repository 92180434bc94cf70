use ndarray::{s, Array2};

use tracing::info;

use crate::error::{ProcyonError, Result};
use crate::frame::Window;
use crate::quality::contrast::quality_measure;

/// One alignment point on the reference grid.
///
/// The small inner box is what local shifts are measured on; the larger
/// outer patch is what gets accumulated into the stacked image. Both windows
/// are in intersection-local (reference) coordinates and `box` is centred
/// inside `patch`.
#[derive(Clone, Debug)]
pub struct AlignmentPoint {
    pub index: usize,
    /// Centre row in reference coordinates.
    pub cy: usize,
    /// Centre column in reference coordinates.
    pub cx: usize,
    pub box_window: Window,
    pub patch_window: Window,
}

/// The grid of surviving alignment points.
#[derive(Clone, Debug)]
pub struct ApGrid {
    pub points: Vec<AlignmentPoint>,
    pub box_half_width: usize,
    pub patch_half_width: usize,
}

/// Candidate centre positions along one axis.
///
/// Centres run from `patch_half` to `dim - patch_half` with the grid step,
/// and the final position is clamped to `dim - patch_half` so the patch
/// union tiles the whole axis (the step is below the patch size, so there is
/// no gap).
fn grid_positions(dim: usize, patch_half: usize, step: usize) -> Vec<usize> {
    if dim < 2 * patch_half {
        return Vec::new();
    }
    let first = patch_half;
    let last = dim - patch_half;

    let mut positions = Vec::new();
    let mut position = first;
    while position < last {
        positions.push(position);
        position += step;
    }
    positions.push(last);
    positions
}

/// Place alignment points on a regular grid inside the reference.
///
/// Candidates are dropped when their box lacks structure (below
/// `structure_threshold` after max-normalization across the grid) or
/// brightness (maximum below `brightness_threshold`). At least one survivor
/// is required.
pub fn place_alignment_points(
    reference: &Array2<u8>,
    box_half_width: usize,
    patch_half_width: usize,
    structure_threshold: f64,
    brightness_threshold: u8,
) -> Result<ApGrid> {
    let (height, width) = reference.dim();
    let step = (5 * patch_half_width / 3).max(1);

    let rows = grid_positions(height, patch_half_width, step);
    let cols = grid_positions(width, patch_half_width, step);

    struct Candidate {
        cy: usize,
        cx: usize,
        structure: f64,
        max_brightness: u8,
    }

    let mut candidates = Vec::with_capacity(rows.len() * cols.len());
    for &cy in &rows {
        for &cx in &cols {
            let box_view = reference.slice(s![
                cy - box_half_width..cy + box_half_width,
                cx - box_half_width..cx + box_half_width
            ]);
            candidates.push(Candidate {
                cy,
                cx,
                structure: quality_measure(box_view),
                max_brightness: box_view.iter().copied().max().unwrap_or(0),
            });
        }
    }

    let structure_max = candidates
        .iter()
        .map(|c| c.structure)
        .fold(0.0f64, f64::max);

    let mut points = Vec::new();
    let mut dropped = 0usize;
    for candidate in candidates {
        let normalized = if structure_max > 0.0 {
            candidate.structure / structure_max
        } else {
            0.0
        };
        if normalized < structure_threshold || candidate.max_brightness < brightness_threshold {
            dropped += 1;
            continue;
        }
        let index = points.len();
        points.push(AlignmentPoint {
            index,
            cy: candidate.cy,
            cx: candidate.cx,
            box_window: Window::new(
                candidate.cy - box_half_width,
                candidate.cy + box_half_width,
                candidate.cx - box_half_width,
                candidate.cx + box_half_width,
            ),
            patch_window: Window::new(
                candidate.cy - patch_half_width,
                candidate.cy + patch_half_width,
                candidate.cx - patch_half_width,
                candidate.cx + patch_half_width,
            ),
        });
    }

    if points.is_empty() {
        return Err(ProcyonError::NoAlignmentPoints);
    }

    info!(
        created = points.len(),
        dropped, "alignment point grid placed"
    );

    Ok(ApGrid {
        points,
        box_half_width,
        patch_half_width,
    })
}
