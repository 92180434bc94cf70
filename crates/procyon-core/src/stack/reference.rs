use ndarray::Array2;

use tracing::info;

use crate::align::global::GlobalAlignment;
use crate::error::Result;
use crate::frame::Window;
use crate::quality::rank::FrameRanking;
use crate::store::FrameStore;

/// Average the best globally aligned frames into the reference image.
///
/// `K = max(1, round(N * percent / 100))` of the quality-sorted, non-excluded
/// frames contribute. Each frame's blurred view is read through the
/// intersection window displaced by its global shift, accumulated in floating
/// point and rounded back to 8 bits. The reference is what alignment points
/// are placed on and what local shifts are measured against.
pub fn build_reference(
    store: &FrameStore,
    ranking: &FrameRanking,
    alignment: &GlobalAlignment,
    intersection: Window,
    percent: f64,
) -> Result<Array2<u8>> {
    let contributors: Vec<usize> = ranking
        .quality_sorted
        .iter()
        .copied()
        .filter(|&i| !alignment.excluded[i])
        .collect();

    let count = ((contributors.len() as f64 * percent / 100.0).round() as usize)
        .clamp(1, contributors.len());
    let selected = &contributors[..count];

    let height = intersection.height();
    let width = intersection.width();
    let mut accumulator = Array2::<f64>::zeros((height, width));

    for &index in selected {
        let blurred = store.blurred(index)?;
        let shift = alignment.shifts[index];
        let y_origin = (intersection.y_low as isize - shift.dy) as usize;
        let x_origin = (intersection.x_low as isize - shift.dx) as usize;

        for row in 0..height {
            for col in 0..width {
                accumulator[[row, col]] += blurred[[y_origin + row, x_origin + col]] as f64;
            }
        }
    }

    let n = selected.len() as f64;
    let reference = accumulator.mapv(|v| (v / n).round().clamp(0.0, 255.0) as u8);

    info!(frames = selected.len(), "reference image built");
    Ok(reference)
}
