use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use crate::consts::PARALLEL_FRAME_THRESHOLD;
use crate::error::Result;
use crate::quality::contrast::local_contrast;
use crate::store::FrameStore;

/// Global sharpness scoring function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RankMethod {
    /// Mean gradient magnitude of the blurred view on a strided grid.
    /// Cheap, the default.
    #[default]
    Contrast,
    /// Mean absolute value of the downsampled Laplacian. Better ranking,
    /// roughly an order of magnitude slower.
    Laplacian,
}

/// Result of the global frame ranking.
#[derive(Clone, Debug)]
pub struct FrameRanking {
    /// Per-frame score normalized to [0, 1] by the best value.
    /// Unusable frames score 0.
    pub scores: Vec<f64>,
    /// Usable frame indices sorted by score descending; ties broken by lower
    /// original index.
    pub quality_sorted: Vec<usize>,
    /// The sharpest frame, used as the global-alignment anchor.
    pub best: usize,
}

/// Score every usable frame and produce the quality-sorted order.
///
/// `on_frame_done` is called with the number of frames scored so far.
pub fn rank_frames(
    store: &FrameStore,
    method: RankMethod,
    stride: usize,
    on_frame_done: impl Fn(usize) + Send + Sync,
) -> Result<FrameRanking> {
    let total = store.frame_count();
    let counter = AtomicUsize::new(0);

    let score_one = |index: usize| -> Result<f64> {
        let score = if !store.is_usable(index) {
            0.0
        } else {
            match method {
                RankMethod::Contrast => {
                    let blurred = store.blurred(index)?;
                    local_contrast(blurred.view(), stride)
                }
                RankMethod::Laplacian => {
                    let laplacian = store.laplacian_ds(index)?;
                    let sum: u64 = laplacian.iter().map(|&v| v as u64).sum();
                    sum as f64 / laplacian.len() as f64
                }
            }
        };
        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
        on_frame_done(done);
        Ok(score)
    };

    let raw_scores: Vec<f64> = if total >= PARALLEL_FRAME_THRESHOLD {
        (0..total)
            .into_par_iter()
            .map(score_one)
            .collect::<Result<_>>()?
    } else {
        (0..total).map(score_one).collect::<Result<_>>()?
    };

    let mut quality_sorted: Vec<usize> = (0..total).filter(|&i| store.is_usable(i)).collect();
    quality_sorted.sort_by(|&a, &b| {
        raw_scores[b]
            .total_cmp(&raw_scores[a])
            .then(a.cmp(&b))
    });

    let best = quality_sorted[0];
    let best_value = raw_scores[best];
    let scores = if best_value > 0.0 {
        raw_scores.iter().map(|&s| s / best_value).collect()
    } else {
        raw_scores
    };

    info!(best_frame = best, "frame ranking complete");

    Ok(FrameRanking {
        scores,
        quality_sorted,
        best,
    })
}
