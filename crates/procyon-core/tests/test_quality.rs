#[allow(dead_code)]
mod common;

use ndarray::Array2;

use procyon_core::frame::MonoChannel;
use procyon_core::quality::{local_contrast, quality_measure, rank_frames, RankMethod};
use procyon_core::store::{BufferingConfig, FrameStore};

use common::VecSource;

#[test]
fn test_local_contrast_zero_on_uniform() {
    let data = Array2::<u8>::from_elem((32, 32), 127);
    assert_eq!(local_contrast(data.view(), 2), 0.0);
    assert_eq!(quality_measure(data.view()), 0.0);
}

#[test]
fn test_local_contrast_increases_with_structure() {
    let flat = Array2::<u8>::from_elem((32, 32), 100);

    let mut checkered = Array2::<u8>::zeros((32, 32));
    for row in 0..32 {
        for col in 0..32 {
            checkered[[row, col]] = if (row + col) % 2 == 0 { 40 } else { 210 };
        }
    }

    assert!(local_contrast(checkered.view(), 1) > local_contrast(flat.view(), 1));
    assert!(quality_measure(checkered.view()) > quality_measure(flat.view()));
}

#[test]
fn test_quality_measure_takes_weaker_direction() {
    // Horizontal stripes: strong y gradient, zero x gradient.
    let mut stripes = Array2::<u8>::zeros((32, 32));
    for row in 0..32 {
        for col in 0..32 {
            stripes[[row, col]] = if row % 2 == 0 { 0 } else { 255 };
        }
    }
    assert_eq!(quality_measure(stripes.view()), 0.0);
}

fn store_with_sharpness_gradient() -> FrameStore {
    // Frame 2 is the sharp texture; the others are progressively flattened
    // toward gray.
    let width = 64;
    let height = 64;
    let sharp = common::texture_frame(width, height, 0, 0);
    let soften = |data: &[u8], keep_percent: u32| -> Vec<u8> {
        data.iter()
            .map(|&v| {
                let centered = v as i32 - 128;
                (128 + centered * keep_percent as i32 / 100) as u8
            })
            .collect()
    };

    let frames = vec![
        soften(&sharp, 30),
        soften(&sharp, 60),
        sharp.clone(),
        soften(&sharp, 10),
    ];
    let source = VecSource::from_mono(&frames, width, height);
    FrameStore::from_source(
        &source,
        MonoChannel::Green,
        7,
        BufferingConfig::default(),
        |_| {},
    )
    .unwrap()
}

#[test]
fn test_rank_frames_orders_by_sharpness() {
    let store = store_with_sharpness_gradient();
    let ranking = rank_frames(&store, RankMethod::Contrast, 2, |_| {}).unwrap();

    assert_eq!(ranking.best, 2);
    assert_eq!(ranking.quality_sorted, vec![2, 1, 0, 3]);

    // Scores are normalized by the best value.
    assert!((ranking.scores[2] - 1.0).abs() < 1e-12);
    for index in [0, 1, 3] {
        assert!(ranking.scores[index] < 1.0);
        assert!(ranking.scores[index] >= 0.0);
    }
}

#[test]
fn test_rank_frames_laplacian_agrees_on_best() {
    let store = store_with_sharpness_gradient();
    let ranking = rank_frames(&store, RankMethod::Laplacian, 2, |_| {}).unwrap();
    assert_eq!(ranking.best, 2);
}

#[test]
fn test_rank_ties_break_by_lower_index() {
    let width = 48;
    let height = 48;
    let frame = common::texture_frame(width, height, 0, 0);
    let frames = vec![frame.clone(), frame.clone(), frame];
    let source = VecSource::from_mono(&frames, width, height);
    let store = FrameStore::from_source(
        &source,
        MonoChannel::Green,
        7,
        BufferingConfig::default(),
        |_| {},
    )
    .unwrap();

    let ranking = rank_frames(&store, RankMethod::Contrast, 2, |_| {}).unwrap();
    assert_eq!(ranking.best, 0);
    assert_eq!(ranking.quality_sorted, vec![0, 1, 2]);
}
