#[allow(dead_code)]
mod common;

use procyon_core::error::ProcyonError;
use procyon_core::frame::MonoChannel;
use procyon_core::store::{BufferingConfig, FrameStore};

use common::VecSource;

fn texture_source(num_frames: usize) -> VecSource {
    let frames: Vec<Vec<u8>> = (0..num_frames)
        .map(|_| common::texture_frame(64, 48, 0, 0))
        .collect();
    VecSource::from_mono(&frames, 64, 48)
}

fn build_store(source: &VecSource, buffering: BufferingConfig) -> FrameStore {
    FrameStore::from_source(source, MonoChannel::Green, 7, buffering, |_| {}).unwrap()
}

#[test]
fn test_view_dimensions() {
    let source = texture_source(3);
    let store = build_store(&source, BufferingConfig::default());

    assert_eq!(store.original(0).unwrap().dim(), (48, 64, 1));
    assert_eq!(store.mono(0).unwrap().dim(), (48, 64));
    assert_eq!(store.blurred(0).unwrap().dim(), (48, 64));
    // Stride-2 Laplacian view.
    assert_eq!(store.laplacian_ds(0).unwrap().dim(), (24, 32));
}

#[test]
fn test_mono_matches_original_for_mono_source() {
    let source = texture_source(2);
    let store = build_store(&source, BufferingConfig::default());

    let original = store.original(1).unwrap();
    let mono = store.mono(1).unwrap();
    for row in 0..48 {
        for col in 0..64 {
            assert_eq!(mono[[row, col]] as u16, original[[row, col, 0]]);
        }
    }
}

#[test]
fn test_recompute_policy_is_deterministic() {
    let source = texture_source(2);
    let retained = build_store(&source, BufferingConfig::default());
    let recomputed = build_store(&source, BufferingConfig::recompute_all());

    let a = retained.blurred(0).unwrap();
    let b = recomputed.blurred(0).unwrap();
    assert_eq!(a.as_ref(), b.as_ref());

    // A second recompute must produce the identical array.
    let c = recomputed.blurred(0).unwrap();
    assert_eq!(b.as_ref(), c.as_ref());

    let a = retained.laplacian_ds(1).unwrap();
    let b = recomputed.laplacian_ds(1).unwrap();
    assert_eq!(a.as_ref(), b.as_ref());
}

#[test]
fn test_index_out_of_range() {
    let source = texture_source(2);
    let store = build_store(&source, BufferingConfig::default());

    match store.mono(5) {
        Err(ProcyonError::FrameIndexOutOfRange { index: 5, total: 2 }) => {}
        other => panic!("expected FrameIndexOutOfRange, got {other:?}"),
    }
}

#[test]
fn test_unreadable_frame_is_excluded_not_fatal() {
    let good = common::texture_frame(32, 32, 0, 0);
    let mut frames: Vec<Option<ndarray::Array3<u16>>> = Vec::new();
    for i in 0..4 {
        if i == 2 {
            frames.push(None);
        } else {
            let mut frame = ndarray::Array3::<u16>::zeros((32, 32, 1));
            for row in 0..32 {
                for col in 0..32 {
                    frame[[row, col, 0]] = good[row * 32 + col] as u16;
                }
            }
            frames.push(Some(frame));
        }
    }
    let source = VecSource::new(frames);

    let store = FrameStore::from_source(
        &source,
        MonoChannel::Green,
        7,
        BufferingConfig::default(),
        |_| {},
    )
    .unwrap();

    assert!(!store.is_usable(2));
    assert_eq!(store.usable_indices(), vec![0, 1, 3]);
    match store.original(2) {
        Err(ProcyonError::FrameUnusable { index: 2 }) => {}
        other => panic!("expected FrameUnusable, got {other:?}"),
    }
}

#[test]
fn test_too_few_usable_frames_is_fatal() {
    let good = common::texture_frame(32, 32, 0, 0);
    let mut frame = ndarray::Array3::<u16>::zeros((32, 32, 1));
    for row in 0..32 {
        for col in 0..32 {
            frame[[row, col, 0]] = good[row * 32 + col] as u16;
        }
    }
    let source = VecSource::new(vec![Some(frame), None]);

    match FrameStore::from_source(
        &source,
        MonoChannel::Green,
        7,
        BufferingConfig::default(),
        |_| {},
    ) {
        Err(ProcyonError::TooFewFrames { usable: 1 }) => {}
        other => panic!("expected TooFewFrames, got {:?}", other.err()),
    }
}
