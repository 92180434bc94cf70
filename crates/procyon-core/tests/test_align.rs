#[allow(dead_code)]
mod common;

use ndarray::Array2;

use procyon_core::align::correlation::translation;
use procyon_core::align::global::{
    compute_intersection, compute_shifts, select_alignment_rect, AlignMode, GlobalAlignment,
};
use procyon_core::error::ProcyonError;
use procyon_core::frame::{MonoChannel, Shift};
use procyon_core::quality::{rank_frames, RankMethod};
use procyon_core::store::{BufferingConfig, FrameStore};

use common::VecSource;

fn mono_store(frames: &[Vec<u8>], width: usize, height: usize) -> FrameStore {
    let source = VecSource::from_mono(frames, width, height);
    FrameStore::from_source(
        &source,
        MonoChannel::Green,
        7,
        BufferingConfig::default(),
        |_| {},
    )
    .unwrap()
}

fn to_array(data: &[u8], width: usize, height: usize) -> Array2<u8> {
    let mut array = Array2::<u8>::zeros((height, width));
    for row in 0..height {
        for col in 0..width {
            array[[row, col]] = data[row * width + col];
        }
    }
    array
}

#[test]
fn test_translation_zero_for_identical_windows() {
    let frame = to_array(&common::texture_frame(64, 64, 0, 0), 64, 64);
    let result = translation(frame.view(), frame.view()).unwrap();
    assert_eq!(result.shift, Shift::new(0, 0));
    assert!(!result.saturated);
}

#[test]
fn test_translation_recovers_known_shift() {
    let reference = to_array(&common::texture_frame(64, 64, 0, 0), 64, 64);
    for (dy, dx) in [(3isize, 5isize), (-4, 2), (0, -6), (7, -7)] {
        let target = to_array(&common::texture_frame(64, 64, dy, dx), 64, 64);
        let result = translation(reference.view(), target.view()).unwrap();
        assert_eq!(
            result.shift,
            Shift::new(dy, dx),
            "failed to recover ({dy}, {dx})"
        );
    }
}

#[test]
fn test_alignment_rect_prefers_structure() {
    // Flat frame with texture only in the lower-right third.
    let width = 96;
    let height = 96;
    let mut data = vec![128u8; width * height];
    for row in 64..96 {
        for col in 64..96 {
            data[row * width + col] = common::texture_value(row as isize, col as isize);
        }
    }
    let frame = to_array(&data, width, height);

    let rect = select_alignment_rect(&frame, 3);
    assert_eq!(rect.y_low, 64);
    assert_eq!(rect.x_low, 64);
}

fn shift_pattern(index: usize) -> (isize, isize) {
    (index as isize % 3 - 1, (index as isize + 1) % 3 - 1)
}

#[test]
fn test_surface_shifts_recovered() {
    let width = 96;
    let height = 96;
    let frames: Vec<Vec<u8>> = (0..6)
        .map(|i| {
            let (dy, dx) = shift_pattern(i);
            common::texture_frame(width, height, dy, dx)
        })
        .collect();
    let store = mono_store(&frames, width, height);
    let ranking = rank_frames(&store, RankMethod::Contrast, 2, |_| {}).unwrap();

    let alignment =
        compute_shifts(&store, &ranking, AlignMode::Surface, 3, 6, |_| {}).unwrap();

    let (anchor_dy, anchor_dx) = shift_pattern(alignment.anchor);
    for (index, shift) in alignment.shifts.iter().enumerate() {
        let (dy, dx) = shift_pattern(index);
        let expected = Shift::new(anchor_dy - dy, anchor_dx - dx);
        assert_eq!(*shift, expected, "frame {index}");
    }
}

#[test]
fn test_planet_shifts_recovered() {
    let width = 128;
    let height = 128;
    let frames: Vec<Vec<u8>> = (0..6)
        .map(|i| {
            let (dy, dx) = shift_pattern(i);
            common::blob_frame(width, height, 64.0 + dy as f64, 64.0 + dx as f64, 10.0)
        })
        .collect();
    let store = mono_store(&frames, width, height);
    let ranking = rank_frames(&store, RankMethod::Contrast, 2, |_| {}).unwrap();

    let alignment =
        compute_shifts(&store, &ranking, AlignMode::Planet, 3, 6, |_| {}).unwrap();

    let (anchor_dy, anchor_dx) = shift_pattern(alignment.anchor);
    for (index, shift) in alignment.shifts.iter().enumerate() {
        let (dy, dx) = shift_pattern(index);
        let expected = Shift::new(anchor_dy - dy, anchor_dx - dx);
        assert!(
            (shift.dy - expected.dy).abs() <= 1 && (shift.dx - expected.dx).abs() <= 1,
            "frame {index}: got {shift:?}, expected {expected:?}"
        );
    }
}

#[test]
fn test_surface_and_planet_modes_agree() {
    // A single circular blob with independent small translations must align
    // the same way under both models.
    let width = 128;
    let height = 128;
    let count = 20;
    let frames: Vec<Vec<u8>> = (0..count)
        .map(|i| {
            let dy = (i % 5) as f64 - 2.0;
            let dx = ((i / 5) % 5) as f64 - 2.0;
            common::blob_frame(width, height, 64.0 + dy, 64.0 + dx, 14.0)
        })
        .collect();
    let store = mono_store(&frames, width, height);
    let ranking = rank_frames(&store, RankMethod::Contrast, 2, |_| {}).unwrap();

    let surface =
        compute_shifts(&store, &ranking, AlignMode::Surface, 3, 6, |_| {}).unwrap();
    let planet = compute_shifts(&store, &ranking, AlignMode::Planet, 3, 6, |_| {}).unwrap();

    let agreeing = surface
        .shifts
        .iter()
        .zip(planet.shifts.iter())
        .filter(|(a, b)| (a.dy - b.dy).abs() <= 1 && (a.dx - b.dx).abs() <= 1)
        .count();
    assert!(
        agreeing * 100 >= count * 95,
        "only {agreeing}/{count} frames agree within 1 pixel"
    );
}

#[test]
fn test_translation_saturates_at_half_window() {
    // Two near-delta images half a window apart: the wrap-around makes the
    // shift sign ambiguous, which must be flagged.
    let mut reference = Array2::<u8>::zeros((32, 32));
    let mut target = Array2::<u8>::zeros((32, 32));
    reference[[16, 16]] = 255;
    target[[0, 16]] = 255;

    let result = translation(reference.view(), target.view()).unwrap();
    assert_eq!(result.shift.dy.unsigned_abs(), 16);
    assert!(result.saturated);
}

fn synthetic_alignment(shifts: Vec<Shift>) -> GlobalAlignment {
    let excluded = vec![false; shifts.len()];
    GlobalAlignment {
        anchor: 0,
        anchor_rect: None,
        shifts,
        excluded,
    }
}

#[test]
fn test_intersection_window() {
    let mut alignment = synthetic_alignment(vec![
        Shift::new(0, 0),
        Shift::new(2, -3),
        Shift::new(-1, 1),
    ]);
    let intersection = compute_intersection(&mut alignment, (50, 40), 100).unwrap();

    assert_eq!(intersection.y_low, 2);
    assert_eq!(intersection.y_high, 49);
    assert_eq!(intersection.x_low, 1);
    assert_eq!(intersection.x_high, 37);

    // Invariant: |shift| bounded by the lost border.
    for shift in &alignment.shifts {
        assert!(shift.dy.unsigned_abs() <= 50 - intersection.height());
        assert!(shift.dx.unsigned_abs() <= 40 - intersection.width());
    }
}

#[test]
fn test_max_shift_outliers_are_excluded() {
    let mut alignment = synthetic_alignment(vec![
        Shift::new(0, 0),
        Shift::new(30, 0),
        Shift::new(1, 1),
    ]);
    let intersection = compute_intersection(&mut alignment, (50, 40), 10).unwrap();

    assert!(alignment.excluded[1]);
    assert!(!alignment.excluded[0]);
    // The outlier does not constrain the intersection.
    assert_eq!(intersection.y_low, 1);
}

#[test]
fn test_empty_intersection() {
    let mut alignment = synthetic_alignment(vec![
        Shift::new(0, 0),
        Shift::new(45, 0),
        Shift::new(-45, 0),
    ]);
    match compute_intersection(&mut alignment, (50, 40), 100) {
        Err(ProcyonError::EmptyIntersection) => {}
        other => panic!("expected EmptyIntersection, got {other:?}"),
    }
}
