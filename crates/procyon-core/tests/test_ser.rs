#[allow(dead_code)]
mod common;

use procyon_core::error::ProcyonError;
use procyon_core::frame::ColorMode;
use procyon_core::io::ser::SerReader;
use procyon_core::io::source::FrameSource;

#[test]
fn test_header_parsing() {
    let frames: Vec<Vec<u8>> = (0..3).map(|_| vec![10u8; 16 * 8]).collect();
    let data = common::build_ser_with_frames(16, 8, &frames);
    let file = common::write_test_ser(&data);

    let reader = SerReader::open(file.path()).unwrap();
    assert_eq!(reader.frame_count(), 3);
    assert_eq!(reader.header.width, 16);
    assert_eq!(reader.header.height, 8);
    assert_eq!(reader.header.color_mode(), ColorMode::Mono);

    let info = reader.info();
    assert_eq!(info.channels, 1);
    assert_eq!(info.depth, 8);
}

#[test]
fn test_frame_decoding() {
    let mut frame = vec![0u8; 16 * 8];
    frame[3 * 16 + 5] = 200;
    let data = common::build_ser_with_frames(16, 8, &[frame]);
    let file = common::write_test_ser(&data);

    let reader = SerReader::open(file.path()).unwrap();
    let decoded = reader.read_frame(0).unwrap();
    assert_eq!(decoded.dim(), (8, 16, 1));
    assert_eq!(decoded[[3, 5, 0]], 200);
    assert_eq!(decoded[[0, 0, 0]], 0);
}

#[test]
fn test_missing_magic_rejected() {
    let mut data = common::build_ser_with_frames(16, 8, &[vec![0u8; 16 * 8]]);
    data[0] = b'X';
    let file = common::write_test_ser(&data);

    match SerReader::open(file.path()) {
        Err(ProcyonError::InvalidSer(_)) => {}
        other => panic!("expected InvalidSer, got {other:?}"),
    }
}

#[test]
fn test_truncated_file_rejected() {
    let data = common::build_ser_with_frames(16, 8, &[vec![0u8; 16 * 8]]);
    let file = common::write_test_ser(&data[..data.len() - 10]);

    match SerReader::open(file.path()) {
        Err(ProcyonError::InvalidSer(_)) => {}
        other => panic!("expected InvalidSer, got {other:?}"),
    }
}

#[test]
fn test_frame_index_out_of_range() {
    let data = common::build_ser_with_frames(16, 8, &[vec![0u8; 16 * 8]]);
    let file = common::write_test_ser(&data);

    let reader = SerReader::open(file.path()).unwrap();
    match reader.read_frame(1) {
        Err(ProcyonError::FrameIndexOutOfRange { index: 1, total: 1 }) => {}
        other => panic!("expected FrameIndexOutOfRange, got {other:?}"),
    }
}

#[test]
fn test_16bit_dynamic_range_calibration() {
    // 12 significant bits: maximum sample 0x0FFF. The calibration pass must
    // left-shift reads by 4 so the full 16-bit range is used.
    let width = 8u32;
    let height = 4u32;
    let mut data = common::build_ser_header_full(width, height, 16, 2, 0);
    for frame_idx in 0..2u16 {
        for i in 0..(width * height) as u16 {
            let value: u16 = if i == 0 && frame_idx == 0 { 0x0FFF } else { i % 1024 };
            data.extend_from_slice(&value.to_le_bytes());
        }
    }
    let file = common::write_test_ser(&data);

    let reader = SerReader::open(file.path()).unwrap();
    assert_eq!(reader.shift_pixels(), 4);

    let frame = reader.read_frame(0).unwrap();
    assert_eq!(frame[[0, 0, 0]], 0x0FFF << 4);
}

#[test]
fn test_timestamp_trailer() {
    let mut data = common::build_ser_with_frames(16, 8, &[vec![0u8; 16 * 8], vec![0u8; 16 * 8]]);
    data.extend_from_slice(&111u64.to_le_bytes());
    data.extend_from_slice(&222u64.to_le_bytes());
    let file = common::write_test_ser(&data);

    let reader = SerReader::open(file.path()).unwrap();
    assert_eq!(reader.timestamp(0), Some(111));
    assert_eq!(reader.timestamp(1), Some(222));
}

#[test]
fn test_no_timestamp_trailer() {
    let data = common::build_ser_with_frames(16, 8, &[vec![0u8; 16 * 8]]);
    let file = common::write_test_ser(&data);

    let reader = SerReader::open(file.path()).unwrap();
    assert_eq!(reader.timestamp(0), None);
}

#[test]
fn test_bgr_plane_order_normalized() {
    // One pixel, BGR 8-bit: planes on disk are B, G, R.
    let mut data = common::build_ser_header_full(1, 1, 8, 1, 101);
    data.extend_from_slice(&[10, 20, 30]); // B=10, G=20, R=30
    let file = common::write_test_ser(&data);

    let reader = SerReader::open(file.path()).unwrap();
    let frame = reader.read_frame(0).unwrap();
    assert_eq!(frame[[0, 0, 0]], 30); // R
    assert_eq!(frame[[0, 0, 1]], 20); // G
    assert_eq!(frame[[0, 0, 2]], 10); // B
}
