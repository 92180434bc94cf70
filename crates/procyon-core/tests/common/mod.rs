use ndarray::Array3;

use procyon_core::error::{ProcyonError, Result};
use procyon_core::frame::{ColorMode, SourceInfo};
use procyon_core::io::ser::SER_HEADER_SIZE;
use procyon_core::io::source::FrameSource;
use procyon_core::pipeline::config::StackConfig;

/// Build a SER file header for mono 8-bit frames.
///
/// Returns a `Vec<u8>` containing just the 178-byte header.
/// Append frame pixel data after calling this function.
pub fn build_ser_header(width: u32, height: u32, num_frames: usize) -> Vec<u8> {
    build_ser_header_full(width, height, 8, num_frames, 0)
}

/// Build a SER file header with configurable bit depth and color mode.
///
/// `color_id`: 0=MONO, 8=BAYER_RGGB, 9=BAYER_GRBG, 10=BAYER_GBRG, 11=BAYER_BGGR,
///             100=RGB, 101=BGR
pub fn build_ser_header_full(
    width: u32,
    height: u32,
    bit_depth: u32,
    num_frames: usize,
    color_id: i32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SER_HEADER_SIZE);

    // Magic (14 bytes)
    buf.extend_from_slice(b"LUCAM-RECORDER");
    // LuID (4 bytes)
    buf.extend_from_slice(&0i32.to_le_bytes());
    // ColorID (4 bytes)
    buf.extend_from_slice(&color_id.to_le_bytes());
    // Endianness field = 0: samples are read as little-endian
    buf.extend_from_slice(&0i32.to_le_bytes());
    // Width
    buf.extend_from_slice(&(width as i32).to_le_bytes());
    // Height
    buf.extend_from_slice(&(height as i32).to_le_bytes());
    // PixelDepth
    buf.extend_from_slice(&(bit_depth as i32).to_le_bytes());
    // FrameCount
    buf.extend_from_slice(&(num_frames as i32).to_le_bytes());
    // Observer (40 bytes)
    buf.extend_from_slice(&[0u8; 40]);
    // Instrument (40 bytes)
    buf.extend_from_slice(&[0u8; 40]);
    // Telescope (40 bytes)
    buf.extend_from_slice(&[0u8; 40]);
    // DateTime (8 bytes)
    buf.extend_from_slice(&0u64.to_le_bytes());
    // DateTimeUTC (8 bytes)
    buf.extend_from_slice(&0u64.to_le_bytes());

    assert_eq!(buf.len(), SER_HEADER_SIZE);
    buf
}

/// Build a complete synthetic mono 8-bit SER file with the given frame data.
pub fn build_ser_with_frames(width: u32, height: u32, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = build_ser_header(width, height, frames.len());
    for frame in frames {
        buf.extend_from_slice(frame);
    }
    buf
}

/// Write a SER buffer to a temporary file and return the temp file handle.
///
/// The file stays alive as long as the returned `NamedTempFile` is not dropped.
pub fn write_test_ser(data: &[u8]) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut f = tempfile::NamedTempFile::new().expect("create temp file");
    f.write_all(data).expect("write SER data");
    f.flush().expect("flush");
    f
}

/// Smooth deterministic texture with structure everywhere, evaluated on the
/// infinite plane so shifted frames really are translated copies.
pub fn texture_value(y: isize, x: isize) -> u8 {
    let yf = y as f64;
    let xf = x as f64;
    let v = 128.0
        + 55.0 * (0.37 * xf).sin() * (0.23 * yf).cos()
        + 40.0 * (0.11 * (xf + yf)).sin();
    v.round().clamp(0.0, 255.0) as u8
}

/// A mono frame whose content is the texture displaced by (dy, dx).
pub fn texture_frame(width: usize, height: usize, dy: isize, dx: isize) -> Vec<u8> {
    let mut data = vec![0u8; width * height];
    for row in 0..height {
        for col in 0..width {
            data[row * width + col] = texture_value(row as isize - dy, col as isize - dx);
        }
    }
    data
}

/// A mono frame with a Gaussian blob on black background.
pub fn blob_frame(width: usize, height: usize, cy: f64, cx: f64, sigma: f64) -> Vec<u8> {
    let mut data = vec![0u8; width * height];
    for row in 0..height {
        for col in 0..width {
            let dy = row as f64 - cy;
            let dx = col as f64 - cx;
            let v = 250.0 * (-(dy * dy + dx * dx) / (2.0 * sigma * sigma)).exp();
            data[row * width + col] = v.round() as u8;
        }
    }
    data
}

/// A configuration scaled down for the small synthetic test frames.
///
/// On a 96x96 source this yields a 3x3 alignment-point grid whose patches
/// tile the full image.
pub fn small_config() -> StackConfig {
    StackConfig {
        align_search_width: 6,
        ap_box_half_width: 12,
        ap_patch_half_width: 24,
        ap_search_width: 4,
        ap_structure_threshold: 0.0,
        ap_brightness_threshold: 0,
        stack_percent: 50.0,
        ..StackConfig::default()
    }
}

/// In-memory frame source with per-frame injectable decode failures.
pub struct VecSource {
    info: SourceInfo,
    frames: Vec<Option<Array3<u16>>>,
}

impl VecSource {
    pub fn new(frames: Vec<Option<Array3<u16>>>) -> Self {
        let first = frames
            .iter()
            .flatten()
            .next()
            .expect("at least one readable frame");
        let (height, width, channels) = first.dim();
        let info = SourceInfo {
            path: "synthetic".into(),
            frame_count: frames.len(),
            width,
            height,
            channels,
            depth: 8,
            color_mode: ColorMode::Mono,
            observer: None,
            instrument: None,
            telescope: None,
        };
        Self { info, frames }
    }

    pub fn from_mono(frames: &[Vec<u8>], width: usize, height: usize) -> Self {
        let frames = frames
            .iter()
            .map(|data| {
                let mut frame = Array3::<u16>::zeros((height, width, 1));
                for row in 0..height {
                    for col in 0..width {
                        frame[[row, col, 0]] = data[row * width + col] as u16;
                    }
                }
                Some(frame)
            })
            .collect();
        Self::new(frames)
    }
}

impl FrameSource for VecSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_frame(&self, index: usize) -> Result<Array3<u16>> {
        match self.frames.get(index) {
            Some(Some(frame)) => Ok(frame.clone()),
            Some(None) => Err(ProcyonError::Internal("synthetic decode failure".into())),
            None => Err(ProcyonError::FrameIndexOutOfRange {
                index,
                total: self.frames.len(),
            }),
        }
    }
}
