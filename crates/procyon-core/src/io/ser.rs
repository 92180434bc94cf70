use std::fs::File;
use std::ops::Range;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use ndarray::Array3;

use crate::error::{ProcyonError, Result};
use crate::frame::{ColorMode, SourceInfo};
use crate::io::source::FrameSource;

pub const SER_HEADER_SIZE: usize = 178;
const FILE_ID: &[u8; 14] = b"LUCAM-RECORDER";

// Field offsets within the fixed 178-byte header. The 4-byte LuID at
// offset 14 carries no information we use.
const OFF_COLOR_ID: usize = 18;
const OFF_ENDIANNESS: usize = 22;
const OFF_WIDTH: usize = 26;
const OFF_HEIGHT: usize = 30;
const OFF_PIXEL_DEPTH: usize = 34;
const OFF_FRAME_COUNT: usize = 38;
const OFF_OBSERVER: usize = 42;
const OFF_INSTRUMENT: usize = 82;
const OFF_TELESCOPE: usize = 122;
const OFF_DATE_TIME: usize = 162;
const OFF_DATE_TIME_UTC: usize = 170;
const TEXT_FIELD_LEN: usize = 40;

/// Largest accepted frame dimension; anything beyond this is a corrupt
/// header, not a camera.
const MAX_DIMENSION: u32 = 1 << 15;

/// Decoded SER file header.
#[derive(Clone, Debug)]
pub struct SerHeader {
    pub color_id: i32,
    /// Multi-byte samples are big-endian only when the endianness field is
    /// exactly 1. Common capture software writes 0 yet stores little-endian
    /// data, so every other value is read as little-endian.
    pub big_endian: bool,
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: Option<String>,
    pub instrument: Option<String>,
    pub telescope: Option<String>,
    pub date_time: u64,
    pub date_time_utc: u64,
}

impl SerHeader {
    /// Decode and sanity-check the header fields. `buf` must hold the full
    /// 178 bytes.
    fn parse(buf: &[u8]) -> Result<Self> {
        let header = Self {
            color_id: LittleEndian::read_i32(&buf[OFF_COLOR_ID..]),
            big_endian: LittleEndian::read_i32(&buf[OFF_ENDIANNESS..]) == 1,
            width: LittleEndian::read_i32(&buf[OFF_WIDTH..]) as u32,
            height: LittleEndian::read_i32(&buf[OFF_HEIGHT..]) as u32,
            pixel_depth: LittleEndian::read_i32(&buf[OFF_PIXEL_DEPTH..]) as u32,
            frame_count: LittleEndian::read_i32(&buf[OFF_FRAME_COUNT..]) as u32,
            observer: text_field(buf, OFF_OBSERVER),
            instrument: text_field(buf, OFF_INSTRUMENT),
            telescope: text_field(buf, OFF_TELESCOPE),
            date_time: LittleEndian::read_u64(&buf[OFF_DATE_TIME..]),
            date_time_utc: LittleEndian::read_u64(&buf[OFF_DATE_TIME_UTC..]),
        };

        if header.width == 0 || header.width > MAX_DIMENSION {
            return Err(ProcyonError::InvalidSer(format!(
                "image width {} out of range",
                header.width
            )));
        }
        if header.height == 0 || header.height > MAX_DIMENSION {
            return Err(ProcyonError::InvalidSer(format!(
                "image height {} out of range",
                header.height
            )));
        }
        if header.pixel_depth == 0 || header.pixel_depth > 16 {
            return Err(ProcyonError::InvalidSer(format!(
                "pixel depth {} out of range",
                header.pixel_depth
            )));
        }

        Ok(header)
    }

    /// Bytes per stored sample: one up to 8 bits, two above.
    pub fn sample_bytes(&self) -> usize {
        1 + (self.pixel_depth > 8) as usize
    }

    /// Samples per pixel: RGB and BGR carry three planes, everything else
    /// (mono and the Bayer layouts) one.
    pub fn plane_count(&self) -> usize {
        if matches!(self.color_id, 100 | 101) {
            3
        } else {
            1
        }
    }

    /// On-disk size of one frame.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * self.plane_count() * self.sample_bytes()
    }

    pub fn color_mode(&self) -> ColorMode {
        match self.color_id {
            8 => ColorMode::BayerRGGB,
            9 => ColorMode::BayerGRBG,
            10 => ColorMode::BayerGBRG,
            11 => ColorMode::BayerBGGR,
            100 => ColorMode::RGB,
            101 => ColorMode::BGR,
            _ => ColorMode::Mono,
        }
    }
}

/// One of the 40-byte ASCII annotation fields, or `None` when blank.
fn text_field(buf: &[u8], offset: usize) -> Option<String> {
    let raw = &buf[offset..offset + TEXT_FIELD_LEN];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(TEXT_FIELD_LEN);
    let text = String::from_utf8_lossy(&raw[..end]).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Memory-mapped SER file reader.
///
/// On 16-bit files a calibration pass samples three frames (first, middle,
/// last), finds the global maximum, and left-shifts all subsequent reads by
/// `16 - bit_length(max)` so the full dynamic range is used even when the
/// camera wrote fewer significant bits.
pub struct SerReader {
    mmap: Mmap,
    pub header: SerHeader,
    info: SourceInfo,
    shift_pixels: u32,
}

impl std::fmt::Debug for SerReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerReader")
            .field("mmap", &format_args!("<{} bytes>", self.mmap.len()))
            .field("header", &self.header)
            .field("info", &self.info)
            .field("shift_pixels", &self.shift_pixels)
            .finish()
    }
}

impl SerReader {
    /// Open a SER file and parse its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let Some(head) = mmap.get(..SER_HEADER_SIZE) else {
            return Err(ProcyonError::InvalidSer(format!(
                "{} bytes is too short for a SER header",
                mmap.len()
            )));
        };
        if !head.starts_with(FILE_ID) {
            return Err(ProcyonError::InvalidSer(
                "file id is not LUCAM-RECORDER".into(),
            ));
        }

        let header = SerHeader::parse(head)?;

        let payload = header.frame_bytes() as u64 * header.frame_count as u64;
        let available = (mmap.len() - SER_HEADER_SIZE) as u64;
        if available < payload {
            return Err(ProcyonError::InvalidSer(format!(
                "frame data truncated: {payload} bytes declared, {available} present"
            )));
        }

        let shift_pixels = if header.pixel_depth > 8 {
            calibrate_dynamic_range(&mmap, &header)
        } else {
            0
        };

        let info = SourceInfo {
            path: path.to_path_buf(),
            frame_count: header.frame_count as usize,
            width: header.width as usize,
            height: header.height as usize,
            channels: header.plane_count(),
            depth: if header.pixel_depth <= 8 { 8 } else { 16 },
            color_mode: header.color_mode(),
            observer: header.observer.clone(),
            instrument: header.instrument.clone(),
            telescope: header.telescope.clone(),
        };

        Ok(Self {
            mmap,
            header,
            info,
            shift_pixels,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    /// Number of bits 16-bit samples are shifted up on read.
    pub fn shift_pixels(&self) -> u32 {
        self.shift_pixels
    }

    fn frame_span(&self, index: usize) -> Result<Range<usize>> {
        let total = self.frame_count();
        if index >= total {
            return Err(ProcyonError::FrameIndexOutOfRange { index, total });
        }
        let start = SER_HEADER_SIZE + index * self.header.frame_bytes();
        Ok(start..start + self.header.frame_bytes())
    }

    /// Get the raw bytes for a single frame (zero-copy from mmap).
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        Ok(&self.mmap[self.frame_span(index)?])
    }

    /// Read per-frame timestamp (microseconds) from the optional trailer.
    pub fn timestamp(&self, index: usize) -> Option<u64> {
        let trailer = SER_HEADER_SIZE + self.header.frame_bytes() * self.frame_count();
        let bytes = self.mmap.get(trailer + index * 8..)?.get(..8)?;
        Some(LittleEndian::read_u64(bytes))
    }

    fn read_sample(&self, raw: &[u8], sample_index: usize) -> u16 {
        if self.header.sample_bytes() == 1 {
            return raw[sample_index] as u16;
        }
        let i = sample_index * 2;
        let value = if self.header.big_endian {
            u16::from_be_bytes([raw[i], raw[i + 1]])
        } else {
            u16::from_le_bytes([raw[i], raw[i + 1]])
        };
        // Saturate: frames outside the calibration sample may exceed the
        // sampled maximum.
        (((value as u32) << self.shift_pixels).min(u16::MAX as u32)) as u16
    }
}

impl FrameSource for SerReader {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_frame(&self, index: usize) -> Result<Array3<u16>> {
        let raw = self.frame_raw(index)?;
        let h = self.info.height;
        let w = self.info.width;
        let planes = self.info.channels;

        let mut frame = Array3::<u16>::zeros((h, w, planes));
        // SER stores BGR with the blue plane first; normalize to RGB order.
        let swap_rb = self.header.color_id == 101;

        for row in 0..h {
            for col in 0..w {
                let base = (row * w + col) * planes;
                for plane in 0..planes {
                    let target = if swap_rb && planes == 3 {
                        2 - plane
                    } else {
                        plane
                    };
                    frame[[row, col, target]] = self.read_sample(raw, base + plane);
                }
            }
        }

        Ok(frame)
    }
}

/// Sample the first, middle and last frame and return the left-shift that
/// maps the observed maximum onto the full 16-bit range.
fn calibrate_dynamic_range(mmap: &Mmap, header: &SerHeader) -> u32 {
    let count = header.frame_count as usize;
    if count == 0 {
        return 0;
    }
    let frame_bytes = header.frame_bytes();
    let sample_indices = [0, count / 2, count - 1];

    let mut max_value: u16 = 0;
    for &frame_index in &sample_indices {
        let offset = SER_HEADER_SIZE + frame_index * frame_bytes;
        let raw = &mmap[offset..offset + frame_bytes];
        for pair in raw.chunks_exact(2) {
            let value = if header.big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            };
            max_value = max_value.max(value);
        }
    }

    if max_value == 0 {
        return 0;
    }
    // 16 - bit_length(max)
    (max_value.leading_zeros()).min(15)
}
