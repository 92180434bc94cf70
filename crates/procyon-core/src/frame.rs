use ndarray::{Array2, Array3};
use std::path::PathBuf;

use crate::consts::LAPLACIAN_STRIDE;
use crate::filters::gaussian_blur::gaussian_blur_u8;

/// Integer (dy, dx) displacement in pixel units.
///
/// The convention throughout the crate: a shift `s` for frame `F` against
/// reference `R` means `R[y, x] ≈ F[y - s.dy, x - s.dx]`, i.e. the frame
/// content must be moved by `s` to register with the reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Shift {
    pub dy: isize,
    pub dx: isize,
}

impl Shift {
    pub fn new(dy: isize, dx: isize) -> Self {
        Self { dy, dx }
    }

    /// Chebyshev magnitude, used against `max_shift`.
    pub fn max_abs(&self) -> usize {
        self.dy.unsigned_abs().max(self.dx.unsigned_abs())
    }
}

impl std::ops::Add for Shift {
    type Output = Shift;
    fn add(self, rhs: Shift) -> Shift {
        Shift::new(self.dy + rhs.dy, self.dx + rhs.dx)
    }
}

/// A half-open rectangular window `[y_low..y_high) x [x_low..x_high)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub y_low: usize,
    pub y_high: usize,
    pub x_low: usize,
    pub x_high: usize,
}

impl Window {
    pub fn new(y_low: usize, y_high: usize, x_low: usize, x_high: usize) -> Self {
        Self {
            y_low,
            y_high,
            x_low,
            x_high,
        }
    }

    pub fn height(&self) -> usize {
        self.y_high - self.y_low
    }

    pub fn width(&self) -> usize {
        self.x_high - self.x_low
    }

    pub fn contains(&self, other: &Window) -> bool {
        self.y_low <= other.y_low
            && other.y_high <= self.y_high
            && self.x_low <= other.x_low
            && other.x_high <= self.x_high
    }
}

/// Color/Bayer layout of the source data.
///
/// Bayer sources are consumed as raw single-plane data; demosaicing is the
/// decoder's business, not the stacking engine's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ColorMode {
    Mono,
    BayerRGGB,
    BayerGRBG,
    BayerGBRG,
    BayerBGGR,
    RGB,
    BGR,
}

impl ColorMode {
    pub fn channels(&self) -> usize {
        match self {
            ColorMode::RGB | ColorMode::BGR => 3,
            _ => 1,
        }
    }
}

/// Metadata about a frame source.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub frame_count: usize,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    /// Bit depth per plane of the decoded data (8 or 16).
    pub depth: u8,
    pub color_mode: ColorMode,
    pub observer: Option<String>,
    pub instrument: Option<String>,
    pub telescope: Option<String>,
}

/// Which plane (or weighting) to use when reducing a color frame to the
/// monochrome working view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MonoChannel {
    Red,
    #[default]
    Green,
    Blue,
    Luminance,
}

/// Reduce an original frame (h, w, c) to the 8-bit monochrome view.
///
/// 16-bit planes are downscaled by dropping the low byte; single-plane
/// sources ignore the channel selection.
pub fn to_mono(original: &Array3<u16>, depth: u8, channel: MonoChannel) -> Array2<u8> {
    let (h, w, c) = original.dim();
    let scale_shift = if depth > 8 { depth - 8 } else { 0 };
    let mut mono = Array2::<u8>::zeros((h, w));

    for row in 0..h {
        for col in 0..w {
            let value = if c == 1 {
                original[[row, col, 0]] as u32
            } else {
                match channel {
                    MonoChannel::Red => original[[row, col, 0]] as u32,
                    MonoChannel::Green => original[[row, col, 1]] as u32,
                    MonoChannel::Blue => original[[row, col, 2]] as u32,
                    MonoChannel::Luminance => {
                        // Rec. 601 integer weights, /256.
                        (77 * original[[row, col, 0]] as u32
                            + 150 * original[[row, col, 1]] as u32
                            + 29 * original[[row, col, 2]] as u32)
                            >> 8
                    }
                }
            };
            mono[[row, col]] = (value >> scale_shift).min(255) as u8;
        }
    }

    mono
}

/// Gaussian-blur the monochrome view with an odd kernel of `gauss_width`.
pub fn to_blurred(mono: &Array2<u8>, gauss_width: usize) -> Array2<u8> {
    gaussian_blur_u8(mono, gauss_width)
}

/// Absolute Laplacian of the blurred view, sampled on a stride-2 grid.
///
/// The Laplacian is computed on the subsampled image with the 3x3 kernel
/// [[0,1,0],[1,-4,1],[0,1,0]] and clamped into 8 bits.
pub fn to_laplacian_ds(blurred: &Array2<u8>) -> Array2<u8> {
    let (h, w) = blurred.dim();
    let stride = LAPLACIAN_STRIDE;
    let sh = h.div_ceil(stride);
    let sw = w.div_ceil(stride);

    let mut sub = Array2::<i32>::zeros((sh, sw));
    for row in 0..sh {
        for col in 0..sw {
            sub[[row, col]] = blurred[[row * stride, col * stride]] as i32;
        }
    }

    let mut result = Array2::<u8>::zeros((sh, sw));
    if sh < 3 || sw < 3 {
        return result;
    }
    for row in 1..sh - 1 {
        for col in 1..sw - 1 {
            let lap = sub[[row - 1, col]] + sub[[row + 1, col]] + sub[[row, col - 1]]
                + sub[[row, col + 1]]
                - 4 * sub[[row, col]];
            result[[row, col]] = lap.abs().min(255) as u8;
        }
    }

    result
}
