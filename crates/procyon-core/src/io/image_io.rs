use std::path::Path;

use image::{ImageFormat, Luma, Rgb};
use ndarray::Array3;

use crate::error::{ProcyonError, Result};

/// Save a stacked (h, w, c) 16-bit image as grayscale or RGB TIFF.
pub fn save_tiff(data: &Array3<u16>, path: &Path) -> Result<()> {
    save_with_format(data, path, ImageFormat::Tiff)
}

/// Save a stacked (h, w, c) 16-bit image as grayscale or RGB PNG.
pub fn save_png(data: &Array3<u16>, path: &Path) -> Result<()> {
    save_with_format(data, path, ImageFormat::Png)
}

/// Save a stacked image, choosing the format from the file extension.
pub fn save_image(data: &Array3<u16>, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => save_png(data, path),
        _ => save_tiff(data, path),
    }
}

fn save_with_format(data: &Array3<u16>, path: &Path, format: ImageFormat) -> Result<()> {
    let (h, w, c) = data.dim();

    match c {
        1 => {
            let mut pixels: Vec<u16> = Vec::with_capacity(h * w);
            for row in 0..h {
                for col in 0..w {
                    pixels.push(data[[row, col, 0]]);
                }
            }
            let img =
                image::ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
                    .expect("buffer size matches dimensions");
            img.save_with_format(path, format)?;
        }
        3 => {
            let mut pixels: Vec<u16> = Vec::with_capacity(h * w * 3);
            for row in 0..h {
                for col in 0..w {
                    for plane in 0..3 {
                        pixels.push(data[[row, col, plane]]);
                    }
                }
            }
            let img =
                image::ImageBuffer::<Rgb<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
                    .expect("buffer size matches dimensions");
            img.save_with_format(path, format)?;
        }
        other => {
            return Err(ProcyonError::Internal(format!(
                "cannot save image with {other} channels"
            )));
        }
    }

    Ok(())
}
