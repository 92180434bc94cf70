use std::path::{Path, PathBuf};

use image::DynamicImage;
use ndarray::Array3;

use crate::error::{ProcyonError, Result};
use crate::frame::{ColorMode, SourceInfo};
use crate::io::source::FrameSource;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "tif", "tiff", "jpg", "jpeg", "bmp"];

/// A directory of still images in lexicographic (chronological) order.
///
/// All images must share one shape, channel count and bit depth; the first
/// image defines the expectation and any disagreement is an input error.
pub struct ImageSetReader {
    paths: Vec<PathBuf>,
    info: SourceInfo,
}

impl ImageSetReader {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.iter().any(|k| ext.eq_ignore_ascii_case(k)))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(ProcyonError::EmptySequence);
        }

        let first = image::open(&paths[0])?;
        let (channels, depth) = classify(&first);
        let info = SourceInfo {
            path: dir.to_path_buf(),
            frame_count: paths.len(),
            width: first.width() as usize,
            height: first.height() as usize,
            channels,
            depth,
            color_mode: if channels == 3 {
                ColorMode::RGB
            } else {
                ColorMode::Mono
            },
            observer: None,
            instrument: None,
            telescope: None,
        };

        Ok(Self { paths, info })
    }
}

impl FrameSource for ImageSetReader {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_frame(&self, index: usize) -> Result<Array3<u16>> {
        let path = self
            .paths
            .get(index)
            .ok_or(ProcyonError::FrameIndexOutOfRange {
                index,
                total: self.paths.len(),
            })?;
        let img = image::open(path)?;

        let (channels, depth) = classify(&img);
        if (img.height() as usize, img.width() as usize, channels, depth)
            != (self.info.height, self.info.width, self.info.channels, self.info.depth)
        {
            return Err(ProcyonError::InconsistentSource(format!(
                "'{}' does not match the first image's shape/depth",
                path.display()
            )));
        }

        Ok(decode(&img, self.info.channels, self.info.depth))
    }
}

/// Channel count and bit depth of a decoded image.
fn classify(img: &DynamicImage) -> (usize, u8) {
    use image::DynamicImage::*;
    match img {
        ImageLuma8(_) | ImageLumaA8(_) => (1, 8),
        ImageLuma16(_) | ImageLumaA16(_) => (1, 16),
        ImageRgb16(_) | ImageRgba16(_) | ImageRgb32F(_) | ImageRgba32F(_) => (3, 16),
        _ => (3, 8),
    }
}

fn decode(img: &DynamicImage, channels: usize, depth: u8) -> Array3<u16> {
    let h = img.height() as usize;
    let w = img.width() as usize;
    let mut frame = Array3::<u16>::zeros((h, w, channels));

    match (channels, depth) {
        (1, 8) => {
            let gray = img.to_luma8();
            for (row, col, pixel) in gray
                .enumerate_pixels()
                .map(|(x, y, p)| (y as usize, x as usize, p))
            {
                frame[[row, col, 0]] = pixel.0[0] as u16;
            }
        }
        (1, _) => {
            let gray = img.to_luma16();
            for (x, y, pixel) in gray.enumerate_pixels() {
                frame[[y as usize, x as usize, 0]] = pixel.0[0];
            }
        }
        (_, 8) => {
            let rgb = img.to_rgb8();
            for (x, y, pixel) in rgb.enumerate_pixels() {
                for plane in 0..3 {
                    frame[[y as usize, x as usize, plane]] = pixel.0[plane] as u16;
                }
            }
        }
        _ => {
            let rgb = img.to_rgb16();
            for (x, y, pixel) in rgb.enumerate_pixels() {
                for plane in 0..3 {
                    frame[[y as usize, x as usize, plane]] = pixel.0[plane];
                }
            }
        }
    }

    frame
}
