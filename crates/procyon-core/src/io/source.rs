use std::path::Path;

use ndarray::Array3;

use crate::error::{ProcyonError, Result};
use crate::frame::SourceInfo;
use crate::io::image_set::ImageSetReader;
use crate::io::ser::SerReader;

/// A producer of decoded frames.
///
/// Implementations must be safe to read from multiple threads; the pipeline
/// decodes sequentially but recomputes views concurrently.
pub trait FrameSource: Send + Sync {
    fn info(&self) -> &SourceInfo;

    /// Decode frame `index` as (height, width, channels) in the source depth.
    fn read_frame(&self, index: usize) -> Result<Array3<u16>>;
}

/// Open a frame source by path: a `.ser` raw video, or a directory of
/// ordered still images.
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>> {
    if path.is_dir() {
        return Ok(Box::new(ImageSetReader::open(path)?));
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("ser") => Ok(Box::new(SerReader::open(path)?)),
        _ => Err(ProcyonError::InconsistentSource(format!(
            "unsupported source '{}': expected a .ser file or an image directory",
            path.display()
        ))),
    }
}
