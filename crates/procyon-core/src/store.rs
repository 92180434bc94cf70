use std::sync::{Arc, OnceLock};

use ndarray::{Array2, Array3};
use tracing::warn;

use crate::error::{ProcyonError, Result};
use crate::frame::{to_blurred, to_laplacian_ds, to_mono, MonoChannel, SourceInfo};
use crate::io::source::FrameSource;

/// Retention policy for one derived frame view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ViewPolicy {
    /// Compute once, keep in memory for the rest of the run.
    #[default]
    Retain,
    /// Recompute from the original on every access. Trades CPU for memory.
    Recompute,
}

/// Per-view retention policies. Originals are always retained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BufferingConfig {
    pub mono: ViewPolicy,
    pub blurred: ViewPolicy,
    pub laplacian: ViewPolicy,
}

impl BufferingConfig {
    /// Recompute every derived view on demand (the low-memory mode).
    pub fn recompute_all() -> Self {
        Self {
            mono: ViewPolicy::Recompute,
            blurred: ViewPolicy::Recompute,
            laplacian: ViewPolicy::Recompute,
        }
    }
}

struct ViewSlots {
    policy: ViewPolicy,
    slots: Vec<OnceLock<Arc<Array2<u8>>>>,
}

impl ViewSlots {
    fn new(policy: ViewPolicy, count: usize) -> Self {
        let mut slots = Vec::with_capacity(count);
        slots.resize_with(count, OnceLock::new);
        Self { policy, slots }
    }

    fn get_or_compute(
        &self,
        index: usize,
        compute: impl FnOnce() -> Result<Arc<Array2<u8>>>,
    ) -> Result<Arc<Array2<u8>>> {
        match self.policy {
            ViewPolicy::Recompute => compute(),
            ViewPolicy::Retain => {
                if let Some(cached) = self.slots[index].get() {
                    return Ok(cached.clone());
                }
                let computed = compute()?;
                // Another worker may have raced us; either value is identical.
                let _ = self.slots[index].set(computed.clone());
                Ok(self.slots[index].get().cloned().unwrap_or(computed))
            }
        }
    }
}

/// Uniform typed access to the original, monochrome, Gaussian-blurred and
/// Laplacian-downsampled versions of every frame.
///
/// Derived views are computed deterministically from the original, so the
/// retention policy can change without affecting any consumer.
pub struct FrameStore {
    info: SourceInfo,
    channel: MonoChannel,
    gauss_width: usize,
    originals: Vec<Option<Arc<Array3<u16>>>>,
    usable: Vec<bool>,
    mono: ViewSlots,
    blurred: ViewSlots,
    laplacian: ViewSlots,
}

impl FrameStore {
    /// Decode every frame of `source`.
    ///
    /// A frame that fails to decode, or whose shape disagrees with the source
    /// header, is flagged unusable with a warning rather than aborting the
    /// run. Fewer than 2 usable frames is fatal.
    ///
    /// `on_frame_done` is called with the number of frames decoded so far.
    pub fn from_source(
        source: &dyn FrameSource,
        channel: MonoChannel,
        gauss_width: usize,
        buffering: BufferingConfig,
        on_frame_done: impl Fn(usize),
    ) -> Result<Self> {
        let info = source.info().clone();
        let total = info.frame_count;
        if total == 0 {
            return Err(ProcyonError::EmptySequence);
        }

        let mut originals: Vec<Option<Arc<Array3<u16>>>> = Vec::with_capacity(total);
        let mut usable = vec![true; total];

        for index in 0..total {
            match source.read_frame(index) {
                Ok(frame) => {
                    let (h, w, c) = frame.dim();
                    if (h, w, c) != (info.height, info.width, info.channels) {
                        warn!(
                            frame = index,
                            "frame shape {h}x{w}x{c} disagrees with source header, excluding"
                        );
                        usable[index] = false;
                        originals.push(None);
                    } else {
                        originals.push(Some(Arc::new(frame)));
                    }
                }
                Err(err) => {
                    warn!(frame = index, error = %err, "failed to decode frame, excluding");
                    usable[index] = false;
                    originals.push(None);
                }
            }
            on_frame_done(index + 1);
        }

        let usable_count = usable.iter().filter(|&&u| u).count();
        if usable_count < 2 {
            return Err(ProcyonError::TooFewFrames {
                usable: usable_count,
            });
        }

        Ok(Self {
            info,
            channel,
            gauss_width,
            originals,
            usable,
            mono: ViewSlots::new(buffering.mono, total),
            blurred: ViewSlots::new(buffering.blurred, total),
            laplacian: ViewSlots::new(buffering.laplacian, total),
        })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn frame_count(&self) -> usize {
        self.originals.len()
    }

    /// Whether the frame decoded cleanly.
    pub fn is_usable(&self, index: usize) -> bool {
        self.usable.get(index).copied().unwrap_or(false)
    }

    pub fn usable_indices(&self) -> Vec<usize> {
        (0..self.frame_count())
            .filter(|&i| self.usable[i])
            .collect()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.originals.len() {
            return Err(ProcyonError::FrameIndexOutOfRange {
                index,
                total: self.originals.len(),
            });
        }
        Ok(())
    }

    /// The original frame as delivered by the decoder, shape (h, w, c).
    pub fn original(&self, index: usize) -> Result<Arc<Array3<u16>>> {
        self.check_index(index)?;
        self.originals[index]
            .clone()
            .ok_or(ProcyonError::FrameUnusable { index })
    }

    /// 8-bit monochrome view.
    pub fn mono(&self, index: usize) -> Result<Arc<Array2<u8>>> {
        self.check_index(index)?;
        self.mono.get_or_compute(index, || {
            let original = self.original(index)?;
            Ok(Arc::new(to_mono(&original, self.info.depth, self.channel)))
        })
    }

    /// Gaussian-blurred monochrome view.
    pub fn blurred(&self, index: usize) -> Result<Arc<Array2<u8>>> {
        self.check_index(index)?;
        self.blurred.get_or_compute(index, || {
            let mono = self.mono(index)?;
            Ok(Arc::new(to_blurred(&mono, self.gauss_width)))
        })
    }

    /// Absolute Laplacian of the blurred view on a stride-2 grid.
    pub fn laplacian_ds(&self, index: usize) -> Result<Arc<Array2<u8>>> {
        self.check_index(index)?;
        self.laplacian.get_or_compute(index, || {
            let blurred = self.blurred(index)?;
            Ok(Arc::new(to_laplacian_ds(&blurred)))
        })
    }
}
