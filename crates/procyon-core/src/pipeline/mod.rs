pub mod config;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use tracing::info;

use crate::align::global::{compute_intersection, compute_shifts, GlobalAlignment};
use crate::error::{ProcyonError, Result};
use crate::frame::Window;
use crate::io::source::FrameSource;
use crate::quality::rank::{rank_frames, FrameRanking};
use crate::stack::ap_grid::{place_alignment_points, ApGrid};
use crate::stack::ap_rank::{compute_frame_qualities, ApSelection};
use crate::stack::reference::build_reference;
use crate::stack::stacker::{stack_frames, StackedImage};
use crate::store::FrameStore;

use self::config::StackConfig;

/// One step of the stacking pipeline. Activities form a strict sequence;
/// each one consumes results of its predecessors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activity {
    Read,
    Rank,
    Align,
    SetRoi,
    BuildReference,
    PlaceAps,
    ComputeFrameQualities,
    Stack,
    Emit,
}

impl Activity {
    pub fn name(&self) -> &'static str {
        match self {
            Activity::Read => "read",
            Activity::Rank => "rank",
            Activity::Align => "align",
            Activity::SetRoi => "set_roi",
            Activity::BuildReference => "build_reference",
            Activity::PlaceAps => "place_aps",
            Activity::ComputeFrameQualities => "compute_frame_qualities",
            Activity::Stack => "stack",
            Activity::Emit => "emit",
        }
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Non-blocking progress sink. The default implementation ignores reports.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, _activity: Activity, _percent: u8) {}
}

/// Reporter used when the caller does not care about progress.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Cooperative cancellation flag, checked at frame/point boundaries.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ProcyonError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Run the whole pipeline on a frame source and return the stacked image.
pub fn stack(
    source: &dyn FrameSource,
    config: &StackConfig,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancelToken,
) -> Result<StackedImage> {
    let mut pipeline = StackPipeline::new(config.clone(), reporter, cancel.clone())?;
    pipeline.run(source)
}

/// The resumable stacking pipeline.
///
/// Activities are individually callable; invoking one before its predecessor
/// has run yields an `Ordering` error naming both. Fatal errors are
/// annotated with the activity they occurred in so callers can correct
/// parameters and resume from that activity.
pub struct StackPipeline {
    config: StackConfig,
    pool: rayon::ThreadPool,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancelToken,
    store: Option<FrameStore>,
    ranking: Option<FrameRanking>,
    alignment: Option<GlobalAlignment>,
    intersection: Option<Window>,
    reference: Option<Array2<u8>>,
    grid: Option<ApGrid>,
    selection: Option<ApSelection>,
    stacked: Option<StackedImage>,
    excluded: Vec<usize>,
}

fn require<'a, T>(field: &'a Option<T>, activity: Activity, needed: Activity) -> Result<&'a T> {
    field.as_ref().ok_or_else(|| {
        ProcyonError::Ordering(format!("'{activity}' invoked before '{needed}'"))
    })
}

impl StackPipeline {
    pub fn new(
        config: StackConfig,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancelToken,
    ) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| ProcyonError::Internal(format!("failed to build thread pool: {e}")))?;

        Ok(Self {
            config,
            pool,
            reporter,
            cancel,
            store: None,
            ranking: None,
            alignment: None,
            intersection: None,
            reference: None,
            grid: None,
            selection: None,
            stacked: None,
            excluded: Vec::new(),
        })
    }

    /// Run every activity in order and emit the stacked image.
    pub fn run(&mut self, source: &dyn FrameSource) -> Result<StackedImage> {
        self.read(source)?;
        self.rank()?;
        self.align()?;
        self.set_roi()?;
        self.build_reference()?;
        self.place_aps()?;
        self.compute_frame_qualities()?;
        self.stack()?;
        self.emit()
    }

    fn progress_fn(&self, activity: Activity, total: usize) -> impl Fn(usize) + Send + Sync {
        let reporter = self.reporter.clone();
        move |done| {
            let percent = if total > 0 { done * 100 / total } else { 100 };
            reporter.report(activity, percent.min(100) as u8);
        }
    }

    /// Decode all frames from the source.
    pub fn read(&mut self, source: &dyn FrameSource) -> Result<()> {
        let activity = Activity::Read;
        self.cancel.checkpoint()?;

        let total = source.info().frame_count;
        let on_done = self.progress_fn(activity, total);
        let store = FrameStore::from_source(
            source,
            self.config.mono_channel,
            self.config.gauss_width,
            self.config.buffering,
            on_done,
        )
        .map_err(|e| e.in_activity(activity.name()))?;

        info!(
            frames = store.frame_count(),
            usable = store.usable_indices().len(),
            "source read"
        );
        self.store = Some(store);
        Ok(())
    }

    /// Score every frame globally and pick the anchor.
    pub fn rank(&mut self) -> Result<()> {
        let activity = Activity::Rank;
        self.cancel.checkpoint()?;
        let store = require(&self.store, activity, Activity::Read)?;

        let total = store.frame_count();
        let ranking = self
            .pool
            .install(|| {
                rank_frames(
                    store,
                    self.config.ranker_method,
                    self.config.rank_stride,
                    self.progress_fn(activity, total),
                )
            })
            .map_err(|e| e.in_activity(activity.name()))?;

        self.ranking = Some(ranking);
        Ok(())
    }

    /// Register every frame against the anchor.
    pub fn align(&mut self) -> Result<()> {
        let activity = Activity::Align;
        self.cancel.checkpoint()?;
        let store = require(&self.store, activity, Activity::Read)?;
        let ranking = require(&self.ranking, activity, Activity::Rank)?;

        let total = store.frame_count();
        let alignment = self
            .pool
            .install(|| {
                compute_shifts(
                    store,
                    ranking,
                    self.config.align_mode,
                    self.config.align_rect_scale,
                    self.config.align_search_width,
                    self.progress_fn(activity, total),
                )
            })
            .map_err(|e| e.in_activity(activity.name()))?;

        self.alignment = Some(alignment);
        Ok(())
    }

    /// Apply the shift-outlier exclusion and compute the common intersection.
    pub fn set_roi(&mut self) -> Result<()> {
        let activity = Activity::SetRoi;
        self.cancel.checkpoint()?;
        let store = require(&self.store, activity, Activity::Read)?;
        let shape = (store.info().height, store.info().width);
        let max_shift = self.config.max_shift;
        let alignment = match self.alignment.as_mut() {
            Some(alignment) => alignment,
            None => {
                return Err(ProcyonError::Ordering(format!(
                    "'{activity}' invoked before '{}'",
                    Activity::Align
                )))
            }
        };

        let intersection = compute_intersection(alignment, shape, max_shift)
            .map_err(|e| e.in_activity(activity.name()))?;
        self.excluded = alignment
            .excluded
            .iter()
            .enumerate()
            .filter_map(|(i, &e)| e.then_some(i))
            .collect();
        self.reporter.report(activity, 100);
        self.intersection = Some(intersection);
        Ok(())
    }

    /// Average the best aligned frames into the reference image.
    pub fn build_reference(&mut self) -> Result<()> {
        let activity = Activity::BuildReference;
        self.cancel.checkpoint()?;
        let store = require(&self.store, activity, Activity::Read)?;
        let ranking = require(&self.ranking, activity, Activity::Rank)?;
        let alignment = require(&self.alignment, activity, Activity::Align)?;
        let intersection = *require(&self.intersection, activity, Activity::SetRoi)?;

        let reference = self
            .pool
            .install(|| {
                build_reference(
                    store,
                    ranking,
                    alignment,
                    intersection,
                    self.config.reference_percent,
                )
            })
            .map_err(|e| e.in_activity(activity.name()))?;

        self.reporter.report(activity, 100);
        self.reference = Some(reference);
        Ok(())
    }

    /// Place the alignment point grid on the reference.
    pub fn place_aps(&mut self) -> Result<()> {
        let activity = Activity::PlaceAps;
        self.cancel.checkpoint()?;
        let reference = require(&self.reference, activity, Activity::BuildReference)?;

        let grid = place_alignment_points(
            reference,
            self.config.ap_box_half_width,
            self.config.ap_patch_half_width,
            self.config.ap_structure_threshold,
            self.config.ap_brightness_threshold,
        )
        .map_err(|e| e.in_activity(activity.name()))?;

        self.reporter.report(activity, 100);
        self.grid = Some(grid);
        Ok(())
    }

    /// Measure local shifts and select the locally sharpest frames per point.
    pub fn compute_frame_qualities(&mut self) -> Result<()> {
        let activity = Activity::ComputeFrameQualities;
        self.cancel.checkpoint()?;
        let store = require(&self.store, activity, Activity::Read)?;
        let reference = require(&self.reference, activity, Activity::BuildReference)?;
        let grid = require(&self.grid, activity, Activity::PlaceAps)?;
        let alignment = require(&self.alignment, activity, Activity::Align)?;
        let intersection = *require(&self.intersection, activity, Activity::SetRoi)?;

        let usable = alignment.excluded.iter().filter(|&&e| !e).count();
        let stack_size = self
            .config
            .stack_number
            .unwrap_or_else(|| {
                ((usable as f64 * self.config.stack_percent / 100.0).round() as usize).max(1)
            })
            .clamp(1, usable);

        let total = store.frame_count();
        let selection = self
            .pool
            .install(|| {
                compute_frame_qualities(
                    store,
                    reference,
                    grid,
                    alignment,
                    intersection,
                    self.config.ap_method,
                    self.config.ap_search_width,
                    self.config.ap_subpixel,
                    self.config.ap_quality_stride,
                    stack_size,
                    &self.cancel,
                    self.progress_fn(activity, total),
                )
            })
            .map_err(|e| e.in_activity(activity.name()))?;

        self.selection = Some(selection);
        Ok(())
    }

    /// Accumulate the de-warped patches and normalize the composite.
    pub fn stack(&mut self) -> Result<()> {
        let activity = Activity::Stack;
        self.cancel.checkpoint()?;
        let store = require(&self.store, activity, Activity::Read)?;
        let grid = require(&self.grid, activity, Activity::PlaceAps)?;
        let selection = require(
            &self.selection,
            activity,
            Activity::ComputeFrameQualities,
        )?;
        let alignment = require(&self.alignment, activity, Activity::Align)?;
        let intersection = *require(&self.intersection, activity, Activity::SetRoi)?;

        let total = grid.points.len();
        let stacked = self
            .pool
            .install(|| {
                stack_frames(
                    store,
                    grid,
                    selection,
                    alignment,
                    intersection,
                    &self.cancel,
                    self.progress_fn(activity, total),
                )
            })
            .map_err(|e| e.in_activity(activity.name()))?;

        self.stacked = Some(stacked);
        Ok(())
    }

    /// Hand over the stacked image and release all working buffers.
    pub fn emit(&mut self) -> Result<StackedImage> {
        let activity = Activity::Emit;
        self.cancel.checkpoint()?;
        let stacked = self.stacked.take().ok_or_else(|| {
            ProcyonError::Ordering(format!(
                "'{activity}' invoked before '{}'",
                Activity::Stack
            ))
        })?;

        self.store = None;
        self.ranking = None;
        self.alignment = None;
        self.intersection = None;
        self.reference = None;
        self.grid = None;
        self.selection = None;

        self.reporter.report(activity, 100);
        Ok(stacked)
    }

    /// The frames excluded from processing (decode failures and shift
    /// outliers).
    pub fn excluded_frames(&self) -> &[usize] {
        &self.excluded
    }

    pub fn ranking(&self) -> Option<&FrameRanking> {
        self.ranking.as_ref()
    }

    pub fn alignment(&self) -> Option<&GlobalAlignment> {
        self.alignment.as_ref()
    }

    pub fn intersection(&self) -> Option<Window> {
        self.intersection
    }

    pub fn reference_image(&self) -> Option<&Array2<u8>> {
        self.reference.as_ref()
    }

    pub fn grid(&self) -> Option<&ApGrid> {
        self.grid.as_ref()
    }

    pub fn selection(&self) -> Option<&ApSelection> {
        self.selection.as_ref()
    }
}
