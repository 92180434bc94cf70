use serde::{Deserialize, Serialize};

use crate::align::global::AlignMode;
use crate::align::local::ApMethod;
use crate::error::{ProcyonError, Result};
use crate::frame::MonoChannel;
use crate::quality::rank::RankMethod;
use crate::store::BufferingConfig;

/// Full stacking configuration. Immutable once the pipeline starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Channel (or weighting) for the monochrome working view.
    pub mono_channel: MonoChannel,
    /// Odd width of the Gaussian blur kernel.
    pub gauss_width: usize,
    /// Global sharpness scoring function.
    pub ranker_method: RankMethod,
    /// Subsampling stride of the local-contrast frame score.
    pub rank_stride: usize,
    /// Global registration model.
    pub align_mode: AlignMode,
    /// The anchor rectangle is 1/scale of the frame in each direction.
    pub align_rect_scale: usize,
    /// Expected global shift magnitude; the anchor window grows by this.
    pub align_search_width: usize,
    /// Frames with |global shift| above this are excluded.
    pub max_shift: usize,
    /// Percentage of best frames averaged into the reference.
    pub reference_percent: f64,
    /// Half-width of the alignment point correlation box.
    pub ap_box_half_width: usize,
    /// Half-width of the alignment point stacking patch.
    pub ap_patch_half_width: usize,
    /// Minimum max-normalized structure for an alignment point to survive.
    pub ap_structure_threshold: f64,
    /// Minimum peak brightness for an alignment point to survive.
    pub ap_brightness_threshold: u8,
    /// Local shift search radius.
    pub ap_search_width: usize,
    /// Local shift measurement technique.
    pub ap_method: ApMethod,
    /// Quadratic sub-pixel refinement of the local search minimum.
    pub ap_subpixel: bool,
    /// Subsampling stride of the per-point frame quality score.
    pub ap_quality_stride: usize,
    /// Percentage of locally best frames stacked at each point.
    pub stack_percent: f64,
    /// Absolute stack size; overrides `stack_percent` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_number: Option<usize>,
    /// Retention policy of the derived frame views.
    pub buffering: BufferingConfig,
    /// Worker threads of the pipeline-owned pool (0 = all cores). FFTs run
    /// inside the same pool, so outer parallelism bounds FFT parallelism.
    pub threads: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            mono_channel: MonoChannel::Green,
            gauss_width: 7,
            ranker_method: RankMethod::Contrast,
            rank_stride: 2,
            align_mode: AlignMode::Surface,
            align_rect_scale: 3,
            align_search_width: 14,
            max_shift: 100,
            reference_percent: 5.0,
            ap_box_half_width: 24,
            ap_patch_half_width: 48,
            ap_structure_threshold: 0.04,
            ap_brightness_threshold: 10,
            ap_search_width: 14,
            ap_method: ApMethod::LocalSearch,
            ap_subpixel: true,
            ap_quality_stride: 2,
            stack_percent: 10.0,
            stack_number: None,
            buffering: BufferingConfig::default(),
            threads: 0,
        }
    }
}

impl StackConfig {
    /// Check every parameter against its valid range.
    pub fn validate(&self) -> Result<()> {
        fn invalid(parameter: &'static str, message: impl Into<String>) -> ProcyonError {
            ProcyonError::Config {
                parameter,
                message: message.into(),
            }
        }

        if self.gauss_width < 3 || self.gauss_width % 2 == 0 {
            return Err(invalid(
                "gauss_width",
                format!("must be an odd integer >= 3, got {}", self.gauss_width),
            ));
        }
        if self.rank_stride == 0 {
            return Err(invalid("rank_stride", "must be >= 1"));
        }
        if self.align_rect_scale < 2 {
            return Err(invalid(
                "align_rect_scale",
                format!("must be >= 2, got {}", self.align_rect_scale),
            ));
        }
        if !(0.0..=100.0).contains(&self.reference_percent) || self.reference_percent == 0.0 {
            return Err(invalid(
                "reference_percent",
                format!("must be in (0, 100], got {}", self.reference_percent),
            ));
        }
        if self.ap_box_half_width == 0 {
            return Err(invalid("ap_box_half_width", "must be >= 1"));
        }
        if self.ap_patch_half_width < self.ap_box_half_width + self.ap_search_width {
            return Err(invalid(
                "ap_patch_half_width",
                format!(
                    "must be >= ap_box_half_width + ap_search_width ({} + {})",
                    self.ap_box_half_width, self.ap_search_width
                ),
            ));
        }
        if !(0.0..1.0).contains(&self.ap_structure_threshold) {
            return Err(invalid(
                "ap_structure_threshold",
                format!("must be in [0, 1), got {}", self.ap_structure_threshold),
            ));
        }
        if self.ap_search_width == 0 {
            return Err(invalid("ap_search_width", "must be >= 1"));
        }
        if self.ap_quality_stride == 0 {
            return Err(invalid("ap_quality_stride", "must be >= 1"));
        }
        if !(0.0..=100.0).contains(&self.stack_percent) || self.stack_percent == 0.0 {
            return Err(invalid(
                "stack_percent",
                format!("must be in (0, 100], got {}", self.stack_percent),
            ));
        }
        if self.stack_number == Some(0) {
            return Err(invalid("stack_number", "must be >= 1 when set"));
        }

        Ok(())
    }
}
