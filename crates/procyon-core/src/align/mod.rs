pub mod correlation;
pub mod global;
pub mod local;
pub mod planet;
pub mod subpixel;

pub use correlation::translation;
pub use global::{
    compute_intersection, compute_shifts, select_alignment_rect, AlignMode, GlobalAlignment,
};
pub use local::{measure_local_shift, ApMethod, LocalShift};
