pub mod ap_grid;
pub mod ap_rank;
pub mod reference;
pub mod stacker;

pub use ap_grid::{place_alignment_points, AlignmentPoint, ApGrid};
pub use ap_rank::{compute_frame_qualities, ApFrameEntry, ApSelection};
pub use reference::build_reference;
pub use stacker::{stack_frames, StackedImage};
