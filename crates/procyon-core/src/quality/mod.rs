pub mod contrast;
pub mod rank;

pub use contrast::{local_contrast, quality_measure};
pub use rank::{rank_frames, FrameRanking, RankMethod};
