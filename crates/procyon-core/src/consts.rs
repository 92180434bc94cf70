/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum frame count to use frame-level Rayon parallelism.
pub const PARALLEL_FRAME_THRESHOLD: usize = 4;

/// Subsampling stride of the downsampled-Laplacian frame view.
pub const LAPLACIAN_STRIDE: usize = 2;

/// Initial value of the per-pixel contribution counter. Keeps the final
/// normalization well-defined at pixels no alignment-point patch covers.
pub const COUNTER_EPSILON: f32 = 1e-4;

/// Added to the spectral magnitude product in the normalized FFT
/// cross-correlation.
pub const CORRELATION_EPSILON: f64 = 1e-10;

/// Denominator threshold below which the sub-pixel quadratic fit is treated
/// as degenerate.
pub const SUBPIXEL_DEGENERACY_THRESHOLD: f64 = 1e-10;
