use crate::consts::SUBPIXEL_DEGENERACY_THRESHOLD;

/// Pseudoinverse of the design matrix for the 6-parameter quadratic
/// `f = a*x^2 + b*y^2 + c*x*y + d*x + e*y + g` sampled on the fixed 3x3
/// stencil (row-major, y then x in -1..=1). A constant matrix multiply keeps
/// the normal-equation solve exact; a general solver is not needed.
const FIT_MATRIX: [[f64; 9]; 6] = [
    [
        1.0 / 6.0,
        -1.0 / 3.0,
        1.0 / 6.0,
        1.0 / 6.0,
        -1.0 / 3.0,
        1.0 / 6.0,
        1.0 / 6.0,
        -1.0 / 3.0,
        1.0 / 6.0,
    ],
    [
        1.0 / 6.0,
        1.0 / 6.0,
        1.0 / 6.0,
        -1.0 / 3.0,
        -1.0 / 3.0,
        -1.0 / 3.0,
        1.0 / 6.0,
        1.0 / 6.0,
        1.0 / 6.0,
    ],
    [0.25, 0.0, -0.25, 0.0, 0.0, 0.0, -0.25, 0.0, 0.25],
    [
        -1.0 / 6.0,
        0.0,
        1.0 / 6.0,
        -1.0 / 6.0,
        0.0,
        1.0 / 6.0,
        -1.0 / 6.0,
        0.0,
        1.0 / 6.0,
    ],
    [
        -1.0 / 6.0,
        -1.0 / 6.0,
        -1.0 / 6.0,
        0.0,
        0.0,
        0.0,
        1.0 / 6.0,
        1.0 / 6.0,
        1.0 / 6.0,
    ],
    [
        -1.0 / 9.0,
        2.0 / 9.0,
        -1.0 / 9.0,
        2.0 / 9.0,
        5.0 / 9.0,
        2.0 / 9.0,
        -1.0 / 9.0,
        2.0 / 9.0,
        -1.0 / 9.0,
    ],
];

/// Locate the extremum of the quadratic fitted through the 3x3 neighbourhood
/// of a matching minimum.
///
/// `values` holds the matching differences at the stencil points in row-major
/// order. Returns `(y_correction, x_correction)` relative to the stencil
/// centre, or `None` when the fit is degenerate (the caller keeps the integer
/// minimum).
pub fn sub_pixel_solve(values: &[f64; 9]) -> Option<(f64, f64)> {
    let mut coefficients = [0.0f64; 6];
    for (row, out) in coefficients.iter_mut().enumerate() {
        *out = FIT_MATRIX[row]
            .iter()
            .zip(values.iter())
            .map(|(m, v)| m * v)
            .sum();
    }
    let [a, b, c, d, e, _g] = coefficients;

    // The extremum solves df/dx = df/dy = 0.
    let denominator = c * c - 4.0 * a * b;
    if denominator.abs() > SUBPIXEL_DEGENERACY_THRESHOLD
        && a.abs() > SUBPIXEL_DEGENERACY_THRESHOLD
    {
        let y_correction = (2.0 * a * e - c * d) / denominator;
        let x_correction = (-c * y_correction - d) / (2.0 * a);
        Some((y_correction, x_correction))
    } else if denominator.abs() > SUBPIXEL_DEGENERACY_THRESHOLD
        && c.abs() > SUBPIXEL_DEGENERACY_THRESHOLD
    {
        let y_correction = (2.0 * a * e - c * d) / denominator;
        let x_correction = (-2.0 * b * y_correction - e) / c;
        Some((y_correction, x_correction))
    } else {
        None
    }
}
