//! Grade rounding, shared with the gradebook utility

pub const LOWEST_GRADE: f64 = 1.0;
pub const HIGHEST_GRADE: f64 = 6.0;

/// Round a grade to the nearest quarter, within `[1.0, 6.0]`.
/// `NaN` is treated as the lowest grade.
pub fn round_grade(grade: f64) -> f64 {
    if grade.is_nan() {
        return LOWEST_GRADE;
    }
    ((grade * 4.0).round() / 4.0).clamp(LOWEST_GRADE, HIGHEST_GRADE)
}
