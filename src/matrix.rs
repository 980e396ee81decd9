//! Small helpers for working with 4x4 transform matrices.

use glam::{Mat4, Vec3};

/// Moves a matrix by the given amount along X, Y and Z.
///
/// The translation is applied on the right, so it happens in the matrix's
/// local frame: a matrix that scales by 2 moves twice as far in world space.
pub fn move_matrix(matrix: &mut Mat4, delta_x: f32, delta_y: f32, delta_z: f32) {
    let translation = Mat4::from_translation(Vec3::new(delta_x, delta_y, delta_z));
    *matrix *= translation;
}

/// Formats a matrix as its flat column-major array followed by a 4x4 table.
pub fn format_matrix(matrix: &Mat4) -> String {
    let values = matrix.to_cols_array();
    let mut out = format!("Matrix as array: {:?}\n", values);
    for row in values.chunks(4) {
        let cells: Vec<String> = row.iter().map(|v| format!("{:>10.4}", v)).collect();
        out.push_str(&format!("| {} |\n", cells.join(" ")));
    }
    out
}

/// Logs a matrix in a readable format.
pub fn print_matrix(matrix: &Mat4) {
    log::info!("{}", format_matrix(matrix));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_identity() {
        let mut m = Mat4::IDENTITY;
        move_matrix(&mut m, 1.0, 2.0, 3.0);
        assert_eq!(m.w_axis.truncate(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_move_is_local() {
        let mut m = Mat4::from_scale(Vec3::splat(2.0));
        move_matrix(&mut m, 1.0, 0.0, 0.0);
        assert_eq!(m.w_axis.truncate(), Vec3::new(2.0, 0.0, 0.0));

        let mut rotated = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
        move_matrix(&mut rotated, 1.0, 0.0, 0.0);
        let moved = rotated.w_axis.truncate();
        assert!(moved.x.abs() < 1e-5);
        assert!((moved.z + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_move_accumulates() {
        let mut m = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        move_matrix(&mut m, 0.0, 0.0, -1.0);
        move_matrix(&mut m, 0.0, 0.0, -1.0);
        assert_eq!(m.w_axis.truncate(), Vec3::new(5.0, 0.0, -2.0));
    }

    #[test]
    fn test_format_matrix_has_four_rows() {
        let text = format_matrix(&Mat4::IDENTITY);
        assert!(text.starts_with("Matrix as array:"));
        assert_eq!(text.lines().filter(|l| l.starts_with('|')).count(), 4);
    }

    #[test]
    fn test_print_matrix_without_logger() {
        // No logger installed in tests; logging must not panic
        print_matrix(&Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
    }
}
