//! Orthographic projection and letterbox math.
//!
//! The game simulates in a fixed logical size. The projection maps that
//! logical space with a top-left origin and y growing downward; the letterbox
//! fits the largest box with the game's aspect ratio into the window and
//! centers it, and the engine applies the box as the render-pass viewport.

use glam::Mat4;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProjectionUniform {
    pub view_proj: [[f32; 4]; 4],
}

impl ProjectionUniform {
    pub fn from_matrix(matrix: Mat4) -> Self {
        Self {
            view_proj: matrix.to_cols_array_2d(),
        }
    }
}

/// Top-left-origin orthographic projection over the logical game size. The
/// wide depth range keeps authored z values usable for draw ordering without
/// clipping.
pub fn ortho_projection(width: f32, height: f32) -> Mat4 {
    Mat4::orthographic_rh(0.0, width, height, 0.0, -100.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxLayout {
    pub width: f32,
    pub height: f32,
    pub margin_x: f32,
    pub margin_y: f32,
}

/// Largest aspect-correct box that fits in the window, centered. A window
/// wider than the game gets pillarbox margins left and right, a taller one
/// gets bars above and below.
pub fn compute_letterbox(window_width: f32, window_height: f32, aspect: f32) -> LetterboxLayout {
    let mut width = window_width;
    let mut height = window_height;

    if window_width / window_height > aspect {
        width = height * aspect;
    } else {
        height = width / aspect;
    }

    LetterboxLayout {
        width,
        height,
        margin_x: (window_width - width) / 2.0,
        margin_y: (window_height - height) / 2.0,
    }
}
