//! Test helpers for building synthetic frames.

use raydn_core::buffer::Buffer2D;
use raydn_core::frame::FrameInfo;
use raydn_core::geometry::*;
use raydn_core::raydn::*;

/// A view matrix that flips z, so surfaces at positive world z sit in
/// front of a camera looking down -z.
#[rustfmt::skip]
pub(crate) fn look_down_negative_z() -> Matrix4x4 {
    matrix4x4(
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, -1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Transforms for a frame whose world positions already are pixel
/// coordinates: world-to-screen is the identity, so reprojection maps
/// every pixel onto itself.
pub(crate) fn screen_aligned_matrices() -> Vec<Matrix4x4> {
    vec![look_down_negative_z(), IDENTITY_MATRIX]
}

/// Build a frame from per-pixel closures.
///
/// * `width`    - Frame width in pixels.
/// * `height`   - Frame height in pixels.
/// * `beauty`   - Beauty color per pixel.
/// * `normal`   - Surface normal per pixel.
/// * `position` - World position per pixel.
/// * `matrices` - Camera transforms for the frame.
pub(crate) fn build_frame(
    width: usize,
    height: usize,
    beauty: impl Fn(usize, usize) -> Vector3f,
    normal: impl Fn(usize, usize) -> Vector3f,
    position: impl Fn(usize, usize) -> Vector3f,
    matrices: Vec<Matrix4x4>,
) -> FrameInfo {
    let mut beauty_buffer = Buffer2D::new(width, height, Vector3f::zero());
    let mut normal_buffer = Buffer2D::new(width, height, Vector3f::zero());
    let mut position_buffer = Buffer2D::new(width, height, Vector3f::zero());

    for y in 0..height {
        for x in 0..width {
            beauty_buffer.set(x, y, beauty(x, y));
            normal_buffer.set(x, y, normal(x, y));
            position_buffer.set(x, y, position(x, y));
        }
    }

    FrameInfo::new(beauty_buffer, normal_buffer, position_buffer, matrices)
}

/// Build a flat screen-aligned frame: unit normals facing the camera,
/// world positions equal to pixel coordinates at depth 1, identity
/// world-to-screen. Reprojection of such a frame onto itself is exact.
///
/// * `width`  - Frame width in pixels.
/// * `height` - Frame height in pixels.
/// * `beauty` - Beauty color per pixel.
pub(crate) fn screen_aligned_frame(
    width: usize,
    height: usize,
    beauty: impl Fn(usize, usize) -> Vector3f,
) -> FrameInfo {
    build_frame(
        width,
        height,
        beauty,
        |_, _| Vector3f::new(0.0, 0.0, 1.0),
        |x, y| Vector3f::new(x as Float, y as Float, 1.0),
        screen_aligned_matrices(),
    )
}
