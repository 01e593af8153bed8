//! Frame Info

use crate::buffer::Buffer2D;
use crate::geometry::{Matrix4x4, Point2, Vector3f};

/// A snapshot of one rendered frame: the noisy beauty image, the surface
/// normal and world position G-buffers, and the camera transforms the
/// renderer used to produce it.
///
/// The transform list is ordered; the last entry is the world-to-screen
/// matrix and the second to last is the world-to-camera matrix for this
/// frame. World-to-screen maps world space to pixel coordinates after the
/// homogeneous divide, and the camera looks down -z in camera space.
#[derive(Clone, Debug)]
pub struct FrameInfo {
    /// The noisy rendered color image.
    pub beauty: Buffer2D<Vector3f>,

    /// Surface normals. A zero normal marks a pixel with no surface.
    pub normal: Buffer2D<Vector3f>,

    /// World-space surface positions.
    pub position: Buffer2D<Vector3f>,

    /// Ordered camera transforms; see the struct docs for the layout.
    matrices: Vec<Matrix4x4>,
}

impl FrameInfo {
    /// Create a new `FrameInfo` instance.
    ///
    /// * `beauty`   - The noisy rendered color image.
    /// * `normal`   - Surface normal buffer of identical dimensions.
    /// * `position` - World position buffer of identical dimensions.
    /// * `matrices` - Ordered camera transforms ending with world-to-camera
    ///                then world-to-screen. At least those two entries are
    ///                required.
    pub fn new(
        beauty: Buffer2D<Vector3f>,
        normal: Buffer2D<Vector3f>,
        position: Buffer2D<Vector3f>,
        matrices: Vec<Matrix4x4>,
    ) -> Self {
        assert!(
            beauty.dimensions() == normal.dimensions() && beauty.dimensions() == position.dimensions(),
            "frame buffer dimensions disagree: beauty {}, normal {}, position {}",
            beauty.dimensions(),
            normal.dimensions(),
            position.dimensions()
        );
        assert!(
            matrices.len() >= 2,
            "frame needs world-to-camera and world-to-screen matrices, got {}",
            matrices.len()
        );
        Self {
            beauty,
            normal,
            position,
            matrices,
        }
    }

    /// Returns the frame width in pixels.
    pub fn width(&self) -> usize {
        self.beauty.width()
    }

    /// Returns the frame height in pixels.
    pub fn height(&self) -> usize {
        self.beauty.height()
    }

    /// Returns the frame dimensions as a point.
    pub fn dimensions(&self) -> Point2<usize> {
        self.beauty.dimensions()
    }

    /// Returns this frame's world-to-camera matrix.
    pub fn world_to_camera(&self) -> &Matrix4x4 {
        &self.matrices[self.matrices.len() - 2]
    }

    /// Returns this frame's world-to-screen matrix.
    pub fn world_to_screen(&self) -> &Matrix4x4 {
        &self.matrices[self.matrices.len() - 1]
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
