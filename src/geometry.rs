use crate::chess::Square;
use crate::error::DetectionError;
use imageproc::geometric_transformations::Projection;
use tracing::trace;

/// Maps frame pixels onto board squares through a perspective transform
/// fitted to the four calibrated board corners.
#[derive(Debug, Clone)]
pub struct BoardGeometry {
    /// Frame pixels to board units, 0..8 on both axes
    to_board: Projection,
}

impl BoardGeometry {
    /// Fit the geometry from frame-pixel corners in the order a8, h8, h1, a1
    /// (the board's top-left, top-right, bottom-right and bottom-left as seen
    /// from White).
    pub fn from_corners(corners: [[f32; 2]; 4]) -> Result<Self, DetectionError> {
        let degenerate = || DetectionError::InvalidCalibration {
            details: format!("degenerate board corners {:?}", corners),
        };

        // Any three corners on one line leave the quadrilateral without area
        for skip in 0..4 {
            let rest: Vec<&[f32; 2]> = corners
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, corner)| corner)
                .collect();
            let (a, b, c) = (rest[0], rest[1], rest[2]);
            let twice_area = (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1]);
            if twice_area.abs() < 1e-3 {
                return Err(degenerate());
            }
        }

        let from = corners.map(|[x, y]| (x, y));
        let to = [(0.0, 0.0), (8.0, 0.0), (8.0, 8.0), (0.0, 8.0)];
        let to_board = Projection::from_control_points(from, to).ok_or_else(degenerate)?;

        Ok(Self { to_board })
    }

    /// Geometry for a board that exactly fills a `width` x `height` frame
    pub fn axis_aligned(width: u32, height: u32) -> Result<Self, DetectionError> {
        let (w, h) = (width as f32, height as f32);
        Self::from_corners([[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]])
    }

    /// Project a frame pixel into board units; `(0, 0)` is a8's outer corner
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        self.to_board * (x, y)
    }

    /// Square under a frame pixel, or `None` when the point is off the board
    pub fn square_at(&self, x: f32, y: f32) -> Option<Square> {
        let (u, v) = self.project(x, y);
        if !(0.0..8.0).contains(&u) || !(0.0..8.0).contains(&v) {
            trace!("Point ({:.1}, {:.1}) maps off-board to ({:.2}, {:.2})", x, y, u, v);
            return None;
        }
        Square::new(u.floor() as u8, 7 - v.floor() as u8)
    }
}
