//! View framing for the loaded scene.
//!
//! There is no scene graph and no camera controller: the view simply looks at the
//! bounding box of everything that was imported.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, SquareMatrix, Vector3};

/// Bind group index of the per-frame group.
pub const FRAME_GROUP: u32 = 0;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    pub fn from_points(points: impl IntoIterator<Item = [f32; 3]>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self { min: first, max: first }, |acc, p| Self {
            min: [acc.min[0].min(p[0]), acc.min[1].min(p[1]), acc.min[2].min(p[2])],
            max: [acc.max[0].max(p[0]), acc.max[1].max(p[1]), acc.max[2].max(p[2])],
        }))
    }

    pub fn union(self, other: Self) -> Self {
        Self::from_points([self.min, self.max, other.min, other.max]).unwrap_or(self)
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::from(self.min).midpoint(Point3::from(self.max))
    }

    pub fn radius(&self) -> f32 {
        (Point3::from(self.max) - Point3::from(self.min)).magnitude() * 0.5
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniform {
    pub view_proj: [[f32; 4]; 4],
}

impl FrameUniform {
    pub fn new() -> Self {
        Self {
            view_proj: Matrix4::identity().into(),
        }
    }

    /// Look at `bounds` from the front and slightly above with a 45° field of view.
    pub fn framing(bounds: Option<Aabb>, aspect: f32) -> Self {
        let Some(bounds) = bounds else {
            return Self::new();
        };
        let center = bounds.center();
        let radius = bounds.radius().max(0.01);
        let fovy = cgmath::Deg(45.0f32);
        // distance at which a sphere of `radius` fits the vertical field of view
        let distance = radius / (fovy.0.to_radians() * 0.5).sin();
        let eye = center + Vector3::new(0.0, 0.35, 1.0).normalize() * distance;
        let view = Matrix4::look_at_rh(eye, center, Vector3::unit_y());
        let proj = cgmath::perspective(fovy, aspect.max(f32::EPSILON), distance * 0.01, distance + radius * 2.0);
        Self {
            view_proj: (OPENGL_TO_WGPU_MATRIX * proj * view).into(),
        }
    }
}

impl Default for FrameUniform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Vector4;

    use super::*;

    #[test]
    fn bounds_cover_all_points() {
        let aabb = Aabb::from_points([[1.0, -2.0, 0.0], [-1.0, 3.0, 5.0], [0.0, 0.0, -4.0]]).unwrap();
        assert_eq!(aabb.min, [-1.0, -2.0, -4.0]);
        assert_eq!(aabb.max, [1.0, 3.0, 5.0]);
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn framed_center_lands_inside_clip_space() {
        let aabb = Aabb::from_points([[-2.0, -1.0, -3.0], [4.0, 5.0, 1.0]]).unwrap();
        let uniform = FrameUniform::framing(Some(aabb), 4.0 / 3.0);
        let m = Matrix4::from(uniform.view_proj);
        let c = aabb.center();
        let clip = m * Vector4::new(c.x, c.y, c.z, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-3 && ndc.y.abs() < 1e-3);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn framed_box_corners_stay_in_view() {
        let aabb = Aabb::from_points([[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]).unwrap();
        let m = Matrix4::from(FrameUniform::framing(Some(aabb), 1.0).view_proj);
        for i in 0..8 {
            let pick = |axis: usize| if i & (1 << axis) == 0 { aabb.min[axis] } else { aabb.max[axis] };
            let clip = m * Vector4::new(pick(0), pick(1), pick(2), 1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0, "corner {i} at {ndc:?}");
            assert!(ndc.z > 0.0 && ndc.z < 1.0);
        }
    }
}
