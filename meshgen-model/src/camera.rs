//! Fixed input cameras of the six generated views.
//!
//! The multi-view images come from a diffusion model that always renders the
//! object from the same six poses: azimuths every 60 degrees starting at 30,
//! elevations alternating between 20 and -10 degrees, looking at the origin
//! of a z-up world.

use candle_core::{Device, Tensor};
use glam::{Mat4, Vec3, Vec4};

/// Number of input views the network consumes.
pub const NUM_VIEWS: usize = 6;

/// Azimuth of each input view, in degrees.
pub const VIEW_AZIMUTHS: [f32; NUM_VIEWS] = [30.0, 90.0, 150.0, 210.0, 270.0, 330.0];

/// Elevation of each input view, in degrees.
pub const VIEW_ELEVATIONS: [f32; NUM_VIEWS] = [20.0, -10.0, 20.0, -10.0, 20.0, -10.0];

/// Length of one flattened camera: 3x4 extrinsics plus fx, fy, cx, cy.
pub const CAMERA_DIM: usize = 16;

/// A camera with normalized pinhole intrinsics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// Camera-to-world transform; columns are right, up, back and position.
    pub camera_to_world: Mat4,
    /// Focal length in units of image size.
    pub focal: f32,
    /// Principal point in units of image size.
    pub principal: [f32; 2],
}

impl CameraPose {
    pub fn position(&self) -> Vec3 {
        self.camera_to_world.w_axis.truncate()
    }

    /// Flatten to the network's camera layout.
    pub fn to_flat(&self) -> [f32; CAMERA_DIM] {
        let mut out = [0.0; CAMERA_DIM];
        for row in 0..3 {
            let r: Vec4 = self.camera_to_world.row(row);
            out[row * 4..row * 4 + 4].copy_from_slice(&r.to_array());
        }
        out[12] = self.focal;
        out[13] = self.focal;
        out[14] = self.principal[0];
        out[15] = self.principal[1];
        out
    }
}

/// Focal length, relative to image size, for a field of view in degrees.
pub fn fov_to_focal(fov_degrees: f32) -> f32 {
    0.5 / (fov_degrees.to_radians() * 0.5).tan()
}

/// Camera-to-world transform of a camera at `position` looking at the origin.
///
/// The camera looks along its local -z axis, with world +z as up.
pub fn center_looking_at(position: Vec3) -> Mat4 {
    let z_axis = position.normalize();
    let x_axis = Vec3::Z.cross(z_axis).normalize();
    let y_axis = z_axis.cross(x_axis).normalize();
    Mat4::from_cols(
        x_axis.extend(0.0),
        y_axis.extend(0.0),
        z_axis.extend(0.0),
        position.extend(1.0),
    )
}

/// Camera-to-world transform on a sphere around the origin.
pub fn spherical_camera_pose(azimuth_degrees: f32, elevation_degrees: f32, radius: f32) -> Mat4 {
    let (az, el) = (azimuth_degrees.to_radians(), elevation_degrees.to_radians());
    let position = Vec3::new(
        radius * el.cos() * az.cos(),
        radius * el.cos() * az.sin(),
        radius * el.sin(),
    );
    center_looking_at(position)
}

/// The six fixed input cameras.
#[derive(Debug, Clone, PartialEq)]
pub struct InputCameras {
    poses: Vec<CameraPose>,
}

impl InputCameras {
    /// Cameras of the six generated views at `radius`, with field of view `fov_degrees`.
    pub fn six_views(radius: f32, fov_degrees: f32) -> Self {
        let focal = fov_to_focal(fov_degrees);
        let poses = VIEW_AZIMUTHS
            .iter()
            .zip(VIEW_ELEVATIONS.iter())
            .map(|(&az, &el)| CameraPose {
                camera_to_world: spherical_camera_pose(az, el, radius),
                focal,
                principal: [0.5, 0.5],
            })
            .collect();
        Self { poses }
    }

    pub fn poses(&self) -> &[CameraPose] {
        &self.poses
    }

    /// `[batch_size, NUM_VIEWS, CAMERA_DIM]` tensor on `device`.
    pub fn to_tensor(&self, batch_size: usize, device: &Device) -> candle_core::Result<Tensor> {
        let one: Vec<f32> = self.poses.iter().flat_map(|p| p.to_flat()).collect();
        let data = one.repeat(batch_size);
        Tensor::from_vec(data, (batch_size, self.poses.len(), CAMERA_DIM), device)
    }
}
