//! Runtime-to-scene coordinate conversion.
//!
//! Poses arrive in the VR runtime's Y-up convention and leave in the scene's
//! Z-up convention, uniformly scaled by the magnitude of the root object's scale.

use nalgebra as na;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::host::HostScene;

/// Basis change mapping runtime axes onto scene axes.
///
/// Runtime +Z becomes scene +Y and runtime +Y becomes scene +Z; X is negated
/// so the result stays a proper rotation.
pub fn axis_conversion() -> na::Matrix4<f32> {
    na::Matrix4::new(
        -1., 0., 0., 0., //
        0., 0., 1., 0., //
        0., 1., 0., 0., //
        0., 0., 0., 1.,
    )
}

/// Converts a runtime-native transform into a scene world transform.
///
/// The axis conversion is applied on the left, the uniform root scale on the right.
pub fn convert(native: &na::Matrix4<f32>, root_scale: f32) -> na::Matrix4<f32> {
    axis_conversion() * native * na::Matrix4::new_scaling(root_scale)
}

/// Scale factor carried by the root object, or `1.0` when it doesn't exist.
///
/// Only the magnitude of the root's scale vector is used.
pub fn root_scale_factor(host: &dyn HostScene, root_object: &str) -> f32 {
    host.scale(root_object)
        .map(|scale| scale.norm())
        .unwrap_or(1.0)
}

/// Root scale handed from the main context to the polling thread.
///
/// The polling thread must not touch the scene, so the main context reads the
/// root object and publishes the factor here.
#[derive(Debug)]
pub struct RootScale(AtomicU32);

impl RootScale {
    pub fn new(scale: f32) -> Self {
        RootScale(AtomicU32::new(scale.to_bits()))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, scale: f32) {
        self.0.store(scale.to_bits(), Ordering::Release);
    }

    pub fn refresh(&self, host: &dyn HostScene, root_object: &str) {
        self.set(root_scale_factor(host, root_object));
    }
}

impl Default for RootScale {
    fn default() -> Self {
        RootScale::new(1.0)
    }
}

/// Translation, rotation and scale of a world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposed {
    pub translation: na::Vector3<f32>,
    pub rotation: na::UnitQuaternion<f32>,
    pub scale: na::Vector3<f32>,
}

impl Decomposed {
    /// Quaternion components in `w, x, y, z` order, the order rotation curves use.
    pub fn rotation_wxyz(&self) -> [f32; 4] {
        let q = self.rotation;
        [q.w, q.i, q.j, q.k]
    }
}

/// Splits an affine transform into translation, rotation and per-axis scale.
///
/// Scale is the length of each basis column; a mirrored basis flips the sign
/// of the whole scale vector.
pub fn decompose(transform: &na::Matrix4<f32>) -> Decomposed {
    let translation = na::Vector3::new(transform[(0, 3)], transform[(1, 3)], transform[(2, 3)]);
    let basis: na::Matrix3<f32> = transform.fixed_slice::<na::U3, na::U3>(0, 0).into_owned();

    let mut scale = na::Vector3::new(
        basis.column(0).norm(),
        basis.column(1).norm(),
        basis.column(2).norm(),
    );
    if basis.determinant() < 0.0 {
        scale = -scale;
    }

    let mut normalized = basis;
    for (index, factor) in scale.iter().enumerate() {
        if *factor != 0.0 {
            let mut column = normalized.column_mut(index);
            column /= *factor;
        }
    }
    let rotation =
        na::UnitQuaternion::from_rotation_matrix(&na::Rotation3::from_matrix_unchecked(normalized));

    Decomposed {
        translation,
        rotation,
        scale,
    }
}
