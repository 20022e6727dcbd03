//! Matrix helpers for the row-vector convention used by the engine.
//!
//! A point transforms as `p * M` so translation lives in the bottom row and
//! `A * B` applies `A` first. A child's global transform is therefore
//! `local * parent_global`. `nalgebra_glm` builds column-vector matrices, so
//! anything produced by glm is transposed here before it leaves this module.
use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion};
use nalgebra_glm as glm;

/// Tolerance used by the approximate comparisons in this module
pub const EPSILON: f32 = 0.0001;

#[must_use]
pub fn translation(v: &glm::Vec3) -> glm::Mat4 {
    let mut m = glm::Mat4::identity();
    set_translation(&mut m, v);
    m
}

#[must_use]
pub fn get_translation(m: &glm::Mat4) -> glm::Vec3 {
    glm::vec3(m[(3, 0)], m[(3, 1)], m[(3, 2)])
}

pub fn set_translation(m: &mut glm::Mat4, v: &glm::Vec3) {
    m[(3, 0)] = v.x;
    m[(3, 1)] = v.y;
    m[(3, 2)] = v.z;
}

/// Rotation matrix from a quaternion
#[must_use]
pub fn from_quat(q: &glm::Quat) -> glm::Mat4 {
    glm::quat_to_mat4(q).transpose()
}

/// Rotation about the world up (Y) axis
#[must_use]
pub fn rotation_y(angle: f32) -> glm::Mat4 {
    glm::rotation(angle, &glm::vec3(0.0, 1.0, 0.0)).transpose()
}

/// Rotation about the X axis
#[must_use]
pub fn rotation_x(angle: f32) -> glm::Mat4 {
    glm::rotation(angle, &glm::vec3(1.0, 0.0, 0.0)).transpose()
}

#[must_use]
pub fn scaling(s: &glm::Vec3) -> glm::Mat4 {
    glm::scaling(s)
}

/// Inverse, falling back to identity for a singular matrix
#[must_use]
pub fn inverse(m: &glm::Mat4) -> glm::Mat4 {
    m.try_inverse().unwrap_or_else(glm::Mat4::identity)
}

/// Transforms a point (w = 1)
#[must_use]
pub fn transform_point(p: &glm::Vec3, m: &glm::Mat4) -> glm::Vec3 {
    glm::vec3(
        p.x * m[(0, 0)] + p.y * m[(1, 0)] + p.z * m[(2, 0)] + m[(3, 0)],
        p.x * m[(0, 1)] + p.y * m[(1, 1)] + p.z * m[(2, 1)] + m[(3, 1)],
        p.x * m[(0, 2)] + p.y * m[(1, 2)] + p.z * m[(2, 2)] + m[(3, 2)],
    )
}

/// Transforms a direction (w = 0)
#[must_use]
pub fn transform_normal(v: &glm::Vec3, m: &glm::Mat4) -> glm::Vec3 {
    glm::vec3(
        v.x * m[(0, 0)] + v.y * m[(1, 0)] + v.z * m[(2, 0)],
        v.x * m[(0, 1)] + v.y * m[(1, 1)] + v.z * m[(2, 1)],
        v.x * m[(0, 2)] + v.y * m[(1, 2)] + v.z * m[(2, 2)],
    )
}

/// Basis row `index` (0 = right, 1 = up, 2 = forward)
#[must_use]
pub fn basis(m: &glm::Mat4, index: usize) -> glm::Vec3 {
    glm::vec3(m[(index, 0)], m[(index, 1)], m[(index, 2)])
}

/// Left handed perspective projection with a 0 to 1 depth range
#[must_use]
pub fn perspective(
    aspect_ratio: f32,
    fovy: f32,
    near: f32,
    far: f32,
) -> glm::Mat4 {
    glm::perspective_lh_zo(aspect_ratio, fovy, near, far).transpose()
}

/// Splits a matrix into translation, rotation and per-axis scale
#[must_use]
pub fn decompose(m: &glm::Mat4) -> (glm::Vec3, glm::Quat, glm::Vec3) {
    let rows = [basis(m, 0), basis(m, 1), basis(m, 2)];
    let scale = glm::vec3(
        glm::length(&rows[0]),
        glm::length(&rows[1]),
        glm::length(&rows[2]),
    );
    let unit = |v: &glm::Vec3, s: f32| if s > EPSILON { v / s } else { *v };
    let (r0, r1, r2) = (
        unit(&rows[0], scale.x),
        unit(&rows[1], scale.y),
        unit(&rows[2], scale.z),
    );
    // Rows of the row-vector matrix are the columns of the usual rotation
    let rot = Matrix3::new(
        r0.x, r1.x, r2.x, //
        r0.y, r1.y, r2.y, //
        r0.z, r1.z, r2.z,
    );
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&rot));
    (get_translation(m), q.into_inner(), scale)
}

/// Rigid part of a matrix as an isometry for the physics backends
#[must_use]
pub fn to_isometry(m: &glm::Mat4) -> Isometry3<f32> {
    let (t, q, _) = decompose(m);
    Isometry3::from_parts(
        Translation3::new(t.x, t.y, t.z),
        UnitQuaternion::new_normalize(q),
    )
}

#[must_use]
pub fn from_isometry(iso: &Isometry3<f32>) -> glm::Mat4 {
    iso.to_homogeneous().transpose()
}

/// Approximate equality of every element
#[must_use]
pub fn mat_eq_eps(a: &glm::Mat4, b: &glm::Mat4, epsilon: f32) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= epsilon)
}
