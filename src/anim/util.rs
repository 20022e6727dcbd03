use super::types::{Keyframe, QuatKey, VectorKey};
use nalgebra::UnitQuaternion;
use nalgebra_glm as glm;

/// Finds the keys bracketing `time` in a non-empty track.
///
/// The current key advances while `time` has reached the next key. The
/// following key is taken modulo the track length, so past the last key the
/// pair is (last, first). That pair has a negative interval so sampling holds
/// the last value, which is the splice used when a looping animation wraps.
///
/// # Panics
/// Will panic if `keys` is empty
#[must_use]
pub fn bracket<K: Keyframe>(keys: &[K], time: f32) -> (usize, usize) {
    assert!(!keys.is_empty(), "bracket called on an empty track");
    let mut frame = 0;
    while frame + 1 < keys.len() && time >= keys[frame + 1].time() {
        frame += 1;
    }
    (frame, (frame + 1) % keys.len())
}

/// Interpolation parameter for a pair of keys, or `None` when the interval
/// has no positive length
fn factor(start: f32, end: f32, time: f32) -> Option<f32> {
    let duration = end - start;
    (duration > 0.0).then(|| (time - start) / duration)
}

/// Samples a position or scale track, returning `default` for an empty track
#[must_use]
pub fn sample_vector(
    keys: &[VectorKey],
    time: f32,
    default: glm::Vec3,
) -> glm::Vec3 {
    if keys.is_empty() {
        return default;
    }
    let (frame, next) = bracket(keys, time);
    let (key, next_key) = (&keys[frame], &keys[next]);
    match factor(key.time, next_key.time, time) {
        Some(f) if f != 0.0 => glm::lerp(&key.value, &next_key.value, f),
        _ => key.value,
    }
}

/// Samples a rotation track, returning identity for an empty track
#[must_use]
pub fn sample_rotation(keys: &[QuatKey], time: f32) -> glm::Quat {
    if keys.is_empty() {
        return glm::Quat::identity();
    }
    let (frame, next) = bracket(keys, time);
    let (key, next_key) = (&keys[frame], &keys[next]);
    match factor(key.time, next_key.time, time) {
        Some(f) if f != 0.0 => slerp(&key.value, &next_key.value, f),
        _ => key.value,
    }
}

/// Spherical interpolation along the shortest arc. Falls back to the first
/// rotation in the degenerate case nalgebra refuses to interpolate.
#[must_use]
pub fn slerp(a: &glm::Quat, b: &glm::Quat, t: f32) -> glm::Quat {
    let ua = UnitQuaternion::new_normalize(*a);
    let ub = UnitQuaternion::new_normalize(*b);
    ua.try_slerp(&ub, t, 1.0e-6).unwrap_or(ua).into_inner()
}

/// Builds a local bone matrix: the rotation's basis rows are each scaled by
/// the matching scale component, then the bottom row is overwritten with the
/// position.
#[must_use]
pub fn compose(
    position: &glm::Vec3,
    rotation: &glm::Quat,
    scale: &glm::Vec3,
) -> glm::Mat4 {
    let mut m = crate::math::from_quat(rotation);
    for row in 0..3 {
        for col in 0..3 {
            m[(row, col)] *= scale[row];
        }
    }
    m[(3, 0)] = position.x;
    m[(3, 1)] = position.y;
    m[(3, 2)] = position.z;
    m[(3, 3)] = 1.0;
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math;

    const EPSILON: f32 = 0.0005_f32;

    fn vkeys(times: &[f32]) -> Vec<VectorKey> {
        times
            .iter()
            .enumerate()
            .map(|(i, t)| VectorKey {
                time: *t,
                value: glm::vec3(i as f32 * 10.0, 0.0, 0.0),
            })
            .collect()
    }

    #[test]
    fn bracket_advances_on_equal_time() {
        let keys = vkeys(&[0.0, 1.0, 2.0]);
        assert_eq!(bracket(&keys, 0.5), (0, 1));
        assert_eq!(bracket(&keys, 1.0), (1, 2));
        assert_eq!(bracket(&keys, 1.999), (1, 2));
    }

    #[test]
    fn bracket_before_first_key_uses_first_pair() {
        let keys = vkeys(&[1.0, 2.0]);
        assert_eq!(bracket(&keys, -3.0), (0, 1));
        // Extrapolates backwards since nothing clamps inside the sampler
        let v = sample_vector(&keys, 0.0, glm::Vec3::zeros());
        assert!((v.x + 10.0).abs() < EPSILON);
    }

    #[test]
    fn single_key_brackets_itself() {
        let keys = vkeys(&[3.0]);
        assert_eq!(bracket(&keys, 10.0), (0, 0));
        let v = sample_vector(&keys, 10.0, glm::Vec3::zeros());
        assert!(v.x.abs() < EPSILON);
    }

    #[test]
    fn empty_tracks_use_defaults() {
        let one = glm::vec3(1.0, 1.0, 1.0);
        assert_eq!(sample_vector(&[], 4.0, one), one);
        assert_eq!(sample_rotation(&[], 4.0), glm::Quat::identity());
    }

    #[test]
    fn rotation_halfway() {
        let keys = [
            QuatKey {
                time: 0.0,
                value: glm::Quat::identity(),
            },
            QuatKey {
                time: 2.0,
                value: glm::quat_angle_axis(1.0, &glm::vec3(0.0, 1.0, 0.0)),
            },
        ];
        let q = sample_rotation(&keys, 1.0);
        let expected = glm::quat_angle_axis(0.5, &glm::vec3(0.0, 1.0, 0.0));
        let c = glm::quat_equal_eps(&q, &expected, EPSILON);
        assert!(c.x && c.y && c.z && c.w);
    }

    #[test]
    fn compose_scales_rotation_rows() {
        let q = glm::quat_angle_axis(0.3, &glm::vec3(1.0, 0.0, 0.0));
        let m = compose(
            &glm::vec3(4.0, 5.0, 6.0),
            &q,
            &glm::vec3(2.0, 3.0, 4.0),
        );
        let r = math::from_quat(&q);
        for row in 0..3 {
            let scaled = math::basis(&r, row) * [2.0, 3.0, 4.0][row];
            assert!(glm::length(&(math::basis(&m, row) - scaled)) < EPSILON);
            assert!(m[(row, 3)].abs() < EPSILON);
        }
        assert_eq!(math::get_translation(&m), glm::vec3(4.0, 5.0, 6.0));
        assert!((m[(3, 3)] - 1.0).abs() < EPSILON);
    }
}
