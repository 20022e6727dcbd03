use crate::config::RenderConfig;
use nalgebra_glm as glm;
use std::f32::consts::{FRAC_PI_2, PI};

/// Blur pairs run by bloom, spread over half a circle of directions
pub const BLOOM_PASSES: usize = 4;
/// Bloom works on a texture this many times smaller on each axis
pub const BLOOM_DOWNSAMPLE: u32 = 4;

pub const LUMINANCE_SMOOTHING: f32 = 0.01;
pub const MIN_LUMINANCE: f32 = 0.5;
pub const MAX_LUMINANCE: f32 = 1.0;

/// Motion below this on an axis is treated as none
pub const MOTION_THRESHOLD: f32 = 0.001;
/// Camera motion divisor when compositing to a window
pub const WINDOW_MOTION_DIVISOR: f32 = 30.0;
/// Camera motion divisor when compositing to a texture
pub const TEXTURE_MOTION_DIVISOR: f32 = 20.0;

/// Post-process passes, chosen per render target
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Effects {
    pub multi_sample: bool,
    pub auto_luminance: bool,
    /// Blur distance in texels, 0 disables bloom
    pub bloom: f32,
    pub motion_blur: bool,
}

impl Default for Effects {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

impl From<&RenderConfig> for Effects {
    fn from(config: &RenderConfig) -> Self {
        Self {
            multi_sample: config.multi_sample,
            auto_luminance: config.auto_luminance,
            bloom: config.bloom,
            motion_blur: config.motion_blur,
        }
    }
}

/// Moves the running luminance a little towards the frame's average
#[must_use]
pub fn smooth_luminance(current: f32, average: f32) -> f32 {
    (current * (1.0 - LUMINANCE_SMOOTHING) + average * LUMINANCE_SMOOTHING)
        .clamp(MIN_LUMINANCE, MAX_LUMINANCE)
}

/// Direction pairs for the bloom blurs. Each pair is perpendicular and the
/// first directions sweep half a circle, scaled by `bloom`.
pub fn bloom_directions(
    bloom: f32,
) -> impl Iterator<Item = (glm::Vec2, glm::Vec2)> {
    (0..BLOOM_PASSES).map(move |k| {
        #[allow(clippy::cast_precision_loss)]
        let angle = PI * k as f32 / BLOOM_PASSES as f32;
        let dir = |a: f32| glm::vec2(a.cos(), a.sin()) * bloom;
        (dir(angle), dir(angle + FRAC_PI_2))
    })
}

/// Screen space camera motion between two view matrices, from the change
/// in where the view's forward axis points
#[must_use]
pub fn camera_motion(
    previous: &glm::Mat4,
    current: &glm::Mat4,
    divisor: f32,
) -> glm::Vec2 {
    let raw = glm::vec2(
        current[(0, 2)] - previous[(0, 2)],
        current[(1, 2)] - previous[(1, 2)],
    ) / divisor;
    raw.map(|v| if v.abs() < MOTION_THRESHOLD { 0.0 } else { v })
}
