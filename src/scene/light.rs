use crate::{
    gpu::{LightBlock, MAX_LIGHTS},
    math,
    physics::BodyHandle,
};
use log::trace;
use nalgebra_glm as glm;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Point {
        range: f32,
    },
    /// Cone angles are half angles in radians
    Spot {
        range: f32,
        inner_cone: f32,
        outer_cone: f32,
    },
    /// Shines along the pose's forward axis from infinitely far away
    Directional,
}

impl LightKind {
    /// Tag stored in the `w` of a packed position
    #[must_use]
    pub const fn tag(&self) -> u32 {
        match self {
            Self::Point { .. } => 0,
            Self::Spot { .. } => 1,
            Self::Directional => 2,
        }
    }

    #[must_use]
    pub const fn range(&self) -> f32 {
        match self {
            Self::Point { range } | Self::Spot { range, .. } => *range,
            Self::Directional => f32::MAX,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Light {
    pub body: BodyHandle,
    pub kind: LightKind,
    pub colour: [f32; 3],
}

/// Packs up to `MAX_LIGHTS` posed lights into view space. Lights past the
/// limit are ignored.
#[must_use]
pub fn pack_lights<'a>(
    lights: impl IntoIterator<Item = (&'a Light, glm::Mat4)>,
    view: &glm::Mat4,
) -> LightBlock {
    let mut block = LightBlock::default();
    for (i, (light, pose)) in lights.into_iter().enumerate() {
        if i == MAX_LIGHTS {
            trace!("Lights beyond {} skipped", MAX_LIGHTS);
            break;
        }
        let position =
            math::transform_point(&math::get_translation(&pose), view);
        let direction = glm::normalize(&math::transform_normal(
            &math::basis(&pose, 2),
            view,
        ));
        #[allow(clippy::cast_precision_loss)]
        let tag = light.kind.tag() as f32;
        let cone = match light.kind {
            LightKind::Spot { outer_cone, .. } => outer_cone.cos(),
            _ => -1.0,
        };
        let [r, g, b] = light.colour;
        block.position[i] = [position.x, position.y, position.z, tag];
        block.colour[i] = [r, g, b, light.kind.range()];
        block.direction[i] = [direction.x, direction.y, direction.z, cone];
        block.count += 1;
    }
    block
}
