use super::Emitter;
use crate::{arena::Handle, audio::VoiceId, math, physics::BodyHandle};
use nalgebra_glm as glm;

const NEAR_CLIP_METERS: f32 = 0.1;
const FAR_CLIP_METERS: f32 = 100.0;

#[derive(Debug, Copy, Clone)]
pub struct CameraProperties {
    pub aspect_ratio: f32,
    pub fovy: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraProperties {
    fn default() -> Self {
        Self {
            aspect_ratio: 16.0f32 / 9.0f32,
            fovy: 0.471f32,
            near: NEAR_CLIP_METERS,
            far: FAR_CLIP_METERS,
        }
    }
}

/// A sound played through a camera's listener. It is positioned at the
/// emitter each tick while it plays, or at the listener when there is no
/// emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub id: VoiceId,
    pub emitter: Option<Handle<Emitter>>,
    /// One-shot voices are deleted once they stop
    pub looping: bool,
}

/// The pose lives in a kinematic body so cameras can be ray tested and
/// attached like any other entity. The projection depends on both fovy and
/// aspect ratio, so both are stored so that a caller can change one without
/// having to know the other.
#[derive(Debug, Clone)]
pub struct Camera {
    pub body: BodyHandle,
    properties: CameraProperties,
    proj: glm::Mat4,
    pub voices: Vec<Voice>,
}

impl Camera {
    #[must_use]
    pub fn new(body: BodyHandle, properties: CameraProperties) -> Self {
        Self {
            body,
            properties,
            proj: Self::build_proj(&properties),
            voices: Vec::new(),
        }
    }

    #[must_use]
    pub const fn properties(&self) -> &CameraProperties {
        &self.properties
    }

    pub fn aspect_ratio(&mut self, aspect_ratio: f32) {
        self.properties.aspect_ratio = aspect_ratio;
        self.proj = Self::build_proj(&self.properties);
    }

    pub fn zoom(&mut self, fovy: f32) {
        self.properties.fovy = fovy;
        self.proj = Self::build_proj(&self.properties);
    }

    #[must_use]
    pub const fn projection(&self) -> glm::Mat4 {
        self.proj
    }

    /// View matrix for a camera whose world pose is `pose`
    #[must_use]
    pub fn view_matrix(pose: &glm::Mat4) -> glm::Mat4 {
        math::inverse(pose)
    }

    fn build_proj(p: &CameraProperties) -> glm::Mat4 {
        math::perspective(p.aspect_ratio, p.fovy, p.near, p.far)
    }
}
