use crate::media::ImportError;
use nalgebra_glm as glm;
use std::sync::Arc;

/// Authoring-time bone shared by every instance of a mesh
///
/// `matrix` is the bind pose in model space; skinning uses its inverse.
/// `local_transform` is the rest pose relative to the parent. The collision
/// fields are derived from the skinned vertices when the mesh is imported,
/// in the bone's own space.
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub index: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub matrix: glm::Mat4,
    pub local_transform: glm::Mat4,
    pub length: f32,
    pub volume: f32,
    pub min: glm::Vec3,
    pub max: glm::Vec3,
    pub convex: Vec<glm::Vec3>,
}

impl Bone {
    /// Bone with identity transforms and an empty collision hull
    #[must_use]
    pub fn new(name: &str, index: usize, parent: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            index,
            parent,
            children: Vec::new(),
            matrix: glm::Mat4::identity(),
            local_transform: glm::Mat4::identity(),
            length: 0.0,
            volume: 0.0,
            min: glm::Vec3::zeros(),
            max: glm::Vec3::zeros(),
            convex: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
    pub animations: Vec<Arc<Animation>>,
    pub root_bone: usize,
}

impl Skeleton {
    /// Builds a skeleton from bones in skin-index order. Children lists are
    /// rebuilt from the parent links.
    ///
    /// # Errors
    /// Returns `ImportError` unless exactly one bone has no parent, every
    /// parent is another bone of this skeleton and each bone's `index`
    /// matches its position.
    pub fn new(mut bones: Vec<Bone>) -> Result<Self, ImportError> {
        let count = bones.len();
        let mut root = None;
        for (i, bone) in bones.iter().enumerate() {
            if bone.index != i {
                return Err(ImportError::General);
            }
            match bone.parent {
                None if root.is_some() => {
                    return Err(ImportError::ConflictingRootNodes(i))
                }
                None => root = Some(i),
                Some(p) if p >= count || p == i => {
                    return Err(ImportError::NoNodeInfo(i))
                }
                Some(_) => (),
            }
        }
        let root_bone = root.ok_or(ImportError::NoRootNode(0))?;
        for bone in &mut bones {
            bone.children.clear();
        }
        for i in 0..count {
            if let Some(p) = bones[i].parent {
                bones[p].children.push(i);
            }
        }
        Ok(Self {
            bones,
            animations: Vec::new(),
            root_bone,
        })
    }

    #[must_use]
    pub fn bone_by_name(&self, name: &str) -> Option<&Bone> {
        self.bones.iter().find(|b| b.name == name)
    }

    #[must_use]
    pub fn animation_by_name(&self, name: &str) -> Option<&Arc<Animation>> {
        self.animations.iter().find(|a| a.name == name)
    }
}

/// Anything with a timestamp, so key searches work for every track type
pub trait Keyframe {
    fn time(&self) -> f32;
}

#[derive(Clone, Copy, Debug)]
pub struct VectorKey {
    pub time: f32,
    pub value: glm::Vec3,
}

impl Keyframe for VectorKey {
    fn time(&self) -> f32 {
        self.time
    }
}

#[derive(Clone, Copy, Debug)]
pub struct QuatKey {
    pub time: f32,
    pub value: glm::Quat,
}

impl Keyframe for QuatKey {
    fn time(&self) -> f32 {
        self.time
    }
}

/// Keyframes for one bone. The three tracks are timed independently.
#[derive(Clone, Debug, Default)]
pub struct Channel {
    pub index: usize,
    pub positions: Vec<VectorKey>,
    pub rotations: Vec<QuatKey>,
    pub scales: Vec<VectorKey>,
}

impl Channel {
    fn span(&self) -> Option<(f32, f32)> {
        self.positions
            .iter()
            .map(Keyframe::time)
            .chain(self.rotations.iter().map(Keyframe::time))
            .chain(self.scales.iter().map(Keyframe::time))
            .fold(None, |acc, t| match acc {
                None => Some((t, t)),
                Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            })
    }
}

#[derive(Clone, Debug)]
pub struct Animation {
    pub name: String,
    pub channels: Vec<Channel>,
    pub start_time: f32,
    pub end_time: f32,
}

impl Animation {
    /// Creates an animation with `start_time` and `end_time` spanning every
    /// key of every channel
    #[must_use]
    pub fn new(name: &str, channels: Vec<Channel>) -> Self {
        let (start_time, end_time) = channels
            .iter()
            .filter_map(Channel::span)
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
            .unwrap_or((0.0, 0.0));
        Self {
            name: name.to_string(),
            channels,
            start_time,
            end_time,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnimationState {
    Stopped,
    Playing,
    Looping,
}

/// Playback cursor for one animation on one actor
#[derive(Clone, Debug)]
pub struct AnimationInstance {
    pub animation: Arc<Animation>,
    pub current_time: f32,
    pub start_time: f32,
    pub end_time: f32,
    /// Animation time added by the most recent tick
    pub step_time: f32,
    pub state: AnimationState,
}

impl AnimationInstance {
    /// A stopped instance positioned at the start of the animation
    #[must_use]
    pub fn new(animation: Arc<Animation>) -> Self {
        Self {
            current_time: animation.start_time,
            start_time: animation.start_time,
            end_time: animation.end_time,
            step_time: 0.0,
            state: AnimationState::Stopped,
            animation,
        }
    }

    pub fn play(&mut self) {
        self.state = AnimationState::Playing;
    }

    pub fn play_looped(&mut self) {
        self.state = AnimationState::Looping;
    }

    pub fn stop(&mut self) {
        self.state = AnimationState::Stopped;
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state != AnimationState::Stopped
    }

    /// Wraps a cursor that ran past the end back to the start when looping,
    /// otherwise holds it at the end
    pub fn wrap(&mut self) {
        if self.current_time > self.end_time {
            self.current_time = if self.state == AnimationState::Looping {
                self.start_time
            } else {
                self.end_time
            };
        }
    }

    /// Moves the cursor on by `update_time` milliseconds. Animation time runs
    /// at one unit per 100 ms of engine time.
    pub fn advance(&mut self, update_time: f32) {
        if self.is_playing() {
            self.step_time = update_time / 100.0;
            self.current_time += self.step_time;
        } else {
            self.step_time = 0.0;
        }
    }
}
