use crate::ov_error::OvError;
use log::info;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Engine wide settings, usually loaded from a YAML file. Every section and
/// field is optional in the file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub render: RenderConfig,
    pub physics: PhysicsConfig,
    pub actor: ActorConfig,
}

/// Defaults for new render targets
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub multi_sample: bool,
    pub samples: u32,
    /// Bloom radius, 0 disables the pass
    pub bloom: f32,
    pub auto_luminance: bool,
    pub motion_blur: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            multi_sample: true,
            samples: 4,
            bloom: 0.0,
            auto_luminance: false,
            motion_blur: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: [f32; 3],
    /// Length of one internal simulation step in seconds
    pub fixed_time_step: f32,
    /// Ceiling for the substep budget handed to the world each tick
    pub max_sub_steps: u32,
    /// Cone limit for prop bone constraints, radians
    pub joint_swing_limit: f32,
    /// Twist limit for prop bone constraints, radians
    pub joint_twist_limit: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.81, 0.0],
            fixed_time_step: 1.0 / 60.0,
            max_sub_steps: 200,
            joint_swing_limit: std::f32::consts::FRAC_PI_4,
            joint_twist_limit: std::f32::consts::FRAC_PI_8,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActorConfig {
    pub height: f32,
    pub radius: f32,
    /// Capsule scale change per millisecond while crouching or standing
    pub crouch_rate: f32,
    pub jump_speed: f32,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            height: 1.8,
            radius: 0.3,
            crouch_rate: 0.005,
            jump_speed: 4.0,
        }
    }
}

impl EngineConfig {
    /// # Errors
    /// May return `OvError`
    pub fn from_file(path: &Path) -> Result<Self, OvError> {
        let text = fs::read_to_string(path)?;
        info!("Engine config loaded from {:?}", path);
        Self::from_yaml(&text)
    }

    /// # Errors
    /// May return `OvError`
    pub fn from_yaml(text: &str) -> Result<Self, OvError> {
        Ok(serde_yaml::from_str(text)?)
    }
}
