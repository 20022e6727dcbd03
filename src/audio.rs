//! Audio device seam with a state tracking headless implementation.
use ahash::AHashMap;
use log::{trace, warn};
use nalgebra_glm as glm;

/// Decoded PCM samples, interleaved by channel
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioBuffer {
    pub samples: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f32 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32
            / f32::from(self.channels)
            / self.sample_rate as f32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    Stopped,
    Playing,
    Paused,
}

/// Listener or voice placement in world space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub position: glm::Vec3,
    pub forward: glm::Vec3,
    pub up: glm::Vec3,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            position: glm::Vec3::zeros(),
            forward: glm::vec3(0.0, 0.0, 1.0),
            up: glm::vec3(0.0, 1.0, 0.0),
        }
    }
}

pub trait AudioDevice {
    fn create_voice(&mut self, buffer: &AudioBuffer) -> VoiceId;
    fn delete_voice(&mut self, voice: VoiceId);
    fn play(&mut self, voice: VoiceId, looping: bool);
    fn stop(&mut self, voice: VoiceId);
    fn state(&self, voice: VoiceId) -> VoiceState;
    fn set_listener(&mut self, placement: &Placement);
    fn set_voice_placement(&mut self, voice: VoiceId, placement: &Placement);
}

#[derive(Clone, Debug)]
struct Voice {
    state: VoiceState,
    looping: bool,
    placement: Option<Placement>,
}

/// Audio device that only tracks state
#[derive(Default)]
pub struct HeadlessAudio {
    next_id: u32,
    voices: AHashMap<u32, Voice>,
    pub listener: Option<Placement>,
    /// Number of listener updates received
    pub listener_updates: usize,
}

impl HeadlessAudio {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn voice_placement(&self, voice: VoiceId) -> Option<Placement> {
        self.voices.get(&voice.0).and_then(|v| v.placement)
    }

    #[must_use]
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    #[must_use]
    pub fn is_looping(&self, voice: VoiceId) -> bool {
        self.voices.get(&voice.0).is_some_and(|v| v.looping)
    }

    /// Marks a voice as having reached the end of its buffer
    pub fn finish(&mut self, voice: VoiceId) {
        if let Some(v) = self.voices.get_mut(&voice.0) {
            v.state = VoiceState::Stopped;
        }
    }
}

impl AudioDevice for HeadlessAudio {
    fn create_voice(&mut self, buffer: &AudioBuffer) -> VoiceId {
        self.next_id += 1;
        self.voices.insert(
            self.next_id,
            Voice {
                state: VoiceState::Stopped,
                looping: false,
                placement: None,
            },
        );
        trace!(
            "Headless voice {} for {} s of audio",
            self.next_id,
            buffer.duration()
        );
        VoiceId(self.next_id)
    }

    fn delete_voice(&mut self, voice: VoiceId) {
        if self.voices.remove(&voice.0).is_none() {
            warn!("Delete of unknown voice {}", voice.0);
        }
    }

    fn play(&mut self, voice: VoiceId, looping: bool) {
        if let Some(v) = self.voices.get_mut(&voice.0) {
            v.state = VoiceState::Playing;
            v.looping = looping;
        }
    }

    fn stop(&mut self, voice: VoiceId) {
        if let Some(v) = self.voices.get_mut(&voice.0) {
            v.state = VoiceState::Stopped;
        }
    }

    fn state(&self, voice: VoiceId) -> VoiceState {
        self.voices
            .get(&voice.0)
            .map_or(VoiceState::Stopped, |v| v.state)
    }

    fn set_listener(&mut self, placement: &Placement) {
        self.listener = Some(*placement);
        self.listener_updates += 1;
    }

    fn set_voice_placement(&mut self, voice: VoiceId, placement: &Placement) {
        if let Some(v) = self.voices.get_mut(&voice.0) {
            v.placement = Some(*placement);
        }
    }
}
