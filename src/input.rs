//! Input events pushed by the windowing layer and handed to listeners.
use log::{info, trace};
use std::collections::VecDeque;
use winit::event::{
    ElementState, KeyboardInput, MouseButton, VirtualKeyCode, WindowEvent,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    Key {
        key: VirtualKeyCode,
        state: ElementState,
    },
    MouseButton {
        button: MouseButton,
        state: ElementState,
    },
    /// Cursor position in window pixels
    CursorMoved { x: f64, y: f64 },
    Resized { width: u32, height: u32 },
    CloseRequested,
}

/// Something that reacts to input events
pub trait InputListener {
    fn on_event(&mut self, event: &InputEvent);
}

/// Events collected since the last dispatch, oldest first
#[derive(Default)]
pub struct EventQueue {
    events: VecDeque<InputEvent>,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    /// Converts a winit window event. Returns false if it has no
    /// counterpart and was dropped.
    pub fn push_window_event(&mut self, event: &WindowEvent) -> bool {
        let converted = match event {
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        virtual_keycode: Some(keycode),
                        state,
                        ..
                    },
                ..
            } => InputEvent::Key {
                key: *keycode,
                state: *state,
            },
            WindowEvent::MouseInput { state, button, .. } => {
                InputEvent::MouseButton {
                    button: *button,
                    state: *state,
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                InputEvent::CursorMoved {
                    x: position.x,
                    y: position.y,
                }
            }
            WindowEvent::Resized(size) => InputEvent::Resized {
                width: size.width,
                height: size.height,
            },
            WindowEvent::CloseRequested => {
                info!("CloseRequested event");
                InputEvent::CloseRequested
            }
            _ => return false,
        };
        self.push(converted);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hands every queued event to every listener in order, then empties
    /// the queue
    pub fn dispatch(&mut self, listeners: &mut [&mut dyn InputListener]) {
        trace!("Dispatching {} input events", self.events.len());
        while let Some(event) = self.events.pop_front() {
            for listener in listeners.iter_mut() {
                listener.on_event(&event);
            }
        }
    }
}

/// Enough slots for every `VirtualKeyCode`. The enum currently has 163
/// entries and stable Rust has no way to count them.
const ARRAY_SIZE: usize = 180;

/// Tracks held keys and which were pressed since the previous tick
pub struct Keyboard {
    current_keys: [bool; ARRAY_SIZE],
    previous_keys: [bool; ARRAY_SIZE],
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl InputListener for Keyboard {
    fn on_event(&mut self, event: &InputEvent) {
        if let InputEvent::Key { key, state } = event {
            self.current_keys[*key as usize] = *state == ElementState::Pressed;
        }
    }
}

impl Keyboard {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current_keys: [false; ARRAY_SIZE],
            previous_keys: [false; ARRAY_SIZE],
        }
    }

    /// Call at the end of a tick so `is_just_pressed` sees changes
    pub fn tick(&mut self) {
        self.previous_keys = self.current_keys;
    }

    #[must_use]
    pub const fn is_pressed(&self, keycode: VirtualKeyCode) -> bool {
        self.current_keys[keycode as usize]
    }

    /// Pressed now but not last tick
    #[must_use]
    pub const fn is_just_pressed(&self, keycode: VirtualKeyCode) -> bool {
        self.current_keys[keycode as usize]
            && !self.previous_keys[keycode as usize]
    }
}
