//! Real-time engine core: a physics-backed scene graph, per-actor skeletal
//! pose evaluation and a multi-pass render target compositor.
//!
//! The GPU, audio and physics collaborators are traits. Each ships with a
//! headless implementation that records what it was asked to do, so a scene
//! can be updated and rendered without a window or a sound card. Enable the
//! `rapier` feature for real rigid body simulation.
//!
//! Matrices use the row-vector convention throughout; see [`math`].

pub mod anim;
pub mod arena;
pub mod audio;
pub mod clock;
pub mod config;
pub mod context;
pub mod gpu;
pub mod input;
pub mod math;
pub mod media;
pub mod ov_error;
pub mod physics;
pub mod render_target;
pub mod scene;
pub mod vertex;

// Re-exports
pub use {
    context::EngineContext,
    ov_error::OvError,
    render_target::RenderTarget,
    scene::Scene,
};
