use crate::{
    arena::{Arena, Handle},
    audio::AudioDevice,
    config::EngineConfig,
    gpu::GraphicsDevice,
    media::MediaLibrary,
    ov_error::OvError,
    physics::PhysicsWorld,
    render_target::{Destination, RenderTarget},
    scene::{Camera, Scene, SceneId},
};
use log::info;

/// Owns the device collaborators and everything shared between scenes.
/// Scenes themselves are owned by the application and passed back in.
pub struct EngineContext {
    pub config: EngineConfig,
    pub device: Box<dyn GraphicsDevice>,
    pub audio: Box<dyn AudioDevice>,
    pub media: MediaLibrary,
    targets: Arena<RenderTarget>,
    next_scene: u32,
}

impl EngineContext {
    /// # Errors
    /// May return `OvError` if the library's default effect fails to
    /// compile
    pub fn new(
        config: EngineConfig,
        mut device: Box<dyn GraphicsDevice>,
        audio: Box<dyn AudioDevice>,
    ) -> Result<Self, OvError> {
        let media = MediaLibrary::new(device.as_mut())?;
        info!("Engine context created");
        Ok(Self {
            config,
            device,
            audio,
            media,
            targets: Arena::new(),
            next_scene: 0,
        })
    }

    /// A new empty scene with its own id
    pub fn create_scene<P: PhysicsWorld>(&mut self, physics: P) -> Scene<P> {
        self.next_scene += 1;
        Scene::new(SceneId(self.next_scene), physics, &self.config)
    }

    pub fn create_render_target(
        &mut self,
        destination: Destination,
        width: u32,
        height: u32,
    ) -> Handle<RenderTarget> {
        let target = RenderTarget::new(
            self.device.as_mut(),
            destination,
            width,
            height,
            &self.config.render,
        );
        self.targets.insert(target)
    }

    /// Frees the target's device resources
    pub fn remove_render_target(
        &mut self,
        target: Handle<RenderTarget>,
    ) -> bool {
        let Some(mut target) = self.targets.remove(target) else {
            return false;
        };
        target.release(self.device.as_mut());
        true
    }

    #[must_use]
    pub fn render_target(
        &self,
        target: Handle<RenderTarget>,
    ) -> Option<&RenderTarget> {
        self.targets.get(target)
    }

    pub fn render_target_mut(
        &mut self,
        target: Handle<RenderTarget>,
    ) -> Option<&mut RenderTarget> {
        self.targets.get_mut(target)
    }

    /// Must be called when a target's window or texture changes size
    pub fn resize_render_target(
        &mut self,
        target: Handle<RenderTarget>,
        width: u32,
        height: u32,
    ) -> bool {
        let Some(target) = self.targets.get_mut(target) else {
            return false;
        };
        target.resize(self.device.as_mut(), width, height);
        true
    }

    /// Cameras of `scene` that some render target uses as its view
    #[must_use]
    pub fn views(&self, scene: SceneId) -> Vec<Handle<Camera>> {
        self.targets
            .values()
            .filter_map(|t| t.view)
            .filter(|v| v.scene == scene)
            .map(|v| v.camera)
            .collect()
    }

    /// Renders one target from its view of `scene`
    pub fn render<P: PhysicsWorld>(
        &mut self,
        target: Handle<RenderTarget>,
        scene: &Scene<P>,
    ) -> bool {
        let Self {
            device,
            media,
            targets,
            ..
        } = self;
        let Some(target) = targets.get_mut(target) else {
            return false;
        };
        target.render(device.as_mut(), media, scene);
        true
    }

    /// Renders every target whose view is in `scene`
    pub fn render_all<P: PhysicsWorld>(&mut self, scene: &Scene<P>) {
        let id = scene.id();
        let handles: Vec<_> = self
            .targets
            .iter()
            .filter(|(_, t)| t.view.is_some_and(|v| v.scene == id))
            .map(|(h, _)| h)
            .collect();
        for h in handles {
            self.render(h, scene);
        }
    }

    /// Frees every device resource held by the targets and the library
    pub fn release(&mut self) {
        for target in self.targets.handles() {
            self.remove_render_target(target);
        }
        self.media.release(self.device.as_mut());
    }
}
