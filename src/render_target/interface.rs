use crate::gpu::{GraphicsDevice, TextureHandle, Viewport};

/// A rectangle where each value in `[0, 1]` is a fraction of the parent's
/// extent on that axis and any other value is in pixels. Positions are
/// offsets from the parent's origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// The whole of the parent
    pub const FULL: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Pixel rectangle inside `parent`
    #[must_use]
    pub fn resolve(&self, parent: &Viewport) -> Viewport {
        Viewport {
            x: parent.x + axis(self.x, parent.width),
            y: parent.y + axis(self.y, parent.height),
            width: axis(self.width, parent.width),
            height: axis(self.height, parent.height),
        }
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::FULL
    }
}

fn axis(value: f32, extent: f32) -> f32 {
    if (0.0..=1.0).contains(&value) {
        value * extent
    } else {
        value
    }
}

/// Node of a render target's UI tree
#[derive(Clone, Debug, PartialEq)]
pub struct Interface {
    pub rect: Rect,
    pub colour: [f32; 4],
    pub texture: Option<TextureHandle>,
    /// A hidden node hides its children too
    pub visible: bool,
    pub children: Vec<Interface>,
}

impl Interface {
    #[must_use]
    pub const fn new(rect: Rect) -> Self {
        Self {
            rect,
            colour: [1.0, 1.0, 1.0, 1.0],
            texture: None,
            visible: true,
            children: Vec::new(),
        }
    }

    /// Adds a child and returns it for further setup
    pub fn add_child(&mut self, child: Self) -> &mut Self {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Draws this node and then its children, depth first
    pub fn render(&self, device: &mut dyn GraphicsDevice, parent: &Viewport) {
        if !self.visible {
            return;
        }
        let viewport = self.rect.resolve(parent);
        device.draw_rect(&viewport, self.colour, self.texture);
        for child in &self.children {
            child.render(device, &viewport);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Command, HeadlessDevice};

    const SCREEN: Viewport = Viewport {
        x: 0.0,
        y: 0.0,
        width: 800.0,
        height: 600.0,
    };

    #[test]
    fn fractions_and_pixels_mix_per_axis() {
        let v = Rect::new(0.5, 20.0, 0.25, 100.0).resolve(&SCREEN);
        assert_eq!(
            v,
            Viewport {
                x: 400.0,
                y: 20.0,
                width: 200.0,
                height: 100.0
            }
        );
    }

    #[test]
    fn children_are_relative_and_hidden_subtrees_skipped() {
        let mut root = Interface::new(Rect::new(100.0, 100.0, 0.5, 0.5));
        root.add_child(Interface::new(Rect::new(0.5, 0.0, 0.5, 1.0)));
        let hidden = root.add_child(Interface::new(Rect::FULL));
        hidden.visible = false;
        hidden.add_child(Interface::new(Rect::FULL));

        let mut device = HeadlessDevice::new();
        root.render(&mut device, &SCREEN);
        let rects: Vec<_> = device
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::Rect { viewport, .. } => Some(*viewport),
                _ => None,
            })
            .collect();
        assert_eq!(rects.len(), 2);
        assert_eq!(
            rects[1],
            Viewport {
                x: 300.0,
                y: 100.0,
                width: 200.0,
                height: 300.0
            }
        );
    }
}
