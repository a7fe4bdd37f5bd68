//! Pointer input tracking.
//!
//! Pointer coordinates arrive in physical window space. The engine keeps the
//! resolution scale (window box size over logical game size) current across
//! resizes, and releases are published in logical game coordinates so
//! gameplay code never sees window pixels.

use glam::Vec2;

use crate::bus::{MessageBus, MessageContext};

pub const MSG_MOUSE_UP: &str = "MOUSE_UP";

pub struct InputState {
    mouse_position: Vec2,
    resolution_scale: Vec2,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            mouse_position: Vec2::ZERO,
            resolution_scale: Vec2::ONE,
        }
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_resolution_scale(&mut self, scale: Vec2) {
        self.resolution_scale = scale;
    }

    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        self.mouse_position = Vec2::new(x, y);
    }

    pub fn mouse_position(&self) -> Vec2 {
        self.mouse_position
    }

    /// Logical game-space position of the pointer.
    pub fn logical_position(&self) -> Vec2 {
        Vec2::new(
            self.mouse_position.x / self.resolution_scale.x,
            self.mouse_position.y / self.resolution_scale.y,
        )
    }

    /// Publish a release at the current pointer position, in logical
    /// coordinates.
    pub fn pointer_released(&mut self, bus: &mut MessageBus) {
        let logical = self.logical_position();
        bus.post(
            MSG_MOUSE_UP,
            MessageContext::Pointer {
                x: logical.x,
                y: logical.y,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::bus::{Message, MessageHandler};

    struct ReleaseWatcher {
        releases: Vec<(f32, f32)>,
    }

    impl MessageHandler for ReleaseWatcher {
        fn on_message(&mut self, message: &Message, _bus: &mut MessageBus) -> Result<(), String> {
            if let MessageContext::Pointer { x, y } = message.context {
                self.releases.push((x, y));
            }
            Ok(())
        }
    }

    #[test]
    fn release_is_scaled_to_logical_coordinates() {
        let mut input = InputState::new();
        // Window box is twice the logical game size on both axes.
        input.set_resolution_scale(Vec2::new(2.0, 2.0));
        input.pointer_moved(100.0, 60.0);

        let mut bus = MessageBus::new();
        let watcher = Rc::new(RefCell::new(ReleaseWatcher { releases: Vec::new() }));
        let as_handler: Rc<RefCell<dyn MessageHandler>> = watcher.clone();
        bus.subscribe(MSG_MOUSE_UP, Rc::downgrade(&as_handler));

        input.pointer_released(&mut bus);
        assert!(watcher.borrow().releases.is_empty(), "queued, not synchronous");

        bus.update(0.0).expect("delivery should succeed");
        assert_eq!(watcher.borrow().releases.as_slice(), [(50.0, 30.0)]);
    }

    #[test]
    fn default_scale_is_identity() {
        let mut input = InputState::new();
        input.pointer_moved(12.0, 34.0);
        assert_eq!(input.logical_position(), Vec2::new(12.0, 34.0));
    }
}
