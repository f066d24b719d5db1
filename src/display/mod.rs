//! Display adapters implementing [`Renderer`].

mod broadcast;
mod console;

pub use broadcast::{BroadcastRenderer, DisplayEvent};
pub use console::{
    format_value, unit_for, ConsoleRenderer, DEFAULT_NOTIFICATION_TTL, NO_DATA_PLACEHOLDER,
    UPDATED_MESSAGE,
};

use std::sync::Arc;

use crate::reconcile::Renderer;
use crate::state::OperationalState;

/// Forwards every call to each inner renderer, in order.
#[derive(Default)]
pub struct FanoutRenderer {
    renderers: Vec<Arc<dyn Renderer>>,
}

impl FanoutRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderers.push(renderer);
        self
    }

    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }
}

impl Renderer for FanoutRenderer {
    fn render(&self, state: OperationalState) {
        for renderer in &self.renderers {
            renderer.render(state.clone());
        }
    }

    fn notify(&self) {
        for renderer in &self.renderers {
            renderer.notify();
        }
    }
}
