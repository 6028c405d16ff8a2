use glam::{Vec2, Vec3};

use crate::action::{Action, Control};

/// Input state accumulated between two control-thread pumps.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputFrame {
    held: u8,
    pub pointer_delta: Vec2,
    pub scroll: f32,
    /// Latest surface size reported since the last pump.
    pub resize: Option<(u32, u32)>,
    pub minimized: bool,
    pub quit: bool,
}

impl InputFrame {
    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Press(control) => self.held |= control.bit(),
            Action::Release(control) => self.held &= !control.bit(),
            Action::PointerMotion(delta) => self.pointer_delta += delta,
            Action::Scroll(lines) => self.scroll += lines,
            Action::Resize { width, height } => self.resize = Some((width, height)),
            Action::Minimized(minimized) => self.minimized = minimized,
            Action::Quit => {
                tracing::debug!("quit requested");
                self.quit = true;
            }
            Action::Noop => {}
        }
    }

    /// Fold a batch of actions into a fresh frame.
    pub fn aggregate(actions: impl IntoIterator<Item = Action>) -> Self {
        let mut frame = Self::default();
        frame.extend(actions);
        frame
    }

    pub fn extend(&mut self, actions: impl IntoIterator<Item = Action>) {
        for action in actions {
            self.apply(action);
        }
    }

    /// Fold a newer frame into this accumulator. Held controls and the
    /// minimized flag take the newer state; deltas add up.
    pub fn merge(&mut self, newer: &InputFrame) {
        self.held = newer.held;
        self.pointer_delta += newer.pointer_delta;
        self.scroll += newer.scroll;
        if newer.resize.is_some() {
            self.resize = newer.resize;
        }
        self.minimized = newer.minimized;
        self.quit |= newer.quit;
    }

    pub fn is_held(&self, control: Control) -> bool {
        self.held & control.bit() != 0
    }

    /// Camera-local movement intent: x right, y forward, z up. Not normalized.
    pub fn movement(&self) -> Vec3 {
        let axis = |pos: Control, neg: Control| {
            self.is_held(pos) as i32 as f32 - self.is_held(neg) as i32 as f32
        };
        Vec3::new(
            axis(Control::MoveRight, Control::MoveLeft),
            axis(Control::MoveForward, Control::MoveBack),
            axis(Control::MoveUp, Control::MoveDown),
        )
    }

    /// Return this frame and reset its one-shot deltas, keeping held
    /// controls and the minimized flag for the next pump.
    pub fn take(&mut self) -> Self {
        let frame = *self;
        self.pointer_delta = Vec2::ZERO;
        self.scroll = 0.0;
        self.resize = None;
        frame
    }
}
