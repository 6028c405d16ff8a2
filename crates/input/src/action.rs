use glam::Vec2;

/// Logical controls the camera responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    MoveForward,
    MoveBack,
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    /// Mouse look is active while held.
    Look,
}

impl Control {
    pub const ALL: [Control; 7] = [
        Control::MoveForward,
        Control::MoveBack,
        Control::MoveLeft,
        Control::MoveRight,
        Control::MoveUp,
        Control::MoveDown,
        Control::Look,
    ];

    pub(crate) fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// One input occurrence, already translated from the platform's event type.
///
/// The desktop shell produces these; the control thread folds them into an
/// [`InputFrame`](crate::InputFrame).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Press(Control),
    Release(Control),
    /// Relative pointer motion in pixels.
    PointerMotion(Vec2),
    /// Scroll wheel lines; positive is away from the user.
    Scroll(f32),
    Resize { width: u32, height: u32 },
    Minimized(bool),
    Quit,
    /// Input with no binding.
    Noop,
}
