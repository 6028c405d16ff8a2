//! Input: platform events mapped to [`Action`]s and folded into an [`InputFrame`].
//!
//! # Invariants
//! - The engine consumes actions and frames, never windowing-library events.
//! - Held controls persist across frames; deltas (pointer, scroll, resize) are
//!   consumed once.

pub mod action;
mod frame;

pub use action::{Action, Control};
pub use frame::InputFrame;
