//! The three-boolean input vector controllers publish.

use serde::{Deserialize, Serialize};

/// A controller's input state: left, right, and jump.
///
/// The booleans are independent; the screen derives tri-state horizontal
/// movement from `(left, right)` at tick time. Writers always publish the
/// whole object, never a partial merge, so a reader can replace its
/// snapshot wholesale and can never observe a stale mixed vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputState {
    /// Move-left button held.
    pub left: bool,
    /// Move-right button held.
    pub right: bool,
    /// Jump pulse currently high (the controller holds it for a fixed
    /// window, the screen debounces by simulation time).
    pub jump: bool,
}

impl InputState {
    /// The all-false vector.
    pub const NEUTRAL: Self = Self {
        left: false,
        right: false,
        jump: false,
    };

    /// Whether no button is active.
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_as_the_wire_object() {
        let input = InputState {
            left: true,
            right: false,
            jump: true,
        };
        assert_eq!(
            serde_json::to_value(input).unwrap(),
            json!({ "left": true, "right": false, "jump": true })
        );
    }

    #[test]
    fn missing_fields_default_to_false() {
        let input: InputState = serde_json::from_value(json!({ "left": true })).unwrap();
        assert!(input.left);
        assert!(!input.right);
        assert!(!input.jump);
    }

    #[test]
    fn neutral_detection() {
        assert!(InputState::default().is_neutral());
        assert!(!InputState { jump: true, ..InputState::NEUTRAL }.is_neutral());
    }
}
