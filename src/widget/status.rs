//! Widget status
//!
//! The four-valued mode that governs avatar animation and which
//! controls are accepted.

use std::fmt;

/// What the assistant is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Waiting for the wake phrase or a control press
    #[default]
    Idle,
    /// Capturing dictation from the microphone
    Listening,
    /// Waiting on the generation backend
    Thinking,
    /// Playing back the spoken reply
    Speaking,
}

impl Status {
    /// User-facing label shown under the avatar
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "En espera",
            Self::Listening => "Escuchando",
            Self::Thinking => "Pensando",
            Self::Speaking => "Hablando",
        }
    }

    /// Whether this status runs a frame animation
    ///
    /// Thinking shows a single static frame; everything else alternates
    /// between two frames on a fixed cadence.
    #[must_use]
    pub const fn animates(self) -> bool {
        !matches!(self, Self::Thinking)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(Status::Idle.label(), "En espera");
        assert_eq!(Status::Listening.label(), "Escuchando");
        assert_eq!(Status::Thinking.label(), "Pensando");
        assert_eq!(Status::Speaking.label(), "Hablando");
    }

    #[test]
    fn test_only_thinking_is_static() {
        assert!(Status::Idle.animates());
        assert!(Status::Listening.animates());
        assert!(Status::Speaking.animates());
        assert!(!Status::Thinking.animates());
    }
}
