//! Avatar frames
//!
//! The pixel-art face shown by the widget. Each status alternates between
//! two frames on a fixed cadence; Thinking holds a single static frame and
//! the Wink frame is held briefly after playback ends.

use super::Status;

/// Interval between animation frame toggles
pub const FRAME_CADENCE: std::time::Duration = std::time::Duration::from_millis(2500);

/// A face from the fixed avatar set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvatarFrame {
    /// Mouth open, the resting face
    #[default]
    Open,
    /// Smiling
    Happy,
    /// Tired
    Tired,
    /// Angry
    Angry,
    /// Winking, shown after playback completes
    Wink,
    /// Pondering, shown while waiting on the backend
    Thinking,
    /// Sad
    Sad,
}

impl AvatarFrame {
    /// Every frame in the art set, in manifest order
    pub const ALL: [Self; 7] = [
        Self::Open,
        Self::Happy,
        Self::Tired,
        Self::Angry,
        Self::Wink,
        Self::Thinking,
        Self::Sad,
    ];

    /// Art asset file name for this frame
    #[must_use]
    pub const fn asset(self) -> &'static str {
        match self {
            Self::Open => "abierto.png",
            Self::Happy => "feliz.png",
            Self::Tired => "cansado.png",
            Self::Angry => "enojado.png",
            Self::Wink => "guiño.png",
            Self::Thinking => "pensando.png",
            Self::Sad => "triste.png",
        }
    }

    /// Next frame for one animation tick under the given status
    ///
    /// Idle rests on Happy and blinks to Open; Listening and Speaking run
    /// the same pair with the opposite phase. Thinking never advances.
    #[must_use]
    pub const fn advanced(self, status: Status) -> Self {
        match status {
            Status::Idle => {
                if matches!(self, Self::Happy) {
                    Self::Open
                } else {
                    Self::Happy
                }
            }
            Status::Listening | Status::Speaking => {
                if matches!(self, Self::Open) {
                    Self::Happy
                } else {
                    Self::Open
                }
            }
            Status::Thinking => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_rests_on_happy() {
        assert_eq!(AvatarFrame::Open.advanced(Status::Idle), AvatarFrame::Happy);
        assert_eq!(AvatarFrame::Happy.advanced(Status::Idle), AvatarFrame::Open);
        // Any stray frame converges onto the pair
        assert_eq!(AvatarFrame::Wink.advanced(Status::Idle), AvatarFrame::Happy);
    }

    #[test]
    fn test_listening_and_speaking_rest_on_open() {
        for status in [Status::Listening, Status::Speaking] {
            assert_eq!(AvatarFrame::Open.advanced(status), AvatarFrame::Happy);
            assert_eq!(AvatarFrame::Happy.advanced(status), AvatarFrame::Open);
            // Leaving Thinking lands back on Open first
            assert_eq!(AvatarFrame::Thinking.advanced(status), AvatarFrame::Open);
        }
    }

    #[test]
    fn test_thinking_never_advances() {
        for frame in AvatarFrame::ALL {
            assert_eq!(frame.advanced(Status::Thinking), frame);
        }
    }

    #[test]
    fn test_asset_names() {
        assert_eq!(AvatarFrame::Open.asset(), "abierto.png");
        assert_eq!(AvatarFrame::Wink.asset(), "guiño.png");
        assert_eq!(AvatarFrame::Thinking.asset(), "pensando.png");
        assert_eq!(AvatarFrame::ALL.len(), 7);
    }
}
