//! Widget core
//!
//! Status, avatar animation, and the state machine that ties the controls,
//! the speech pipeline, and the generation backend together.

mod avatar;
mod machine;
mod status;

pub use avatar::{AvatarFrame, FRAME_CADENCE};
pub use machine::{
    DICTATION_WINDOW, Effect, Notice, SessionId, WINK_HOLD, WidgetEvent, WidgetMachine,
};
pub use status::Status;
