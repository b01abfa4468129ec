//! Widget state machine
//!
//! The core of the widget: every input is an event, every transition is
//! synchronous, and side effects come back as data for the event loop to
//! execute. Deferred completions (timers, backend replies, playback) carry
//! the session id they were started under and are discarded once a newer
//! cycle begins, so a slow backend can never resurrect a finished cycle.

use std::fmt;
use std::time::Duration;

use super::{AvatarFrame, Status};

/// How long dictation runs before the automatic stop (wake path only)
pub const DICTATION_WINDOW: Duration = Duration::from_millis(5000);

/// How long the wink frame is held after playback completes
pub const WINK_HOLD: Duration = Duration::from_millis(2000);

/// Identifier for one dictation/reply/playback cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An input to the widget machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    /// Animation cadence elapsed
    Tick,
    /// Microphone control pressed
    MicPressed,
    /// Stop control pressed
    StopPressed,
    /// Speak control pressed
    SpeakPressed,
    /// Text box edited to the given content
    TextEdited {
        /// New text box content
        text: String,
    },
    /// A recognized utterance arrived from capture
    Transcript {
        /// Recognized text
        text: String,
    },
    /// The automatic dictation stop fired
    DictationExpired {
        /// Cycle the timer was scheduled for
        session: SessionId,
    },
    /// Recognition finished draining after a stop
    DictationFinished {
        /// Cycle the capture belonged to
        session: SessionId,
    },
    /// Dictation capture broke down
    CaptureFailed {
        /// Cycle the capture belonged to
        session: SessionId,
        /// What went wrong
        error: String,
    },
    /// The generation backend replied
    ReplyReady {
        /// Cycle the request belonged to
        session: SessionId,
        /// Reply text
        text: String,
    },
    /// The generation backend failed
    ReplyFailed {
        /// Cycle the request belonged to
        session: SessionId,
        /// What went wrong
        error: String,
    },
    /// Spoken playback completed
    SpeechFinished {
        /// Cycle the playback belonged to
        session: SessionId,
    },
    /// Synthesis or playback failed
    SpeechFailed {
        /// Cycle the playback belonged to
        session: SessionId,
        /// What went wrong
        error: String,
    },
    /// The wink hold elapsed
    WinkElapsed {
        /// Cycle the hold belonged to
        session: SessionId,
    },
}

/// An action for the event loop to carry out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start or resume continuous wake-phrase listening
    ListenForWake,
    /// Begin dictation capture for the session
    StartDictation {
        /// Cycle to capture for
        session: SessionId,
    },
    /// Schedule the automatic dictation stop after [`DICTATION_WINDOW`]
    ScheduleAutoStop {
        /// Cycle to stop
        session: SessionId,
    },
    /// Stop dictation capture, flush buffered audio through recognition,
    /// and report [`WidgetEvent::DictationFinished`] once recognition has
    /// drained
    FinishDictation {
        /// Cycle being stopped
        session: SessionId,
    },
    /// Send the prompt to the generation backend
    Generate {
        /// Cycle the request belongs to
        session: SessionId,
        /// Prompt text, already trimmed
        prompt: String,
    },
    /// Synthesize and play the given text
    Speak {
        /// Cycle the playback belongs to
        session: SessionId,
        /// Text to speak
        text: String,
    },
    /// Schedule the end of the wink hold after [`WINK_HOLD`]
    ScheduleWinkEnd {
        /// Cycle being winked at
        session: SessionId,
    },
    /// Surface a notice to the user
    Notify(Notice),
}

/// User-visible notice, the single channel for everything the user must see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// No capture device or no transcription service is available
    CaptureUnavailable,
    /// Dictation ended without any recognized speech
    NothingHeard,
    /// Speak was pressed with nothing in the text box
    NothingToSpeak,
    /// The backend reply was blank
    EmptyReply,
    /// The backend call failed
    BackendFailed(String),
    /// Synthesis or playback failed
    SpeechFailed(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaptureUnavailable => f.write_str("No hay reconocimiento de voz disponible"),
            Self::NothingHeard => f.write_str("No se detectó contenido de la voz"),
            Self::NothingToSpeak => f.write_str("No hay contenido en el cuadro de texto"),
            Self::EmptyReply => f.write_str("La respuesta llegó vacía"),
            Self::BackendFailed(e) => write!(f, "Error al llamar a la API: {e}"),
            Self::SpeechFailed(e) => write!(f, "Error al reproducir la voz: {e}"),
        }
    }
}

/// The widget state machine
///
/// Owns status, frame, and the text box. Consumes [`WidgetEvent`]s and
/// returns the [`Effect`]s the event loop must run. All action gating lives
/// here: controls pressed in the wrong status are ignored instead of racing
/// each other.
#[derive(Debug)]
pub struct WidgetMachine {
    status: Status,
    frame: AvatarFrame,
    text: String,
    live_transcript: String,
    session: SessionId,
    finishing: bool,
    wink_pending: bool,
    wake_phrase: String,
    capture_available: bool,
    resume_wake: bool,
}

impl WidgetMachine {
    /// Create a machine in the idle state
    ///
    /// # Arguments
    ///
    /// * `wake_phrase` - Trigger phrase, matched case-insensitively
    /// * `capture_available` - Result of the boot-time capture probe;
    ///   revoked for the rest of the run if capture later fails
    /// * `resume_wake` - Re-arm wake listening on every return to idle
    #[must_use]
    pub fn new(wake_phrase: &str, capture_available: bool, resume_wake: bool) -> Self {
        Self {
            status: Status::Idle,
            frame: AvatarFrame::Open,
            text: String::new(),
            live_transcript: String::new(),
            session: SessionId(0),
            finishing: false,
            wink_pending: false,
            wake_phrase: wake_phrase.to_lowercase().trim().to_string(),
            capture_available,
            resume_wake,
        }
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Current avatar frame
    #[must_use]
    pub const fn frame(&self) -> AvatarFrame {
        self.frame
    }

    /// Text box content (last recognized or edited text)
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Session stamped on the current cycle
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Effects to run when the widget starts
    #[must_use]
    pub fn boot(&mut self) -> Vec<Effect> {
        if self.capture_available {
            tracing::info!(wake_phrase = %self.wake_phrase, "listening for wake phrase");
            vec![Effect::ListenForWake]
        } else {
            vec![Effect::Notify(Notice::CaptureUnavailable)]
        }
    }

    /// Advance the machine by one event
    #[must_use]
    pub fn handle(&mut self, event: WidgetEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            WidgetEvent::Tick => self.on_tick(),
            WidgetEvent::MicPressed => self.on_mic(&mut effects),
            WidgetEvent::StopPressed => self.on_stop(&mut effects),
            WidgetEvent::SpeakPressed => self.on_speak(&mut effects),
            WidgetEvent::TextEdited { text } => self.text = text,
            WidgetEvent::Transcript { text } => self.on_transcript(&text, &mut effects),
            WidgetEvent::DictationExpired { session } => self.on_expired(session, &mut effects),
            WidgetEvent::DictationFinished { session } => self.on_finished(session, &mut effects),
            WidgetEvent::CaptureFailed { session, error } => {
                self.on_capture_failed(session, &error, &mut effects);
            }
            WidgetEvent::ReplyReady { session, text } => {
                self.on_reply(session, text, &mut effects);
            }
            WidgetEvent::ReplyFailed { session, error } => {
                self.on_reply_failed(session, &error, &mut effects);
            }
            WidgetEvent::SpeechFinished { session } => {
                self.on_speech_finished(session, &mut effects);
            }
            WidgetEvent::SpeechFailed { session, error } => {
                self.on_speech_failed(session, &error, &mut effects);
            }
            WidgetEvent::WinkElapsed { session } => self.on_wink_elapsed(session, &mut effects),
        }
        effects
    }

    fn on_tick(&mut self) {
        // The wink frame may not be overwritten by the animation
        if self.wink_pending || !self.status.animates() {
            return;
        }
        self.frame = self.frame.advanced(self.status);
    }

    fn on_mic(&mut self, effects: &mut Vec<Effect>) {
        if self.status != Status::Idle {
            tracing::trace!(status = %self.status, "mic press ignored");
            return;
        }
        if self.capture_available {
            self.begin_dictation(false, effects);
        } else {
            effects.push(Effect::Notify(Notice::CaptureUnavailable));
        }
    }

    fn on_stop(&mut self, effects: &mut Vec<Effect>) {
        if self.status != Status::Listening || self.finishing {
            tracing::trace!(status = %self.status, "stop press ignored");
            return;
        }
        self.finishing = true;
        effects.push(Effect::FinishDictation {
            session: self.session,
        });
    }

    fn on_speak(&mut self, effects: &mut Vec<Effect>) {
        if self.status != Status::Idle {
            tracing::trace!(status = %self.status, "speak press ignored");
            return;
        }
        if self.text.trim().is_empty() {
            effects.push(Effect::Notify(Notice::NothingToSpeak));
            return;
        }
        let session = self.next_session();
        self.set_status(Status::Speaking);
        effects.push(Effect::Speak {
            session,
            text: self.text.clone(),
        });
    }

    fn on_transcript(&mut self, text: &str, effects: &mut Vec<Effect>) {
        match self.status {
            Status::Idle => {
                if text.to_lowercase().contains(&self.wake_phrase) {
                    tracing::info!(transcript = %text, "wake phrase detected");
                    self.begin_dictation(true, effects);
                } else {
                    tracing::trace!(transcript = %text, "no wake phrase");
                }
            }
            Status::Listening => {
                if !self.live_transcript.is_empty() {
                    self.live_transcript.push(' ');
                }
                self.live_transcript.push_str(text);
                tracing::debug!(transcript = %self.live_transcript, "dictation transcript");
            }
            Status::Thinking | Status::Speaking => {
                tracing::trace!(status = %self.status, "transcript ignored");
            }
        }
    }

    fn on_expired(&mut self, session: SessionId, effects: &mut Vec<Effect>) {
        if session != self.session || self.status != Status::Listening || self.finishing {
            tracing::trace!(%session, "auto-stop ignored");
            return;
        }
        tracing::debug!(%session, "dictation window elapsed");
        self.finishing = true;
        effects.push(Effect::FinishDictation { session });
    }

    fn on_finished(&mut self, session: SessionId, effects: &mut Vec<Effect>) {
        if session != self.session || self.status != Status::Listening {
            tracing::trace!(%session, "stale dictation result ignored");
            return;
        }
        self.finishing = false;
        let transcript = std::mem::take(&mut self.live_transcript);
        let prompt = transcript.trim().to_string();
        self.text = transcript;
        if prompt.is_empty() {
            effects.push(Effect::Notify(Notice::NothingHeard));
            self.reset_to_idle(effects);
            return;
        }
        self.set_status(Status::Thinking);
        self.frame = AvatarFrame::Thinking;
        effects.push(Effect::Generate { session, prompt });
    }

    fn on_capture_failed(&mut self, session: SessionId, error: &str, effects: &mut Vec<Effect>) {
        if session != self.session || self.status != Status::Listening {
            tracing::trace!(%session, "stale capture failure ignored");
            return;
        }
        tracing::warn!(%session, error, "dictation capture failed");
        // A device that just failed counts as absent from here on; the
        // reset below must not re-arm wake listening on it
        self.capture_available = false;
        effects.push(Effect::Notify(Notice::CaptureUnavailable));
        self.reset_to_idle(effects);
    }

    fn on_reply(&mut self, session: SessionId, text: String, effects: &mut Vec<Effect>) {
        if session != self.session || self.status != Status::Thinking {
            tracing::trace!(%session, "stale reply ignored");
            return;
        }
        // Rejected here, before Speaking, so the widget cannot strand there
        if text.trim().is_empty() {
            effects.push(Effect::Notify(Notice::EmptyReply));
            self.reset_to_idle(effects);
            return;
        }
        self.set_status(Status::Speaking);
        effects.push(Effect::Speak { session, text });
    }

    fn on_reply_failed(&mut self, session: SessionId, error: &str, effects: &mut Vec<Effect>) {
        if session != self.session || self.status != Status::Thinking {
            tracing::trace!(%session, "stale backend failure ignored");
            return;
        }
        effects.push(Effect::Notify(Notice::BackendFailed(error.to_string())));
        self.reset_to_idle(effects);
    }

    fn on_speech_finished(&mut self, session: SessionId, effects: &mut Vec<Effect>) {
        if session != self.session || self.status != Status::Speaking {
            tracing::trace!(%session, "stale playback completion ignored");
            return;
        }
        self.frame = AvatarFrame::Wink;
        self.wink_pending = true;
        effects.push(Effect::ScheduleWinkEnd { session });
    }

    fn on_speech_failed(&mut self, session: SessionId, error: &str, effects: &mut Vec<Effect>) {
        if session != self.session || self.status != Status::Speaking {
            tracing::trace!(%session, "stale playback failure ignored");
            return;
        }
        effects.push(Effect::Notify(Notice::SpeechFailed(error.to_string())));
        self.reset_to_idle(effects);
    }

    fn on_wink_elapsed(&mut self, session: SessionId, effects: &mut Vec<Effect>) {
        if session != self.session || !self.wink_pending {
            tracing::trace!(%session, "stale wink hold ignored");
            return;
        }
        self.reset_to_idle(effects);
    }

    fn begin_dictation(&mut self, auto_stop: bool, effects: &mut Vec<Effect>) {
        let session = self.next_session();
        self.live_transcript.clear();
        self.finishing = false;
        self.set_status(Status::Listening);
        effects.push(Effect::StartDictation { session });
        if auto_stop {
            effects.push(Effect::ScheduleAutoStop { session });
        }
    }

    fn reset_to_idle(&mut self, effects: &mut Vec<Effect>) {
        self.set_status(Status::Idle);
        self.frame = AvatarFrame::Open;
        self.wink_pending = false;
        self.finishing = false;
        if self.capture_available && self.resume_wake {
            effects.push(Effect::ListenForWake);
        }
    }

    fn next_session(&mut self) -> SessionId {
        self.session = SessionId(self.session.0 + 1);
        self.session
    }

    fn set_status(&mut self, status: Status) {
        if self.status != status {
            tracing::debug!(from = %self.status, to = %status, "status change");
            self.status = status;
        }
    }
}
