//! Widget machine integration tests
//!
//! Drive the machine through complete interaction cycles with scripted
//! events; no audio hardware or network is involved.

use pretty_assertions::assert_eq;

use uli_assistant::widget::{
    AvatarFrame, Effect, Notice, SessionId, Status, WidgetEvent, WidgetMachine,
};

fn machine() -> WidgetMachine {
    let mut m = WidgetMachine::new("hola uli", true, true);
    assert_eq!(m.boot(), vec![Effect::ListenForWake]);
    m
}

/// Say the wake phrase and return the dictation session
fn wake(m: &mut WidgetMachine) -> SessionId {
    let effects = m.handle(WidgetEvent::Transcript {
        text: "hola uli".to_string(),
    });
    let session = m.session();
    assert_eq!(
        effects,
        vec![
            Effect::StartDictation { session },
            Effect::ScheduleAutoStop { session },
        ]
    );
    session
}

/// Dictate one utterance and let the window expire, up to the Generate effect
fn dictate(m: &mut WidgetMachine, session: SessionId, text: &str) {
    let _ = m.handle(WidgetEvent::Transcript {
        text: text.to_string(),
    });
    assert_eq!(
        m.handle(WidgetEvent::DictationExpired { session }),
        vec![Effect::FinishDictation { session }]
    );
    assert_eq!(
        m.handle(WidgetEvent::DictationFinished { session }),
        vec![Effect::Generate {
            session,
            prompt: text.to_string(),
        }]
    );
}

#[test]
fn test_full_wake_cycle() {
    let mut m = machine();
    assert_eq!(m.status(), Status::Idle);
    assert_eq!(m.frame(), AvatarFrame::Open);

    let session = wake(&mut m);
    assert_eq!(m.status(), Status::Listening);

    dictate(&mut m, session, "qué hora es");
    assert_eq!(m.status(), Status::Thinking);
    assert_eq!(m.frame(), AvatarFrame::Thinking);
    assert_eq!(m.text(), "qué hora es");

    // Reply arrives, playback starts
    let effects = m.handle(WidgetEvent::ReplyReady {
        session,
        text: "son las tres".to_string(),
    });
    assert_eq!(
        effects,
        vec![Effect::Speak {
            session,
            text: "son las tres".to_string(),
        }]
    );
    assert_eq!(m.status(), Status::Speaking);

    // Playback ends: wink, hold, then back to rest
    assert_eq!(
        m.handle(WidgetEvent::SpeechFinished { session }),
        vec![Effect::ScheduleWinkEnd { session }]
    );
    assert_eq!(m.status(), Status::Speaking);
    assert_eq!(m.frame(), AvatarFrame::Wink);

    assert_eq!(
        m.handle(WidgetEvent::WinkElapsed { session }),
        vec![Effect::ListenForWake]
    );
    assert_eq!(m.status(), Status::Idle);
    assert_eq!(m.frame(), AvatarFrame::Open);
}

#[test]
fn test_manual_cycle_has_no_auto_stop() {
    let mut m = machine();
    let effects = m.handle(WidgetEvent::MicPressed);
    let session = m.session();
    assert_eq!(effects, vec![Effect::StartDictation { session }]);

    let _ = m.handle(WidgetEvent::Transcript {
        text: "cuéntame algo".to_string(),
    });
    assert_eq!(
        m.handle(WidgetEvent::StopPressed),
        vec![Effect::FinishDictation { session }]
    );
    assert_eq!(
        m.handle(WidgetEvent::DictationFinished { session }),
        vec![Effect::Generate {
            session,
            prompt: "cuéntame algo".to_string(),
        }]
    );
}

#[test]
fn test_empty_dictation_notices_and_resets() {
    let mut m = machine();
    let session = wake(&mut m);

    assert_eq!(
        m.handle(WidgetEvent::DictationExpired { session }),
        vec![Effect::FinishDictation { session }]
    );
    let effects = m.handle(WidgetEvent::DictationFinished { session });
    assert_eq!(
        effects,
        vec![Effect::Notify(Notice::NothingHeard), Effect::ListenForWake]
    );
    assert_eq!(m.status(), Status::Idle);
    assert_eq!(m.frame(), AvatarFrame::Open);
}

#[test]
fn test_backend_failure_never_reaches_playback() {
    let mut m = machine();
    let session = wake(&mut m);
    dictate(&mut m, session, "hola");

    let effects = m.handle(WidgetEvent::ReplyFailed {
        session,
        error: "500".to_string(),
    });
    assert!(
        !effects.iter().any(|e| matches!(e, Effect::Speak { .. })),
        "backend failure must not start playback"
    );
    assert_eq!(m.status(), Status::Idle);
    assert_eq!(m.frame(), AvatarFrame::Open);
}

#[test]
fn test_animation_phase_follows_status() {
    let mut m = machine();

    // Idle rests on the Happy/Open pair
    let _ = m.handle(WidgetEvent::Tick);
    assert_eq!(m.frame(), AvatarFrame::Happy);
    let _ = m.handle(WidgetEvent::Tick);
    assert_eq!(m.frame(), AvatarFrame::Open);

    // Listening runs the opposite phase
    let session = wake(&mut m);
    let _ = m.handle(WidgetEvent::Tick);
    assert_eq!(m.frame(), AvatarFrame::Happy);
    let _ = m.handle(WidgetEvent::Tick);
    assert_eq!(m.frame(), AvatarFrame::Open);

    // Thinking is static
    dictate(&mut m, session, "hola");
    for _ in 0..3 {
        let _ = m.handle(WidgetEvent::Tick);
        assert_eq!(m.frame(), AvatarFrame::Thinking);
    }

    // Speaking resumes the animation from the Thinking frame
    let _ = m.handle(WidgetEvent::ReplyReady {
        session,
        text: "sí".to_string(),
    });
    assert_eq!(m.frame(), AvatarFrame::Thinking);
    let _ = m.handle(WidgetEvent::Tick);
    assert_eq!(m.frame(), AvatarFrame::Open);
    let _ = m.handle(WidgetEvent::Tick);
    assert_eq!(m.frame(), AvatarFrame::Happy);
}

#[test]
fn test_empty_speak_is_idempotent_and_widget_still_works() {
    let mut m = machine();

    for _ in 0..5 {
        assert_eq!(
            m.handle(WidgetEvent::SpeakPressed),
            vec![Effect::Notify(Notice::NothingToSpeak)]
        );
        assert_eq!(m.status(), Status::Idle);
        assert_eq!(m.frame(), AvatarFrame::Open);
    }

    // A full cycle still runs afterwards
    let session = wake(&mut m);
    dictate(&mut m, session, "hola");
    assert_eq!(m.status(), Status::Thinking);
}

#[test]
fn test_speak_button_uses_edited_text() {
    let mut m = machine();
    let _ = m.handle(WidgetEvent::TextEdited {
        text: "  buenas noches  ".to_string(),
    });
    let effects = m.handle(WidgetEvent::SpeakPressed);
    let session = m.session();
    // The text is spoken as written; only the emptiness check trims
    assert_eq!(
        effects,
        vec![Effect::Speak {
            session,
            text: "  buenas noches  ".to_string(),
        }]
    );
    assert_eq!(m.status(), Status::Speaking);
}

#[test]
fn test_stale_sessions_are_inert_across_cycles() {
    let mut m = machine();

    // First cycle reaches Thinking, then the user gives up and a second
    // wake happens after the failure reset
    let first = wake(&mut m);
    dictate(&mut m, first, "primera");
    let _ = m.handle(WidgetEvent::ReplyFailed {
        session: first,
        error: "timeout".to_string(),
    });

    let second = wake(&mut m);
    assert_ne!(first, second);

    // Every completion of the first cycle must now be ignored
    assert_eq!(
        m.handle(WidgetEvent::ReplyReady {
            session: first,
            text: "tarde".to_string(),
        }),
        vec![]
    );
    assert_eq!(m.handle(WidgetEvent::DictationExpired { session: first }), vec![]);
    assert_eq!(m.handle(WidgetEvent::SpeechFinished { session: first }), vec![]);
    assert_eq!(m.handle(WidgetEvent::WinkElapsed { session: first }), vec![]);

    assert_eq!(m.status(), Status::Listening);
    assert_eq!(m.session(), second);
}

#[test]
fn test_resume_policy_controls_rearming() {
    let mut m = WidgetMachine::new("hola uli", true, false);
    assert_eq!(m.boot(), vec![Effect::ListenForWake]);

    let session = wake(&mut m);
    let _ = m.handle(WidgetEvent::DictationExpired { session });
    let effects = m.handle(WidgetEvent::DictationFinished { session });

    // Reset happens, but wake listening is not re-armed
    assert_eq!(effects, vec![Effect::Notify(Notice::NothingHeard)]);
    assert_eq!(m.status(), Status::Idle);
}

#[test]
fn test_wake_during_thinking_is_ignored() {
    let mut m = machine();
    let session = wake(&mut m);
    dictate(&mut m, session, "hola");

    let effects = m.handle(WidgetEvent::Transcript {
        text: "hola uli".to_string(),
    });
    assert_eq!(effects, vec![]);
    assert_eq!(m.status(), Status::Thinking);
    assert_eq!(m.session(), session);
}

#[test]
fn test_capture_failure_mid_dictation_resets() {
    let mut m = machine();
    let session = wake(&mut m);

    let effects = m.handle(WidgetEvent::CaptureFailed {
        session,
        error: "device lost".to_string(),
    });
    // The failed device is not re-armed, so the alert fires exactly once
    assert_eq!(effects, vec![Effect::Notify(Notice::CaptureUnavailable)]);
    assert_eq!(m.status(), Status::Idle);
    assert_eq!(m.frame(), AvatarFrame::Open);
}

#[test]
fn test_empty_reply_resets_without_playback() {
    let mut m = machine();
    let session = wake(&mut m);
    dictate(&mut m, session, "hola");

    let effects = m.handle(WidgetEvent::ReplyReady {
        session,
        text: String::new(),
    });
    assert_eq!(
        effects,
        vec![Effect::Notify(Notice::EmptyReply), Effect::ListenForWake]
    );
    assert_eq!(m.status(), Status::Idle);
    assert_eq!(m.frame(), AvatarFrame::Open);
}

#[test]
fn test_speech_failure_resets_to_idle() {
    let mut m = machine();
    let _ = m.handle(WidgetEvent::TextEdited {
        text: "hola".to_string(),
    });
    let _ = m.handle(WidgetEvent::SpeakPressed);
    let session = m.session();

    let effects = m.handle(WidgetEvent::SpeechFailed {
        session,
        error: "no output device".to_string(),
    });
    assert_eq!(
        effects,
        vec![
            Effect::Notify(Notice::SpeechFailed("no output device".to_string())),
            Effect::ListenForWake,
        ]
    );
    assert_eq!(m.status(), Status::Idle);
    assert_eq!(m.frame(), AvatarFrame::Open);
}
