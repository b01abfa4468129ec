//! Daemon - the assistant service
//!
//! Owns the event loop: feeds capture, console, and timer events into the
//! widget machine and executes the effects it returns. All speech and
//! backend work runs on spawned tasks that report back through the event
//! bus, stamped with their session id.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::backend::{BackendClient, ResponseBackend};
use crate::speech::{
    Microphone, OpenAiSynthesizer, SAMPLE_RATE, Speaker, Synthesizer, Transcriber,
    UtteranceSegmenter, WhisperTranscriber, samples_to_wav,
};
use crate::widget::{
    DICTATION_WINDOW, Effect, FRAME_CADENCE, Notice, SessionId, WINK_HOLD, WidgetEvent,
    WidgetMachine,
};
use crate::{Config, Error, Result};

/// Audio processing chunk size (100ms at 16kHz)
const CHUNK_SIZE: usize = 1600;

/// Interval between capture polls
const CAPTURE_POLL: Duration = Duration::from_millis(100);

/// Utterances a dictation can have queued for recognition
const RECOGNITION_QUEUE: usize = 16;

/// Where polled audio is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureRoute {
    /// Microphone idle
    Off,
    /// Continuous wake-phrase monitoring
    Wake,
    /// Bounded dictation capture
    Dictation,
}

/// A console line mapped onto the original widget controls
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleCommand {
    /// Start dictation (the microphone button)
    Listen,
    /// Stop dictation
    Stop,
    /// Speak the text box, optionally editing it first
    Speak(Option<String>),
    /// Edit the text box
    Text(String),
    /// Print text box, status, and frame
    Show,
    /// Leave the daemon
    Quit,
}

/// The Uli daemon
pub struct Daemon {
    config: Config,
    machine: WidgetMachine,
    backend: Arc<dyn ResponseBackend>,
    transcriber: Option<Arc<dyn Transcriber>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    capture: Option<Microphone>,
    segmenter: UtteranceSegmenter,
    pending: Vec<f32>,
    route: CaptureRoute,
    dictation_queue: Option<mpsc::Sender<Vec<f32>>>,
    generate_task: Option<JoinHandle<()>>,
    speak_task: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// Voice services degrade gracefully: without a key or an input device
    /// the widget still runs, with capture reported as unavailable.
    ///
    /// # Errors
    ///
    /// Returns error if a configured speech service cannot be constructed
    pub fn new(config: Config) -> Result<Self> {
        let api_key = config.voice.openai_api_key.clone().unwrap_or_default();
        let voice_on = config.voice.enabled && !api_key.is_empty();

        let transcriber: Option<Arc<dyn Transcriber>> = if voice_on {
            Some(Arc::new(WhisperTranscriber::new(
                api_key.clone(),
                config.voice.stt_model.clone(),
                config.language.clone(),
            )?))
        } else {
            None
        };

        let synthesizer: Option<Arc<dyn Synthesizer>> = if voice_on {
            Some(Arc::new(OpenAiSynthesizer::new(
                api_key,
                config.voice.tts_model.clone(),
                config.voice.tts_voice.clone(),
                config.voice.tts_speed,
            )?))
        } else {
            None
        };

        let mic_present = Microphone::probe();
        if config.voice.enabled && !mic_present {
            tracing::warn!("no input device detected");
        }
        if config.voice.enabled && !voice_on {
            tracing::warn!("OPENAI_API_KEY not set, speech services disabled");
        }

        let capture_available = voice_on && mic_present;
        let machine =
            WidgetMachine::new(&config.wake_phrase, capture_available, config.resume_wake);
        let backend = Arc::new(BackendClient::new(config.backend_url.clone()));

        Ok(Self {
            config,
            machine,
            backend,
            transcriber,
            synthesizer,
            capture: None,
            segmenter: UtteranceSegmenter::new(),
            pending: Vec::new(),
            route: CaptureRoute::Off,
            dictation_queue: None,
            generate_task: None,
            speak_task: None,
        })
    }

    /// Run the daemon until quit or interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the event loop encounters a fatal error
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(
            backend = %self.config.backend_url,
            language = %self.config.language,
            voice = self.config.voice.enabled,
            "daemon running"
        );

        let (events_tx, mut events_rx) = mpsc::channel::<WidgetEvent>(64);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        // Single animation timer slot, re-phased on every status change.
        // The machine ignores ticks while Thinking or holding the wink.
        let mut animation = tokio::time::interval_at(Instant::now() + FRAME_CADENCE, FRAME_CADENCE);
        animation.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut poll = tokio::time::interval(CAPTURE_POLL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let boot = self.machine.boot();
        print_usage();
        if let Some(hint) = wake_hint(&boot, &self.config.wake_phrase) {
            println!("{hint}");
        }
        println!("estado: {}", self.machine.status());
        self.apply(boot, &events_tx).await;

        loop {
            tokio::select! {
                Some(event) = events_rx.recv() => {
                    self.dispatch(event, &events_tx, &mut animation).await;
                }
                _ = poll.tick() => {
                    self.poll_capture(&events_tx);
                }
                _ = animation.tick() => {
                    self.dispatch(WidgetEvent::Tick, &events_tx, &mut animation).await;
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if !self.handle_line(&line, &events_tx, &mut animation).await {
                                break;
                            }
                        }
                        Ok(None) => {
                            tracing::info!("console closed");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "console read failed");
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Feed one event to the machine, render what changed, run the effects
    #[allow(clippy::future_not_send)]
    async fn dispatch(
        &mut self,
        event: WidgetEvent,
        events: &mpsc::Sender<WidgetEvent>,
        animation: &mut Interval,
    ) {
        let status_before = self.machine.status();
        let frame_before = self.machine.frame();

        let effects = self.machine.handle(event);

        if self.machine.status() != status_before {
            animation.reset();
            println!("estado: {}", self.machine.status());
        }
        if self.machine.frame() != frame_before {
            println!("avatar: {}", self.machine.frame().asset());
        }

        self.apply(effects, events).await;
    }

    /// Execute machine effects in order
    #[allow(clippy::future_not_send)]
    async fn apply(&mut self, effects: Vec<Effect>, events: &mpsc::Sender<WidgetEvent>) {
        for effect in effects {
            self.apply_one(effect, events).await;
        }
    }

    #[allow(clippy::future_not_send, clippy::too_many_lines)]
    async fn apply_one(&mut self, effect: Effect, events: &mpsc::Sender<WidgetEvent>) {
        match effect {
            Effect::ListenForWake => {
                self.dictation_queue = None;
                self.segmenter.reset();
                self.pending.clear();
                match self.ensure_capture() {
                    Ok(()) => {
                        self.route = CaptureRoute::Wake;
                        tracing::debug!("wake listening armed");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "wake listening unavailable");
                        self.route = CaptureRoute::Off;
                        notify(&Notice::CaptureUnavailable);
                    }
                }
            }

            Effect::StartDictation { session } => {
                self.abort_tasks();
                self.segmenter.reset();
                self.pending.clear();
                match self.ensure_capture() {
                    Ok(()) => {
                        self.route = CaptureRoute::Dictation;
                        self.dictation_queue = self.spawn_recognition(session, events);
                        tracing::debug!(%session, "dictation started");
                    }
                    Err(e) => {
                        self.route = CaptureRoute::Off;
                        let _ = events
                            .send(WidgetEvent::CaptureFailed {
                                session,
                                error: e.to_string(),
                            })
                            .await;
                    }
                }
            }

            Effect::ScheduleAutoStop { session } => {
                let tx = events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(DICTATION_WINDOW).await;
                    let _ = tx.send(WidgetEvent::DictationExpired { session }).await;
                });
            }

            Effect::FinishDictation { session } => {
                // Classify the partial chunk, then close whatever is open
                let tail = if self.pending.is_empty() {
                    self.segmenter.flush()
                } else {
                    let partial = std::mem::take(&mut self.pending);
                    self.segmenter
                        .feed(&partial)
                        .or_else(|| self.segmenter.flush())
                };

                self.route = CaptureRoute::Off;
                if let Some(mic) = self.capture.as_mut() {
                    mic.stop();
                }

                // Closing the queue lets the worker drain whatever is still
                // in recognition and report the finish after the last
                // transcript
                if let Some(queue) = self.dictation_queue.take() {
                    if let Some(utterance) = tail {
                        if queue.send(utterance).await.is_err() {
                            tracing::warn!(%session, "recognition worker gone, tail dropped");
                        }
                    }
                } else {
                    let _ = events.send(WidgetEvent::DictationFinished { session }).await;
                }
            }

            Effect::Generate { session, prompt } => {
                self.abort_generate();
                let backend = Arc::clone(&self.backend);
                let tx = events.clone();
                self.generate_task = Some(tokio::spawn(async move {
                    match backend.generate(&prompt).await {
                        Ok(text) => {
                            let _ = tx.send(WidgetEvent::ReplyReady { session, text }).await;
                        }
                        Err(e) => {
                            let _ = tx
                                .send(WidgetEvent::ReplyFailed {
                                    session,
                                    error: e.to_string(),
                                })
                                .await;
                        }
                    }
                }));
            }

            Effect::Speak { session, text } => {
                self.abort_speak();
                if let Some(synthesizer) = self.synthesizer.as_ref() {
                    let synthesizer = Arc::clone(synthesizer);
                    let tx = events.clone();
                    self.speak_task = Some(tokio::spawn(async move {
                        match speak(&synthesizer, &text).await {
                            Ok(()) => {
                                let _ = tx.send(WidgetEvent::SpeechFinished { session }).await;
                            }
                            Err(e) => {
                                let _ = tx
                                    .send(WidgetEvent::SpeechFailed {
                                        session,
                                        error: e.to_string(),
                                    })
                                    .await;
                            }
                        }
                    }));
                } else {
                    let _ = events
                        .send(WidgetEvent::SpeechFailed {
                            session,
                            error: "síntesis de voz deshabilitada".to_string(),
                        })
                        .await;
                }
            }

            Effect::ScheduleWinkEnd { session } => {
                let tx = events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(WINK_HOLD).await;
                    let _ = tx.send(WidgetEvent::WinkElapsed { session }).await;
                });
            }

            Effect::Notify(notice) => notify(&notice),
        }
    }

    /// Drain the microphone and feed whole chunks through segmentation
    fn poll_capture(&mut self, events: &mpsc::Sender<WidgetEvent>) {
        if self.route == CaptureRoute::Off {
            return;
        }
        let Some(mic) = self.capture.as_ref() else {
            return;
        };

        let mut samples = mic.drain();
        if samples.is_empty() {
            return;
        }
        self.pending.append(&mut samples);

        while self.pending.len() >= CHUNK_SIZE {
            let chunk: Vec<f32> = self.pending.drain(..CHUNK_SIZE).collect();
            if let Some(utterance) = self.segmenter.feed(&chunk) {
                self.dispatch_utterance(utterance, events);
            }
        }
    }

    /// Hand a completed utterance to recognition
    ///
    /// Dictation utterances go through the session's ordered queue; wake
    /// monitoring checks each utterance independently, so those run
    /// detached.
    fn dispatch_utterance(&self, utterance: Vec<f32>, events: &mpsc::Sender<WidgetEvent>) {
        if let Some(queue) = self.dictation_queue.as_ref() {
            if queue.try_send(utterance).is_err() {
                tracing::warn!("recognition queue full, utterance dropped");
            }
        } else {
            self.spawn_transcription(utterance, events);
        }
    }

    /// Transcribe a completed utterance on its own task
    ///
    /// The result arrives as an unstamped [`WidgetEvent::Transcript`]; the
    /// machine routes it by its own status.
    fn spawn_transcription(&self, utterance: Vec<f32>, events: &mpsc::Sender<WidgetEvent>) {
        let Some(transcriber) = self.transcriber.as_ref() else {
            return;
        };
        let transcriber = Arc::clone(transcriber);
        let tx = events.clone();
        tokio::spawn(async move {
            if let Some(text) = transcribe(&transcriber, &utterance).await {
                let _ = tx.send(WidgetEvent::Transcript { text }).await;
            }
        });
    }

    /// Spawn the ordered recognition worker for one dictation
    ///
    /// Returns the queue feeding it, or `None` when no transcriber is
    /// configured.
    fn spawn_recognition(
        &self,
        session: SessionId,
        events: &mpsc::Sender<WidgetEvent>,
    ) -> Option<mpsc::Sender<Vec<f32>>> {
        let transcriber = Arc::clone(self.transcriber.as_ref()?);
        let (queue, utterances) = mpsc::channel(RECOGNITION_QUEUE);
        tokio::spawn(run_recognition(transcriber, utterances, events.clone(), session));
        Some(queue)
    }

    /// Handle one console line; returns false on quit
    #[allow(clippy::future_not_send)]
    async fn handle_line(
        &mut self,
        line: &str,
        events: &mpsc::Sender<WidgetEvent>,
        animation: &mut Interval,
    ) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }

        match parse_command(line) {
            Some(ConsoleCommand::Listen) => {
                self.dispatch(WidgetEvent::MicPressed, events, animation).await;
            }
            Some(ConsoleCommand::Stop) => {
                self.dispatch(WidgetEvent::StopPressed, events, animation).await;
            }
            Some(ConsoleCommand::Speak(text)) => {
                if let Some(text) = text {
                    self.dispatch(WidgetEvent::TextEdited { text }, events, animation)
                        .await;
                }
                self.dispatch(WidgetEvent::SpeakPressed, events, animation).await;
            }
            Some(ConsoleCommand::Text(text)) => {
                self.dispatch(WidgetEvent::TextEdited { text }, events, animation)
                    .await;
            }
            Some(ConsoleCommand::Show) => self.show(),
            Some(ConsoleCommand::Quit) => return false,
            None => print_usage(),
        }
        true
    }

    fn show(&self) {
        println!("estado: {}", self.machine.status());
        println!("avatar: {}", self.machine.frame().asset());
        println!("texto: {}", self.machine.text());
    }

    /// Open and start the microphone if it is not already running
    fn ensure_capture(&mut self) -> Result<()> {
        if self.capture.is_none() {
            self.capture = Some(Microphone::open()?);
        }
        if let Some(mic) = self.capture.as_mut() {
            mic.start()?;
            mic.clear();
        }
        Ok(())
    }

    fn abort_generate(&mut self) {
        if let Some(task) = self.generate_task.take() {
            task.abort();
        }
    }

    fn abort_speak(&mut self) {
        if let Some(task) = self.speak_task.take() {
            task.abort();
        }
    }

    fn abort_tasks(&mut self) {
        self.abort_generate();
        self.abort_speak();
    }

    fn shutdown(&mut self) {
        self.abort_tasks();
        self.dictation_queue = None;
        if let Some(mic) = self.capture.as_mut() {
            mic.stop();
        }
        tracing::info!("daemon stopped");
    }
}

/// Recognize one dictation's utterances strictly in spoken order
///
/// A single worker per dictation serializes the transcription calls, so
/// transcripts reach the machine in the order the words were said even when
/// the recognition service answers out of order. The finish event goes out
/// only once the queue has closed and drained; speech still in recognition
/// when the window ends is never lost.
async fn run_recognition(
    transcriber: Arc<dyn Transcriber>,
    mut utterances: mpsc::Receiver<Vec<f32>>,
    events: mpsc::Sender<WidgetEvent>,
    session: SessionId,
) {
    while let Some(utterance) = utterances.recv().await {
        if let Some(text) = transcribe(&transcriber, &utterance).await {
            let _ = events.send(WidgetEvent::Transcript { text }).await;
        }
    }
    let _ = events.send(WidgetEvent::DictationFinished { session }).await;
}

/// Encode and transcribe an utterance, dropping blank results
async fn transcribe(transcriber: &Arc<dyn Transcriber>, utterance: &[f32]) -> Option<String> {
    let wav = match samples_to_wav(utterance, SAMPLE_RATE) {
        Ok(wav) => wav,
        Err(e) => {
            tracing::warn!(error = %e, "WAV encoding failed");
            return None;
        }
    };
    match transcriber.transcribe(&wav).await {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            tracing::trace!("blank transcription discarded");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "transcription failed");
            None
        }
    }
}

/// Synthesize text and play it to completion
///
/// Playback blocks, so it runs on a blocking task; the speaker is opened on
/// that thread because cpal streams must not cross threads.
async fn speak(synthesizer: &Arc<dyn Synthesizer>, text: &str) -> Result<()> {
    let mp3 = synthesizer.synthesize(text).await?;
    tokio::task::spawn_blocking(move || {
        let speaker = Speaker::open()?;
        speaker.play_mp3(&mp3)
    })
    .await
    .map_err(|e| Error::Audio(e.to_string()))?
}

/// Surface a notice on the console and the log
fn notify(notice: &Notice) {
    println!("aviso: {notice}");
    tracing::warn!(notice = %notice, "user notice");
}

/// Banner line announcing the wake phrase, present when boot armed wake
/// listening
fn wake_hint(effects: &[Effect], wake_phrase: &str) -> Option<String> {
    effects
        .contains(&Effect::ListenForWake)
        .then(|| format!("di \"{wake_phrase}\" para activar el asistente"))
}

fn print_usage() {
    println!("comandos: listen | stop | speak [texto] | text <texto> | show | quit");
}

fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

    match verb {
        "listen" => Some(ConsoleCommand::Listen),
        "stop" => Some(ConsoleCommand::Stop),
        "speak" => Some(ConsoleCommand::Speak(
            (!rest.is_empty()).then(|| rest.to_string()),
        )),
        "text" => Some(ConsoleCommand::Text(rest.to_string())),
        "show" => Some(ConsoleCommand::Show),
        "quit" | "exit" => Some(ConsoleCommand::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    /// Answers long clips slowly and short ones instantly, so concurrent
    /// calls would complete in reverse order
    struct StaggeredTranscriber;

    #[async_trait]
    impl Transcriber for StaggeredTranscriber {
        async fn transcribe(&self, wav: &[u8]) -> Result<String> {
            if wav.len() > 44 + 2 * CHUNK_SIZE {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok("primero".to_string())
            } else {
                Ok("segundo".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_recognition_preserves_spoken_order() {
        let session = WidgetMachine::new("hola uli", true, true).session();
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (queue, utterances) = mpsc::channel(8);
        let worker = tokio::spawn(run_recognition(
            Arc::new(StaggeredTranscriber),
            utterances,
            events_tx,
            session,
        ));

        // The slow clip goes in first; racing recognitions would let the
        // fast one overtake it
        queue.send(vec![0.1; CHUNK_SIZE * 2]).await.unwrap();
        queue.send(vec![0.1; CHUNK_SIZE]).await.unwrap();
        drop(queue);
        worker.await.unwrap();

        assert_eq!(
            events_rx.recv().await,
            Some(WidgetEvent::Transcript {
                text: "primero".to_string()
            })
        );
        assert_eq!(
            events_rx.recv().await,
            Some(WidgetEvent::Transcript {
                text: "segundo".to_string()
            })
        );
        assert_eq!(
            events_rx.recv().await,
            Some(WidgetEvent::DictationFinished { session })
        );
    }

    #[tokio::test]
    async fn test_finish_reported_only_after_recognition_drains() {
        let session = WidgetMachine::new("hola uli", true, true).session();
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (queue, utterances) = mpsc::channel(8);
        let worker = tokio::spawn(run_recognition(
            Arc::new(StaggeredTranscriber),
            utterances,
            events_tx,
            session,
        ));

        // The queue closes while the clip is still being recognized; its
        // words must land before the finish event, not get dropped
        queue.send(vec![0.1; CHUNK_SIZE * 2]).await.unwrap();
        drop(queue);
        worker.await.unwrap();

        assert_eq!(
            events_rx.recv().await,
            Some(WidgetEvent::Transcript {
                text: "primero".to_string()
            })
        );
        assert_eq!(
            events_rx.recv().await,
            Some(WidgetEvent::DictationFinished { session })
        );
        assert_eq!(events_rx.recv().await, None);
    }

    #[test]
    fn test_wake_hint_follows_boot_arming() {
        assert_eq!(
            wake_hint(&[Effect::ListenForWake], "hola uli"),
            Some("di \"hola uli\" para activar el asistente".to_string())
        );
        assert_eq!(
            wake_hint(&[Effect::Notify(Notice::CaptureUnavailable)], "hola uli"),
            None
        );
    }

    #[test]
    fn test_parse_bare_commands() {
        assert_eq!(parse_command("listen"), Some(ConsoleCommand::Listen));
        assert_eq!(parse_command("stop"), Some(ConsoleCommand::Stop));
        assert_eq!(parse_command("speak"), Some(ConsoleCommand::Speak(None)));
        assert_eq!(parse_command("show"), Some(ConsoleCommand::Show));
        assert_eq!(parse_command("quit"), Some(ConsoleCommand::Quit));
        assert_eq!(parse_command("exit"), Some(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_commands_with_arguments() {
        assert_eq!(
            parse_command("speak hola mundo"),
            Some(ConsoleCommand::Speak(Some("hola mundo".to_string())))
        );
        assert_eq!(
            parse_command("text qué hora es"),
            Some(ConsoleCommand::Text("qué hora es".to_string()))
        );
        // Bare "text" clears the box
        assert_eq!(
            parse_command("text"),
            Some(ConsoleCommand::Text(String::new()))
        );
    }

    #[test]
    fn test_parse_rejects_unknown_verbs() {
        assert_eq!(parse_command("hablar"), None);
        assert_eq!(parse_command("listen-now"), None);
    }
}
