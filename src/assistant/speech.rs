//! Voice input adapter — continuous speech recognition behind a small API.
//!
//! A [`SpeechRecognizer`] pushes [`RecognitionEvent`]s into a channel; a pump
//! task owned by [`SpeechInput`] folds them into a cumulative transcript and
//! fires the `on_result` / `on_end` callbacks.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SpeechError;

pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Event emitted by a recognizer during one listening session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Best hypothesis of every result segment recognized so far.
    Result(Vec<String>),
    /// The recognizer stopped on its own (silence, process exit).
    End,
}

/// A continuous recognizer with interim results.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Whether recognition can run on this host.
    fn is_available(&self) -> bool {
        true
    }

    /// Begin a session. Returns once recognition is running; events flow into
    /// `events` until `cancel` fires or the recognizer ends by itself.
    async fn start(
        &self,
        language: &str,
        events: mpsc::UnboundedSender<RecognitionEvent>,
        cancel: CancellationToken,
    ) -> Result<(), SpeechError>;
}

pub type ResultCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type EndCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct SpeechOptions {
    pub language: String,
    pub on_result: Option<ResultCallback>,
    pub on_end: Option<EndCallback>,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            on_result: None,
            on_end: None,
        }
    }
}

impl SpeechOptions {
    pub fn on_result(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_result = Some(Arc::new(f));
        self
    }

    pub fn on_end(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_end = Some(Arc::new(f));
        self
    }
}

#[derive(Debug, Clone, Default)]
struct ListenState {
    listening: bool,
    transcript: String,
    /// Incremented per session so a finished pump can't clobber a newer one.
    session: u64,
}

pub struct SpeechInput {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    options: SpeechOptions,
    state: Arc<watch::Sender<ListenState>>,
    cancel: std::sync::Mutex<Option<CancellationToken>>,
}

impl SpeechInput {
    pub fn new(recognizer: Option<Arc<dyn SpeechRecognizer>>, options: SpeechOptions) -> Self {
        let (state, _) = watch::channel(ListenState::default());
        Self {
            recognizer,
            options,
            state: Arc::new(state),
            cancel: std::sync::Mutex::new(None),
        }
    }

    /// False when no recognizer is configured or it can't run here.
    pub fn has_support(&self) -> bool {
        self.recognizer.as_ref().is_some_and(|r| r.is_available())
    }

    pub fn is_listening(&self) -> bool {
        self.state.borrow().listening
    }

    /// Cumulative transcript of the current (or last) session.
    pub fn transcript(&self) -> String {
        self.state.borrow().transcript.clone()
    }

    pub async fn start_listening(&self) -> Result<(), SpeechError> {
        let Some(recognizer) = self.recognizer.clone().filter(|r| r.is_available()) else {
            error!("Speech recognition is not supported on this host");
            return Err(SpeechError::Unsupported);
        };
        if self.is_listening() {
            return Err(SpeechError::AlreadyListening);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        if let Err(e) = recognizer
            .start(&self.options.language, tx, token.clone())
            .await
        {
            error!(error = %e, "Error starting speech recognition");
            return Err(e);
        }

        let mut session = 0;
        self.state.send_modify(|s| {
            s.session += 1;
            s.listening = true;
            s.transcript.clear();
            session = s.session;
        });
        if let Some(previous) = self.swap_cancel(Some(token.clone())) {
            previous.cancel();
        }

        info!(language = %self.options.language, "Speech recognition started");
        tokio::spawn(pump(
            rx,
            token,
            session,
            self.state.clone(),
            self.options.clone(),
        ));
        Ok(())
    }

    /// Stop the current session. `on_end` fires once the pump winds down.
    pub fn stop_listening(&self) {
        if let Some(token) = self.swap_cancel(None) {
            token.cancel();
        }
        self.state.send_if_modified(|s| std::mem::replace(&mut s.listening, false));
    }

    fn swap_cancel(&self, next: Option<CancellationToken>) -> Option<CancellationToken> {
        let mut slot = self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *slot, next)
    }
}

impl Drop for SpeechInput {
    fn drop(&mut self) {
        if let Some(token) = self.swap_cancel(None) {
            token.cancel();
        }
    }
}

async fn pump(
    mut events: mpsc::UnboundedReceiver<RecognitionEvent>,
    cancel: CancellationToken,
    session: u64,
    state: Arc<watch::Sender<ListenState>>,
    options: SpeechOptions,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            ev = events.recv() => ev,
        };
        match event {
            Some(RecognitionEvent::Result(segments)) => {
                let transcript = segments.concat();
                state.send_modify(|s| {
                    if s.session == session {
                        s.transcript = transcript.clone();
                    }
                });
                if let Some(cb) = &options.on_result {
                    cb(&transcript);
                }
            }
            Some(RecognitionEvent::End) | None => break,
        }
    }

    state.send_if_modified(|s| s.session == session && std::mem::replace(&mut s.listening, false));
    debug!(session, "Speech recognition ended");
    if let Some(cb) = &options.on_end {
        cb();
    }
}

// ── Command-backed recognizer ───────────────────────────────────────

/// Runs an external transcription command; each non-empty stdout line is a
/// finalized segment. Process exit ends the session.
pub struct CommandRecognizer {
    argv: Vec<String>,
}

impl CommandRecognizer {
    /// `argv[0]` is the program; `{lang}` in any argument is replaced with the
    /// session language.
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    fn command_for(&self, language: &str) -> Option<Command> {
        let (program, args) = self.argv.split_first()?;
        let mut cmd = Command::new(program);
        cmd.args(args.iter().map(|a| a.replace("{lang}", language)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Some(cmd)
    }
}

#[async_trait]
impl SpeechRecognizer for CommandRecognizer {
    fn is_available(&self) -> bool {
        !self.argv.is_empty()
    }

    async fn start(
        &self,
        language: &str,
        events: mpsc::UnboundedSender<RecognitionEvent>,
        cancel: CancellationToken,
    ) -> Result<(), SpeechError> {
        let mut cmd = self.command_for(language).ok_or(SpeechError::Unsupported)?;
        let mut child = cmd
            .spawn()
            .map_err(|e| SpeechError::StartFailed(format!("{}: {e}", self.argv[0])))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpeechError::StartFailed("stdout not captured".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(line = %line, "Speech command stderr");
                }
            });
        }

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut segments: Vec<String> = Vec::new();
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = child.kill().await;
                        break;
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let line = line.trim_end_matches('\r');
                            if line.trim().is_empty() {
                                continue;
                            }
                            segments.push(line.to_string());
                            if events.send(RecognitionEvent::Result(segments.clone())).is_err() {
                                let _ = child.kill().await;
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "Failed reading speech command output");
                            break;
                        }
                    },
                }
            }
            match child.wait().await {
                Ok(status) if !status.success() && !cancel.is_cancelled() => {
                    warn!(code = ?status.code(), "Speech command exited with failure");
                }
                Err(e) => warn!(error = %e, "Failed waiting for speech command"),
                _ => {}
            }
            let _ = events.send(RecognitionEvent::End);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    /// Emits a fixed script of events, then optionally stays open until cancelled.
    struct ScriptedRecognizer {
        events: Vec<RecognitionEvent>,
        hold_open: bool,
        fail: bool,
    }

    #[async_trait]
    impl SpeechRecognizer for ScriptedRecognizer {
        async fn start(
            &self,
            _language: &str,
            events: mpsc::UnboundedSender<RecognitionEvent>,
            cancel: CancellationToken,
        ) -> Result<(), SpeechError> {
            if self.fail {
                return Err(SpeechError::StartFailed("microphone busy".into()));
            }
            let script = self.events.clone();
            let hold_open = self.hold_open;
            tokio::spawn(async move {
                for ev in script {
                    let _ = events.send(ev);
                }
                if hold_open {
                    cancel.cancelled().await;
                }
            });
            Ok(())
        }
    }

    fn recorder() -> (SpeechOptions, Arc<Mutex<Vec<String>>>, mpsc::UnboundedReceiver<()>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (end_tx, end_rx) = mpsc::unbounded_channel();
        let results = log.clone();
        let ends = log.clone();
        let options = SpeechOptions::default()
            .on_result(move |t| results.lock().unwrap().push(format!("result:{t}")))
            .on_end(move || {
                ends.lock().unwrap().push("end".into());
                let _ = end_tx.send(());
            });
        (options, log, end_rx)
    }

    #[test]
    fn no_recognizer_means_no_support() {
        let input = SpeechInput::new(None, SpeechOptions::default());
        assert!(!input.has_support());
        assert!(!input.is_listening());
        assert_eq!(input.transcript(), "");
    }

    #[tokio::test]
    async fn start_without_support_fails() {
        let input = SpeechInput::new(None, SpeechOptions::default());
        assert!(matches!(
            input.start_listening().await,
            Err(SpeechError::Unsupported)
        ));
        assert!(!input.is_listening());
    }

    #[tokio::test]
    async fn results_accumulate_then_end_fires_once() {
        let (options, log, mut ended) = recorder();
        let recognizer = ScriptedRecognizer {
            events: vec![
                RecognitionEvent::Result(vec!["hello".into()]),
                RecognitionEvent::Result(vec!["hello".into(), " world".into()]),
                RecognitionEvent::End,
            ],
            hold_open: false,
            fail: false,
        };
        let input = SpeechInput::new(Some(Arc::new(recognizer)), options);

        input.start_listening().await.unwrap();
        tokio::time::timeout(WAIT, ended.recv()).await.unwrap();

        assert_eq!(input.transcript(), "hello world");
        assert!(!input.is_listening());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["result:hello", "result:hello world", "end"]
        );
    }

    #[tokio::test]
    async fn stop_listening_ends_session_once() {
        let (options, log, mut ended) = recorder();
        let recognizer = ScriptedRecognizer {
            events: vec![RecognitionEvent::Result(vec!["draft".into()])],
            hold_open: true,
            fail: false,
        };
        let input = SpeechInput::new(Some(Arc::new(recognizer)), options);

        input.start_listening().await.unwrap();
        assert!(input.is_listening());
        assert!(matches!(
            input.start_listening().await,
            Err(SpeechError::AlreadyListening)
        ));

        input.stop_listening();
        assert!(!input.is_listening());
        tokio::time::timeout(WAIT, ended.recv()).await.unwrap();

        let ends = log.lock().unwrap().iter().filter(|e| *e == "end").count();
        assert_eq!(ends, 1);
    }

    #[tokio::test]
    async fn start_failure_keeps_not_listening() {
        let (options, log, _ended) = recorder();
        let recognizer = ScriptedRecognizer {
            events: vec![],
            hold_open: false,
            fail: true,
        };
        let input = SpeechInput::new(Some(Arc::new(recognizer)), options);

        let err = input.start_listening().await.unwrap_err();
        assert!(matches!(err, SpeechError::StartFailed(_)));
        assert!(!input.is_listening());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn command_recognizer_streams_stdout_lines() {
        let (options, _log, mut ended) = recorder();
        let recognizer = CommandRecognizer::new(vec![
            "sh".into(),
            "-c".into(),
            "printf 'lang={lang}\\n\\n more\\n'".into(),
        ]);
        let input = SpeechInput::new(
            Some(Arc::new(recognizer)),
            SpeechOptions {
                language: "de-DE".into(),
                ..options
            },
        );

        input.start_listening().await.unwrap();
        tokio::time::timeout(WAIT, ended.recv()).await.unwrap();
        assert_eq!(input.transcript(), "lang=de-DE more");
    }

    #[tokio::test]
    async fn command_recognizer_reports_spawn_failure() {
        let recognizer = CommandRecognizer::new(vec!["/nonexistent/transcriber".into()]);
        let input = SpeechInput::new(Some(Arc::new(recognizer)), SpeechOptions::default());
        assert!(matches!(
            input.start_listening().await,
            Err(SpeechError::StartFailed(_))
        ));
        assert!(!input.is_listening());
    }

    #[test]
    fn empty_command_is_unavailable() {
        let input = SpeechInput::new(
            Some(Arc::new(CommandRecognizer::new(vec![]))),
            SpeechOptions::default(),
        );
        assert!(!input.has_support());
    }
}
