//! Request orchestration for the chat and document actions.
//!
//! Every action owns a slot holding its busy counter, the question being
//! asked, the text on display and the token of the most recent request.
//! A request only writes back to its slot (and to the document session)
//! while its token is still the latest one, so a slow response can never
//! overwrite a fresher one. Each call runs under a deadline and can be
//! cancelled; the busy counter is released by a drop guard on every path.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::client::Backend;
use crate::config::Config;
use crate::credential::{KeyValueStore, mask};
use crate::document::{ChatTurn, DocumentSession, DocumentState};
use crate::error::{ClientError, ClientResult};
use crate::models::{ApiReply, AskRequest, HealthResponse, RagChatRequest, RagStatus, Verdict};
use crate::session::Session;

/// Shown in place of an answer whenever the backend could not be reached
/// or answered with something unreadable.
pub const FALLBACK_MESSAGE: &str = "⚠️ Error: could not get a response from the server.";
/// Shown when a document question is asked before any upload succeeded.
pub const NO_DOCUMENT_MESSAGE: &str = "Please upload a PDF document first.";

/// User-triggered actions, one slot each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Ask,
    Upload,
    AskDocument,
    Reset,
}

impl Action {
    const COUNT: usize = 4;

    fn index(self) -> usize {
        match self {
            Action::Ask => 0,
            Action::Upload => 1,
            Action::AskDocument => 2,
            Action::Reset => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Ask => "ask",
            Action::Upload => "upload",
            Action::AskDocument => "ask_document",
            Action::Reset => "reset",
        }
    }
}

/// How an action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Success value, exactly as the server sent it
    Answer(String),
    /// Error text reported by the server
    BusinessError(String),
    /// The call failed; [`FALLBACK_MESSAGE`] is on display
    TransportError,
    /// The call hit the request deadline; [`FALLBACK_MESSAGE`] is on display
    TimedOut,
    /// The call was cancelled before it resolved
    Cancelled,
    /// Blank input, nothing was sent
    Skipped,
    /// Document question without a ready document, nothing was sent
    NoDocument,
    /// A newer request for the same slot was issued; this result was dropped
    Superseded,
}

impl Outcome {
    /// Text this outcome puts on display, if any
    pub fn display(&self) -> Option<&str> {
        match self {
            Outcome::Answer(text) | Outcome::BusinessError(text) => Some(text),
            Outcome::TransportError | Outcome::TimedOut => Some(FALLBACK_MESSAGE),
            Outcome::NoDocument => Some(NO_DOCUMENT_MESSAGE),
            Outcome::Cancelled | Outcome::Skipped | Outcome::Superseded => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Answer(_))
    }
}

/// Read-only copy of a slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotView {
    pub busy: bool,
    pub question: String,
    pub display: Option<String>,
}

#[derive(Debug, Default)]
struct Slot {
    in_flight: usize,
    latest: u64,
    question: String,
    display: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    slots: [Slot; Action::COUNT],
    document: DocumentSession,
}

impl State {
    fn slot(&mut self, action: Action) -> &mut Slot {
        &mut self.slots[action.index()]
    }
}

/// Marks one request in flight; dropping it releases the busy counter.
struct InFlight<'a> {
    state: &'a Mutex<State>,
    action: Action,
    token: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = state.slot(self.action);
        slot.in_flight = slot.in_flight.saturating_sub(1);
    }
}

enum Interrupted {
    Failed(ClientError),
    TimedOut,
    Cancelled,
}

/// Drives the ask, upload, document chat and reset actions against a
/// [`Backend`], one slot per action.
pub struct Orchestrator<B, S> {
    backend: B,
    session: Mutex<Session<S>>,
    config: Config,
    state: Mutex<State>,
    cancels: [watch::Sender<u64>; Action::COUNT],
}

impl<B: Backend, S: KeyValueStore> Orchestrator<B, S> {
    pub fn new(backend: B, session: Session<S>, config: Config) -> Self {
        Self {
            backend,
            session: Mutex::new(session),
            config,
            state: Mutex::new(State::default()),
            cancels: std::array::from_fn(|_| watch::channel(0).0),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_session(&self) -> MutexGuard<'_, Session<S>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// General chat question against `/ask`. The question stays on the slot
    /// after it is answered.
    pub async fn ask(&self, question: &str) -> Outcome {
        if question.trim().is_empty() {
            debug!("Ignoring blank question");
            return Outcome::Skipped;
        }

        let request = {
            let session = self.lock_session();
            AskRequest {
                q: question.to_string(),
                model: session.model(),
                api_key: session.credential().map(str::to_string),
                temperature: session.temperature(),
            }
        };

        let flight = self.begin(Action::Ask, question);
        info!(
            "Ask #{} with model {} (credential: {})",
            flight.token,
            request.model,
            request.api_key.as_deref().map(mask).unwrap_or_else(|| "server default".to_string())
        );

        match self.run(Action::Ask, self.backend.ask(&request)).await {
            Ok(reply) => {
                let outcome = classify(Action::Ask, reply.verdict());
                self.settle(&flight, outcome, |_| {})
            }
            Err(interrupted) => self.interrupted(&flight, interrupted),
        }
    }

    /// Pick the file the next [`upload_document`](Self::upload_document)
    /// sends. Any previously ready document stops being usable, and uploads
    /// or document questions still in flight can no longer write back.
    pub fn select_document(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut state = self.lock_state();
        if state.document.state().is_ready() {
            info!("New file selected, document session no longer ready");
        }
        state.document.select(path);
        for action in [Action::Upload, Action::AskDocument] {
            state.slot(action).latest += 1;
        }
    }

    /// Upload the selected file
    pub async fn upload_document(&self) -> Outcome {
        let pending = self.lock_state().document.pending().map(Path::to_path_buf);
        match pending {
            Some(path) => self.upload_document_at(path).await,
            None => {
                debug!("No file selected for upload");
                Outcome::Skipped
            }
        }
    }

    /// Upload `path` to the ingestion endpoint. A success marks the
    /// document ready, a server-reported failure marks it not ready, and a
    /// failed call leaves the flag alone.
    pub async fn upload_document_at(&self, path: impl AsRef<Path>) -> Outcome {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Outcome::Skipped;
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => {
                debug!("Ignoring empty file {}", path.display());
                return Outcome::Skipped;
            }
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                // Nothing was sent, so an upload already in flight keeps the slot
                let mut state = self.lock_state();
                let slot = state.slot(Action::Upload);
                if slot.in_flight == 0 {
                    slot.question = file_name;
                    slot.display = Outcome::TransportError.display().map(str::to_string);
                }
                return Outcome::TransportError;
            }
        };

        let flight = self.begin(Action::Upload, &file_name);
        info!("Upload #{}: {} ({} bytes)", flight.token, file_name, bytes.len());

        match self
            .run(Action::Upload, self.backend.upload_pdf(&file_name, bytes))
            .await
        {
            Ok(reply) => {
                let chunks = reply.chunks;
                match classify(Action::Upload, reply.verdict()) {
                    outcome @ Outcome::Answer(_) => self.settle(&flight, outcome, |state| {
                        info!("Document {} ready ({:?} chunks)", file_name, chunks);
                        state.document.mark_ready(file_name.clone(), chunks);
                    }),
                    outcome @ Outcome::BusinessError(_) => {
                        self.settle(&flight, outcome, |state| state.document.mark_failed())
                    }
                    outcome => self.settle(&flight, outcome, |_| {}),
                }
            }
            Err(interrupted) => self.interrupted(&flight, interrupted),
        }
    }

    /// Question about the uploaded document. Refused locally, without a
    /// call, while no document is ready. Answered questions are added to
    /// the transcript and cleared from the slot.
    pub async fn ask_document(&self, question: &str) -> Outcome {
        if question.trim().is_empty() {
            debug!("Ignoring blank document question");
            return Outcome::Skipped;
        }

        {
            let mut state = self.lock_state();
            if !state.document.state().is_ready() {
                warn!("Document question refused: no document uploaded");
                let slot = state.slot(Action::AskDocument);
                slot.latest += 1;
                slot.question = question.to_string();
                slot.display = Outcome::NoDocument.display().map(str::to_string);
                return Outcome::NoDocument;
            }
        }

        let request = RagChatRequest {
            question: question.to_string(),
            api_key: self.lock_session().credential().map(str::to_string),
        };

        let flight = self.begin(Action::AskDocument, question);
        info!("Document question #{}", flight.token);

        match self
            .run(Action::AskDocument, self.backend.rag_chat(&request))
            .await
        {
            Ok(reply) => {
                if let Some(sources) = reply.sources {
                    debug!("Answer drew on {} chunks", sources);
                }
                match classify(Action::AskDocument, reply.verdict()) {
                    Outcome::Answer(answer) => {
                        let outcome = Outcome::Answer(answer.clone());
                        self.settle(&flight, outcome, |state| {
                            state.document.record(question.to_string(), answer);
                            state.slot(Action::AskDocument).question.clear();
                        })
                    }
                    outcome => self.settle(&flight, outcome, |_| {}),
                }
            }
            Err(interrupted) => self.interrupted(&flight, interrupted),
        }
    }

    /// Drop the document session. Local state is cleared up front, and
    /// in-flight uploads and document questions are invalidated, whatever
    /// the server replies.
    pub async fn reset_document(&self) -> Outcome {
        {
            let mut state = self.lock_state();
            state.document.clear();
            for action in [Action::Upload, Action::AskDocument] {
                let slot = state.slot(action);
                slot.latest += 1;
                slot.question.clear();
                slot.display = None;
            }
        }

        let flight = self.begin(Action::Reset, "");
        info!("Reset #{}", flight.token);

        match self.run(Action::Reset, self.backend.rag_reset()).await {
            Ok(reply) => {
                let outcome = classify(Action::Reset, reply.verdict());
                self.settle(&flight, outcome, |_| {})
            }
            Err(interrupted) => self.interrupted(&flight, interrupted),
        }
    }

    /// Backend document status. Does not touch any slot.
    pub async fn status(&self) -> ClientResult<RagStatus> {
        self.probe(self.backend.rag_status()).await
    }

    /// Backend health. Does not touch any slot.
    pub async fn health(&self) -> ClientResult<HealthResponse> {
        self.probe(self.backend.health()).await
    }

    /// Abort the request in flight for `action`, if any
    pub fn cancel(&self, action: Action) {
        {
            let mut state = self.lock_state();
            state.slot(action).latest += 1;
        }
        self.cancels[action.index()].send_modify(|generation| *generation += 1);
        info!("Cancelled {}", action.as_str());
    }

    pub fn snapshot(&self, action: Action) -> SlotView {
        let mut state = self.lock_state();
        let slot = state.slot(action);
        SlotView {
            busy: slot.in_flight > 0,
            question: slot.question.clone(),
            display: slot.display.clone(),
        }
    }

    pub fn is_busy(&self, action: Action) -> bool {
        self.snapshot(action).busy
    }

    pub fn document(&self) -> DocumentState {
        self.lock_state().document.state().clone()
    }

    pub fn transcript(&self) -> Vec<ChatTurn> {
        self.lock_state().document.transcript().to_vec()
    }

    /// Run `f` against the session, e.g. to change model or temperature
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session<S>) -> R) -> R {
        f(&mut self.lock_session())
    }

    /// Use `value` as the credential from now on and persist it. Blank
    /// values clear the in-memory credential but keep the stored one.
    pub fn save_credential(&self, value: &str) -> ClientResult<bool> {
        let mut session = self.lock_session();
        session.set_credential(value);
        session.persist()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn begin(&self, action: Action, question: &str) -> InFlight<'_> {
        let mut state = self.lock_state();
        let slot = state.slot(action);
        slot.latest += 1;
        slot.in_flight += 1;
        slot.question = question.to_string();
        slot.display = None;
        InFlight {
            state: &self.state,
            action,
            token: slot.latest,
        }
    }

    async fn run<T>(
        &self,
        action: Action,
        call: impl Future<Output = ClientResult<T>>,
    ) -> Result<T, Interrupted> {
        let mut cancelled = self.cancels[action.index()].subscribe();
        tokio::select! {
            result = tokio::time::timeout(self.config.request_timeout, call) => match result {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(e)) => Err(Interrupted::Failed(e)),
                Err(_) => Err(Interrupted::TimedOut),
            },
            _ = cancelled.changed() => Err(Interrupted::Cancelled),
        }
    }

    async fn probe<T>(&self, call: impl Future<Output = ClientResult<T>>) -> ClientResult<T> {
        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| ClientError::Timeout(self.config.request_timeout))?
    }

    fn interrupted(&self, flight: &InFlight<'_>, interrupted: Interrupted) -> Outcome {
        match interrupted {
            Interrupted::Failed(e) => {
                error!("{} #{} failed: {}", flight.action.as_str(), flight.token, e);
                self.settle(flight, Outcome::TransportError, |_| {})
            }
            Interrupted::TimedOut => {
                warn!(
                    "{} #{} timed out after {:?}",
                    flight.action.as_str(),
                    flight.token,
                    self.config.request_timeout
                );
                self.settle(flight, Outcome::TimedOut, |_| {})
            }
            Interrupted::Cancelled => Outcome::Cancelled,
        }
    }

    /// Publish `outcome` and apply `effect` if `flight` is still the latest
    /// request of its slot.
    fn settle(
        &self,
        flight: &InFlight<'_>,
        outcome: Outcome,
        effect: impl FnOnce(&mut State),
    ) -> Outcome {
        let mut state = self.lock_state();
        let slot = state.slot(flight.action);
        if slot.latest != flight.token {
            debug!(
                "Dropping stale {} #{} (latest is #{})",
                flight.action.as_str(),
                flight.token,
                slot.latest
            );
            return Outcome::Superseded;
        }
        slot.display = outcome.display().map(str::to_string);
        effect(&mut *state);
        outcome
    }
}

fn classify(action: Action, verdict: Verdict) -> Outcome {
    match verdict {
        Verdict::Success(text) => Outcome::Answer(text),
        Verdict::Failure(text) => {
            warn!("{} rejected by server: {}", action.as_str(), text);
            Outcome::BusinessError(text)
        }
        Verdict::Unrecognized => {
            warn!("{} reply had neither a result nor an error", action.as_str());
            Outcome::TransportError
        }
    }
}
