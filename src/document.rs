use std::path::{Path, PathBuf};

use serde::Serialize;

/// Whether the backend holds an ingested document for this client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum DocumentState {
    #[default]
    NoDocument,
    DocumentReady {
        file_name: String,
        chunks: Option<u64>,
    },
}

impl DocumentState {
    pub fn is_ready(&self) -> bool {
        matches!(self, DocumentState::DocumentReady { .. })
    }
}

/// One answered question in the document chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Client-side document session: the ready flag, the file picked for
/// upload and the document chat transcript.
#[derive(Debug, Default)]
pub struct DocumentSession {
    state: DocumentState,
    pending: Option<PathBuf>,
    transcript: Vec<ChatTurn>,
}

impl DocumentSession {
    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn pending(&self) -> Option<&Path> {
        self.pending.as_deref()
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    /// Picking a new file drops readiness until that file is uploaded.
    pub fn select(&mut self, path: PathBuf) {
        self.pending = Some(path);
        self.state = DocumentState::NoDocument;
    }

    pub fn mark_ready(&mut self, file_name: String, chunks: Option<u64>) {
        self.state = DocumentState::DocumentReady { file_name, chunks };
    }

    pub fn mark_failed(&mut self) {
        self.state = DocumentState::NoDocument;
    }

    pub fn record(&mut self, question: String, answer: String) {
        self.transcript.push(ChatTurn { question, answer });
    }

    /// Back to the initial state
    pub fn clear(&mut self) {
        self.state = DocumentState::NoDocument;
        self.pending = None;
        self.transcript.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let session = DocumentSession::default();
        assert_eq!(session.state(), &DocumentState::NoDocument);
        assert!(session.pending().is_none());
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn test_select_resets_readiness() {
        let mut session = DocumentSession::default();
        session.mark_ready("a.pdf".to_string(), Some(4));
        assert!(session.state().is_ready());

        session.select(PathBuf::from("b.pdf"));
        assert!(!session.state().is_ready());
        assert_eq!(session.pending(), Some(Path::new("b.pdf")));
    }

    #[test]
    fn test_clear() {
        let mut session = DocumentSession::default();
        session.select(PathBuf::from("a.pdf"));
        session.mark_ready("a.pdf".to_string(), None);
        session.record("q".to_string(), "a".to_string());

        session.clear();
        assert_eq!(session.state(), &DocumentState::NoDocument);
        assert!(session.pending().is_none());
        assert!(session.transcript().is_empty());
    }
}
