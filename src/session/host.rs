use serde::{Deserialize, Serialize};

/// New document content produced by a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteUpdate {
    /// Complete HTML document
    pub content: String,

    /// Short summary of the change, if the model gave one
    pub description: Option<String>,
}

/// Callbacks the embedding application provides to a voice session
///
/// Called from the session driver task; implementations must not block.
pub trait SessionHost: Send + Sync {
    /// A tool call replaced the document
    fn on_site_update(&self, update: &SiteUpdate);

    /// Incremental speech-to-text for either side of the conversation
    ///
    /// User transcripts arrive whole; assistant transcripts arrive as deltas.
    /// Merging is up to the host.
    fn on_transcript(&self, text: &str, is_user: bool);

    /// Document embedded in the instructions at connect time
    fn current_document(&self) -> Option<String> {
        None
    }
}
