//! Small accumulator of human-readable diagnostic messages attached to an
//! Indexer or Extractor run. The first hard error still aborts the run via
//! `Result`; this is for the secondary context a caller may want to display
//! alongside it (e.g. "index file too small" plus the path that was opened).

use log::warn;

#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    messages: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn extend(&mut self, other: &Diagnostics) {
        self.messages.extend(other.messages.iter().cloned());
    }
}
