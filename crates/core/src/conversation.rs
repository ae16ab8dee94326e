//! Conversation memory.

use toolchat_model::ModelMessage;

/// The messages an agent remembers across runs.
///
/// Only complete exchanges are stored: a run that fails leaves the
/// conversation untouched.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    messages: Vec<ModelMessage>,
}

impl Conversation {
    /// Returns the remembered messages, oldest first.
    #[inline]
    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    /// Returns the number of remembered messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if nothing is remembered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Forgets everything.
    #[inline]
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub(crate) fn extend(&mut self, messages: Vec<ModelMessage>) {
        self.messages.extend(messages);
    }
}
