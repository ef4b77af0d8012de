//! Conversation history owned by a chat session.

use super::message::{Message, Role, assistant_message, user_message};

/// Position in a [`ConversationContext`] to roll back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Append-only list of exchanged messages.
///
/// Grows by one (user, assistant) pair per successful exchange. Tentative
/// entries appended after a [`Checkpoint`] can be discarded with
/// [`ConversationContext::rollback`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationContext {
    messages: Vec<Message>,
}

impl ConversationContext {
    /// Creates an empty context.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if no messages have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Records a completed exchange.
    pub fn push_exchange(&mut self, question: &str, answer: &str) {
        self.messages.push(user_message(question));
        self.messages.push(assistant_message(answer));
    }

    /// Marks the current end of the history.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.messages.len())
    }

    /// Starts a tentative exchange that is rolled back when dropped unless
    /// [`PendingExchange::commit`] is called.
    pub fn begin_pending(&mut self, question: &str) -> PendingExchange<'_> {
        let checkpoint = self.begin_exchange(question);
        PendingExchange {
            context: self,
            checkpoint,
            committed: false,
        }
    }

    /// Appends a user message and an empty assistant placeholder.
    pub fn begin_exchange(&mut self, question: &str) -> Checkpoint {
        let checkpoint = self.checkpoint();
        self.messages.push(user_message(question));
        self.messages.push(assistant_message(""));
        checkpoint
    }

    /// Appends streamed text to the trailing assistant entry.
    pub fn append_to_reply(&mut self, chunk: &str) {
        if let Some(last) = self.messages.last_mut()
            && last.role == Role::Assistant
        {
            last.content.push_str(chunk);
        }
    }

    /// Replaces the content of the trailing assistant entry.
    pub fn finish_reply(&mut self, answer: &str) {
        if let Some(last) = self.messages.last_mut()
            && last.role == Role::Assistant
        {
            answer.clone_into(&mut last.content);
        }
    }

    /// Drops every message recorded after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.messages.truncate(checkpoint.0);
    }

    /// Removes all messages.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// A user message and its in-progress reply, owned until committed.
///
/// Dropping it without [`PendingExchange::commit`], including when the
/// future driving the request is cancelled, truncates the context back to
/// where the exchange began.
#[must_use = "dropping a pending exchange rolls it back"]
#[derive(Debug)]
pub struct PendingExchange<'a> {
    context: &'a mut ConversationContext,
    checkpoint: Checkpoint,
    committed: bool,
}

impl PendingExchange<'_> {
    /// Appends streamed text to the placeholder reply.
    pub fn append_to_reply(&mut self, chunk: &str) {
        self.context.append_to_reply(chunk);
    }

    /// Context as it currently stands, tentative entries included.
    #[must_use]
    pub fn context(&self) -> &ConversationContext {
        self.context
    }

    /// Replaces the placeholder with `answer` and keeps the exchange.
    pub fn commit(mut self, answer: &str) {
        self.context.finish_reply(answer);
        self.committed = true;
    }
}

impl Drop for PendingExchange<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.context.rollback(self.checkpoint);
        }
    }
}
