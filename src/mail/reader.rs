use crate::domain::message::RawMessage;
use crate::error::Result;

/// Source of raw mailbox records.
///
/// Implementations must fetch a folder in a single round trip and bound every
/// network call with a timeout; a timeout is reported as
/// [`crate::error::TriageError::Transport`].
pub trait MailboxReader {
    fn read(&self, folder: &str, max_items: u32, mailbox: &str) -> Result<Vec<RawMessage>>;
}
