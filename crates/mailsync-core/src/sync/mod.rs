//! Mailbox synchronization.
//!
//! A pass lists the inbox, picks a bounded window of UIDs, fetches and
//! normalizes each message, drops the ones already stored and writes the
//! rest in one batch.

mod engine;
mod imap;
mod lock;
mod normalize;
mod progress;
mod source;
mod window;

pub use engine::{SkipReason, SyncEngine, SyncPhase, SyncReport};
pub use imap::{ImapConnector, ImapSession};
pub use lock::AccountLocks;
pub use normalize::{ELLIPSIS, NormalizeError, SNIPPET_LEN, normalize, snippet, strip_tags};
pub use progress::{ChannelProgress, LogProgress, NoProgress, Progress, ProgressSink};
pub use source::{
    FolderListing, MailConnector, MailSession, RawMessage, RemoteMessageRef, SourceError,
};
pub use window::{SyncMode, WindowConfig, select_window};
