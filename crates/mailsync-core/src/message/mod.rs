//! Synced message storage.

mod model;
mod repository;

pub use model::{
    CompositeKey, MessageId, MessageQuery, NewMessage, ReadFilter, StoredMessage, SyncCursor,
};
pub use repository::MessageRepository;
