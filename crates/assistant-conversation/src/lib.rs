pub mod record;
pub mod storage;
pub mod store;

pub use record::ConversationRecord;
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use store::{Clock, ConversationStore, HISTORY_KEY, MAX_RECORDS};
