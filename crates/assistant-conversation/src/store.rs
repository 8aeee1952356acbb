use assistant_core::{AssistantError, ConversationTurn, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::record::ConversationRecord;
use crate::storage::KeyValueStore;

/// Storage key holding the whole history as one JSON array.
pub const HISTORY_KEY: &str = "conversationHistory";

/// Upper bound on stored conversations.
pub const MAX_RECORDS: usize = 50;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Bounded, URL-keyed conversation history.
///
/// Records are kept in insertion order inside the stored array. Every
/// read-modify-write cycle holds `write_lock`, so concurrent upserts for
/// different URLs never drop each other's changes.
pub struct ConversationStore {
    backend: Arc<dyn KeyValueStore>,
    clock: Clock,
    write_lock: Mutex<()>,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(backend, Arc::new(Utc::now))
    }

    pub fn with_clock(backend: Arc<dyn KeyValueStore>, clock: Clock) -> Self {
        Self {
            backend,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<ConversationRecord>> {
        match self.backend.get(HISTORY_KEY).await? {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| AssistantError::Storage(format!("Unreadable conversation history: {}", e))),
        }
    }

    async fn persist(&self, records: &[ConversationRecord]) -> Result<()> {
        self.backend
            .set(HISTORY_KEY, serde_json::to_value(records)?)
            .await
    }

    /// Inserts or replaces the conversation for `url`, then evicts down to
    /// [`MAX_RECORDS`]. `title` is only used when the URL is new.
    #[instrument(skip(self, title, turns), fields(turn_count = turns.len()))]
    pub async fn upsert(&self, url: &str, title: &str, turns: Vec<ConversationTurn>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let now = (self.clock)();
        let mut records = self.load().await?;

        match records.iter().position(|record| record.url == url) {
            Some(index) => {
                debug!("Updating stored conversation");
                records[index].replace_turns(turns, now);
            }
            None => {
                debug!("Storing new conversation");
                records.push(ConversationRecord::new(url, title, turns, now));
            }
        }

        let evicted = evict_oldest(&mut records, MAX_RECORDS);
        if evicted > 0 {
            info!("Evicted {} conversation(s) over the limit of {}", evicted, MAX_RECORDS);
        }

        self.persist(&records).await
    }

    /// All records, most recently updated first.
    pub async fn list(&self) -> Result<Vec<ConversationRecord>> {
        let mut records = self.load().await?;
        records.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(records)
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<ConversationRecord>> {
        let mut records = self.list().await?;
        records.truncate(limit);
        Ok(records)
    }

    pub async fn get(&self, url: &str) -> Result<Option<ConversationRecord>> {
        Ok(self.load().await?.into_iter().find(|record| record.url == url))
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.backend.remove(HISTORY_KEY).await?;
        info!("Cleared conversation history");
        Ok(())
    }
}

/// Drops the smallest `last_updated` until `max` remain. The sort is stable,
/// so among equal timestamps the earlier-inserted record goes first.
fn evict_oldest(records: &mut Vec<ConversationRecord>, max: usize) -> usize {
    if records.len() <= max {
        return 0;
    }

    let excess = records.len() - max;
    let mut by_age: Vec<usize> = (0..records.len()).collect();
    by_age.sort_by_key(|&i| records[i].last_updated);
    let mut doomed = by_age[..excess].to_vec();
    doomed.sort_unstable();

    for index in doomed.into_iter().rev() {
        records.remove(index);
    }
    excess
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn record(url: &str, minute: i64) -> ConversationRecord {
        ConversationRecord::new(url, "", Vec::new(), at(minute))
    }

    #[test]
    fn test_evict_prefers_oldest_then_earliest_inserted() {
        let mut records = vec![record("a", 5), record("b", 1), record("c", 1), record("d", 3)];

        assert_eq!(evict_oldest(&mut records, 2), 2);

        let urls: Vec<_> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, ["a", "d"]);
    }

    #[test]
    fn test_evict_tie_break_keeps_later_insert() {
        let mut records = vec![record("first", 1), record("second", 1)];
        evict_oldest(&mut records, 1);
        assert_eq!(records[0].url, "second");
    }

    #[tokio::test]
    async fn test_unreadable_history_is_storage_error() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .set(HISTORY_KEY, serde_json::json!({"not": "an array"}))
            .await
            .unwrap();

        let store = ConversationStore::new(backend);
        assert!(matches!(store.list().await, Err(AssistantError::Storage(_))));
    }
}
