use assistant_core::ConversationTurn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored conversation for one page URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "conversation", default)]
    pub turns: Vec<ConversationTurn>,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>, turns: Vec<ConversationTurn>, now: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            turns,
            created: now,
            last_updated: now,
        }
    }

    /// Replaces the turns wholesale and bumps `last_updated`. The title and
    /// `created` stay as first stored.
    pub fn replace_turns(&mut self, turns: Vec<ConversationTurn>, now: DateTime<Utc>) {
        self.turns = turns;
        self.last_updated = now;
    }

    /// First user question, used as a one-line preview.
    pub fn preview(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|turn| turn.is_user)
            .map(|turn| turn.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wire_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let record = ConversationRecord::new("https://a.test/", "A", vec![ConversationTurn::user("hi")], at);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["conversation"][0]["isUser"], true);
        assert_eq!(json["lastUpdated"], "2024-03-01T12:00:00Z");
        assert_eq!(json["created"], "2024-03-01T12:00:00Z");
        assert!(json.get("turns").is_none());

        let back: ConversationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_replace_keeps_created_and_title() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        let mut record = ConversationRecord::new("u", "old", Vec::new(), t0);

        record.replace_turns(vec![ConversationTurn::assistant("x"), ConversationTurn::user("q")], t1);

        assert_eq!(record.created, t0);
        assert_eq!(record.last_updated, t1);
        assert_eq!(record.title, "old");
        assert_eq!(record.preview(), Some("q"));
    }
}
