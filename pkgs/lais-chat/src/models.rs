//! Conversation, message and listing data as exchanged with the backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The identity driving one side of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub is_registered: bool,
}

impl Actor {
    pub fn registered(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_registered: true,
        }
    }

    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_registered: false,
        }
    }
}

/// A buyer-seller thread about one listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "iphone_id")]
    pub listing_id: i64,
    pub seller_id: i64,
    #[serde(with = "lenient_id")]
    pub buyer_id: String,
    #[serde(default)]
    pub buyer_is_registered: bool,
}

/// Body of the create-conversation call
#[derive(Debug, Clone, Serialize)]
pub struct NewConversation {
    #[serde(rename = "iphone_id")]
    pub listing_id: i64,
    pub seller_id: i64,
    pub buyer_id: String,
    pub buyer_is_registered: bool,
}

/// One row of the seller's grouped conversation list
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationSummary {
    pub id: i64,
    #[serde(with = "lenient_id")]
    pub buyer_id: String,
    #[serde(default)]
    pub buyer_is_registered: bool,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub last_message_time: Option<DateTime<Utc>>,
}

impl ConversationSummary {
    pub fn buyer_label(&self) -> String {
        buyer_label(&self.buyer_id, self.buyer_is_registered)
    }
}

/// Label shown for the buyer side of a conversation
pub fn buyer_label(buyer_id: &str, registered: bool) -> String {
    if registered {
        format!("Buyer #{}", buyer_id)
    } else {
        "Anonymous buyer".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(with = "lenient_id")]
    pub sender_id: String,
    #[serde(default)]
    pub sender_is_registered: bool,
    #[serde(rename = "message_text")]
    pub text: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether `actor` wrote this message
    pub fn is_from(&self, actor: &Actor) -> bool {
        self.sender_id == actor.id
    }
}

/// A message as rendered, tagged with its side of the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMessage {
    pub message: Message,
    pub own: bool,
}

impl DisplayMessage {
    pub fn for_actor(message: Message, actor: &Actor) -> Self {
        let own = message.is_from(actor);
        Self { message, own }
    }
}

/// Listing metadata used to title seller conversation groups
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListingInfo {
    pub id: i64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, with = "lenient_id::option")]
    pub memory: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl ListingInfo {
    pub fn title(&self) -> String {
        match (&self.model, &self.memory, &self.color) {
            (Some(model), Some(memory), Some(color)) => {
                format!("{} {}GB {}", model, memory, color)
            }
            _ => fallback_title(self.id),
        }
    }
}

pub fn fallback_title(listing_id: i64) -> String {
    format!("Listing #{}", listing_id)
}

/// Ids that the backend sends either as strings or as numbers
mod lenient_id {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &str, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        deserializer.deserialize_any(IdVisitor)
    }

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or integer id")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    pub mod option {
        use serde::{Deserialize, Deserializer};

        #[derive(Deserialize)]
        struct Wrapped(#[serde(deserialize_with = "super::deserialize")] String);

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<String>, D::Error> {
            Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|w| w.0))
        }
    }
}

/// RFC 3339 or naive ISO-8601 timestamps, the latter read as UTC
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                None => Ok(None),
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw))),
            }
        }
    }
}
