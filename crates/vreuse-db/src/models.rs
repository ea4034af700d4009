//! Database row types. These map directly to SQLite rows and are converted
//! into vreuse-types models at the crate boundary.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use vreuse_types::models::{Conversation, Message, ParticipantPair, UserProfile};

/// Fixed-width RFC 3339 with microseconds, so string order is time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn parse_id(raw: &str, column: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("corrupt {} '{}'", column, raw))
}

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: String,
}

impl TryFrom<UserRow> for UserProfile {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(UserProfile {
            id: parse_id(&row.id, "user id")?,
            email: row.email,
            name: row.name,
        })
    }
}

pub struct ConversationRow {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub last_message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = anyhow::Error;

    fn try_from(row: ConversationRow) -> Result<Self> {
        let user_a = parse_id(&row.user_a, "user_a")?;
        let user_b = parse_id(&row.user_b, "user_b")?;
        let participants = ParticipantPair::new(user_a, user_b)
            .with_context(|| format!("conversation '{}' pairs a user with itself", row.id))?;

        Ok(Conversation {
            id: parse_id(&row.id, "conversation id")?,
            participants,
            last_message_id: row
                .last_message_id
                .as_deref()
                .map(|id| parse_id(id, "last_message_id"))
                .transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

/// A conversation joined with the text of its last message, for listings.
pub struct ConversationListRow {
    pub conversation: ConversationRow,
    pub last_message_text: Option<String>,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub read: bool,
    pub created_at: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_id(&row.id, "message id")?,
            conversation_id: parse_id(&row.conversation_id, "conversation_id")?,
            sender_id: parse_id(&row.sender_id, "sender_id")?,
            text: row.text,
            read: row.read,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
