use crate::Database;
use crate::models::{
    ConversationListRow, ConversationRow, MessageRow, UserRow, format_timestamp, parse_timestamp,
};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row};
use tracing::{debug, info};
use uuid::Uuid;

use vreuse_types::models::ParticipantPair;

/// Result of trying to create the conversation for a pair.
pub enum InsertOutcome {
    Created(ConversationRow),
    /// The unique pair index rejected the insert: someone else created it.
    AlreadyExists,
}

impl Database {
    // -- Users --

    pub fn create_user(&self, id: Uuid, email: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id.to_string(), email, name, format_timestamp(Utc::now())),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, &id.to_string()))
    }

    // -- Conversations --

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_a, user_b, last_message_id, created_at, updated_at
                 FROM conversations WHERE id = ?1",
                [id.to_string()],
                conversation_from_row,
            )
            .optional()
        })
    }

    pub fn find_conversation_by_pair(&self, pair: ParticipantPair) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation_by_pair(conn, pair))
    }

    /// Insert the conversation for `pair`. A unique-index violation means a
    /// concurrent caller won the race; that is reported as `AlreadyExists`
    /// rather than an error so the caller can re-read.
    pub fn insert_conversation(&self, id: Uuid, pair: ParticipantPair) -> Result<InsertOutcome> {
        self.with_conn(|conn| {
            let now = format_timestamp(Utc::now());
            let inserted = conn.execute(
                "INSERT INTO conversations (id, user_a, user_b, last_message_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, NULL, ?4, ?4)",
                (id.to_string(), pair.first().to_string(), pair.second().to_string(), &now),
            );

            match inserted {
                Ok(_) => {
                    info!("Created conversation {} for {} / {}", id, pair.first(), pair.second());
                    Ok(InsertOutcome::Created(ConversationRow {
                        id: id.to_string(),
                        user_a: pair.first().to_string(),
                        user_b: pair.second().to_string(),
                        last_message_id: None,
                        created_at: now.clone(),
                        updated_at: now,
                    }))
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    debug!("Conversation for {} / {} already exists", pair.first(), pair.second());
                    Ok(InsertOutcome::AlreadyExists)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Conversations involving `user_id`, most recently updated first, each
    /// joined with its last message text.
    pub fn list_conversations_for_user(&self, user_id: Uuid) -> Result<Vec<ConversationListRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.user_a, c.user_b, c.last_message_id, c.created_at, c.updated_at, m.text
                 FROM conversations c
                 LEFT JOIN messages m ON m.id = c.last_message_id
                 WHERE c.user_a = ?1 OR c.user_b = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(ConversationListRow {
                        conversation: conversation_from_row(row)?,
                        last_message_text: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Re-derive `last_message_id`/`updated_at` from the newest message in the
    /// log. Returns false if the conversation does not exist.
    pub fn reconcile_conversation_summary(&self, conversation_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let cid = conversation_id.to_string();
            let latest: Option<(String, String)> = conn
                .query_row(
                    "SELECT id, created_at FROM messages WHERE conversation_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    [&cid],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let updated = match latest {
                Some((message_id, created_at)) => conn.execute(
                    "UPDATE conversations SET last_message_id = ?1, updated_at = ?2 WHERE id = ?3",
                    (&message_id, &created_at, &cid),
                )?,
                // An empty log keeps the conversation's own updated_at.
                None => conn.execute(
                    "UPDATE conversations SET last_message_id = NULL WHERE id = ?1",
                    [&cid],
                )?,
            };

            Ok(updated > 0)
        })
    }

    // -- Messages --

    /// Append a message and point the conversation summary at it, in one
    /// transaction. Membership and text are checked by the caller.
    ///
    /// `created_at` never goes backwards within a conversation: if the clock
    /// reads earlier than the newest stored message, that message's timestamp
    /// is reused and rowid order breaks the tie.
    pub fn append_message(
        &self,
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        text: &str,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let cid = conversation_id.to_string();

            let latest: Option<String> = tx.query_row(
                "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
                [&cid],
                |row| row.get(0),
            )?;

            let now = Utc::now();
            let created_at = match latest.as_deref().map(parse_timestamp).transpose()? {
                Some(latest) if latest > now => latest,
                _ => now,
            };
            let created_at = format_timestamp(created_at);

            let row = MessageRow {
                id: id.to_string(),
                conversation_id: cid,
                sender_id: sender_id.to_string(),
                text: text.to_string(),
                read: false,
                created_at,
            };

            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, text, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                (&row.id, &row.conversation_id, &row.sender_id, &row.text, &row.created_at),
            )?;

            tx.execute(
                "UPDATE conversations SET last_message_id = ?1, updated_at = ?2 WHERE id = ?3",
                (&row.id, &row.created_at, &row.conversation_id),
            )?;

            tx.commit()?;
            Ok(row)
        })
    }

    /// Full history of a conversation, oldest first.
    pub fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, text, read, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt
                .query_map([conversation_id.to_string()], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        text: row.get(3)?,
                        read: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, email, name, created_at FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_conversation_by_pair(conn: &Connection, pair: ParticipantPair) -> Result<Option<ConversationRow>> {
    conn.query_row(
        "SELECT id, user_a, user_b, last_message_id, created_at, updated_at
         FROM conversations WHERE user_a = ?1 AND user_b = ?2",
        (pair.first().to_string(), pair.second().to_string()),
        conversation_from_row,
    )
    .optional()
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_a: row.get(1)?,
        user_b: row.get(2)?,
        last_message_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
