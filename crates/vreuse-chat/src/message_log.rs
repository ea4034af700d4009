use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use vreuse_db::Database;
use vreuse_types::api::{ConversationSummary, MessageView};
use vreuse_types::models::{Conversation, MAX_MESSAGE_LEN, Message, ParticipantPair, UserProfile};

use crate::error::ChatError;
use crate::users::UserDirectory;

/// Shown in conversation listings before the first message is sent.
pub const NO_MESSAGES_YET: &str = "No messages yet";

/// Append-only message store with the membership and text rules applied.
///
/// Every method blocks on SQLite; async callers run them on
/// `spawn_blocking`.
#[derive(Clone)]
pub struct MessageLog {
    pub(crate) db: Arc<Database>,
    pub(crate) users: Arc<dyn UserDirectory>,
}

impl MessageLog {
    pub fn new(db: Arc<Database>, users: Arc<dyn UserDirectory>) -> Self {
        Self { db, users }
    }

    pub fn conversation(&self, conversation_id: Uuid) -> Result<Conversation, ChatError> {
        let row = self
            .db
            .get_conversation(conversation_id)?
            .ok_or(ChatError::ConversationNotFound)?;
        Ok(Conversation::try_from(row)?)
    }

    pub fn participants(&self, conversation_id: Uuid) -> Result<ParticipantPair, ChatError> {
        Ok(self.conversation(conversation_id)?.participants)
    }

    /// Append `text` from `sender_id`. The conversation summary moves to the
    /// new message in the same transaction.
    pub fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        text: &str,
    ) -> Result<Message, ChatError> {
        if !self.participants(conversation_id)?.contains(sender_id) {
            return Err(ChatError::NotParticipant);
        }
        validate_text(text)?;

        let row = self
            .db
            .append_message(Uuid::new_v4(), conversation_id, sender_id, text)?;
        let message = Message::try_from(row)?;

        debug!(
            "Appended message {} to conversation {} from {}",
            message.id, conversation_id, sender_id
        );
        Ok(message)
    }

    /// Full history for a participant. Unknown conversations are reported as
    /// `NotAuthorized` too, so non-members learn nothing about which ids exist.
    pub fn list_messages(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Vec<MessageView>, ChatError> {
        let participants = match self.participants(conversation_id) {
            Ok(participants) => participants,
            Err(ChatError::ConversationNotFound) => return Err(ChatError::NotAuthorized),
            Err(e) => return Err(e),
        };
        if !participants.contains(requester_id) {
            return Err(ChatError::NotAuthorized);
        }

        self.history(conversation_id)
    }

    /// History without a membership check. Callers must have authorized the
    /// requester already.
    pub(crate) fn history(&self, conversation_id: Uuid) -> Result<Vec<MessageView>, ChatError> {
        let messages = self
            .db
            .list_messages(conversation_id)?
            .into_iter()
            .map(Message::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;

        self.attach_senders(messages)
    }

    pub fn attach_sender(&self, message: Message) -> Result<MessageView, ChatError> {
        let sender = self.sender_profile(message.sender_id)?;
        Ok(to_view(message, sender))
    }

    fn attach_senders(&self, messages: Vec<Message>) -> Result<Vec<MessageView>, ChatError> {
        // A two-party conversation has at most two distinct senders.
        let mut profiles: HashMap<Uuid, UserProfile> = HashMap::new();
        let mut views = Vec::with_capacity(messages.len());

        for message in messages {
            let sender = match profiles.get(&message.sender_id) {
                Some(profile) => profile.clone(),
                None => {
                    let profile = self.sender_profile(message.sender_id)?;
                    profiles.insert(message.sender_id, profile.clone());
                    profile
                }
            };
            views.push(to_view(message, sender));
        }

        Ok(views)
    }

    fn sender_profile(&self, sender_id: Uuid) -> Result<UserProfile, ChatError> {
        let profile = self.users.find_by_id(sender_id)?.unwrap_or_else(|| {
            warn!("Sender {} no longer exists, showing as unknown", sender_id);
            UserProfile {
                id: sender_id,
                email: String::new(),
                name: "unknown".to_string(),
            }
        });
        Ok(profile)
    }

    /// Conversations of `user_id`, most recent first. A conversation whose
    /// partner can no longer be resolved is left out.
    pub fn list_conversations_for(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>, ChatError> {
        let rows = self.db.list_conversations_for_user(user_id)?;
        let mut summaries = Vec::with_capacity(rows.len());

        for row in rows {
            let last_message = row
                .last_message_text
                .unwrap_or_else(|| NO_MESSAGES_YET.to_string());
            let conversation = Conversation::try_from(row.conversation)?;

            let Some(partner_id) = conversation.participants.other(user_id) else {
                continue;
            };
            let Some(partner) = self.users.find_by_id(partner_id)? else {
                debug!(
                    "Skipping conversation {}: partner {} not found",
                    conversation.id, partner_id
                );
                continue;
            };

            summaries.push(ConversationSummary {
                conversation_id: conversation.id,
                partner,
                last_message,
                updated_at: conversation.updated_at,
            });
        }

        Ok(summaries)
    }
}

fn validate_text(text: &str) -> Result<(), ChatError> {
    if text.is_empty() || text.chars().count() > MAX_MESSAGE_LEN {
        return Err(ChatError::EmptyOrOversizeText);
    }
    Ok(())
}

fn to_view(message: Message, sender: UserProfile) -> MessageView {
    MessageView {
        id: message.id,
        conversation_id: message.conversation_id,
        sender,
        text: message.text,
        read: message.read,
        created_at: message.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vreuse_db::InsertOutcome;

    struct Fixture {
        db: Arc<Database>,
        log: MessageLog,
        alice: Uuid,
        bob: Uuid,
        conversation_id: Uuid,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        db.create_user(alice, "alice@vit.ac.in", "Alice").unwrap();
        db.create_user(bob, "bob@vit.ac.in", "Bob").unwrap();

        let conversation_id = Uuid::new_v4();
        let pair = ParticipantPair::new(alice, bob).unwrap();
        assert!(matches!(
            db.insert_conversation(conversation_id, pair).unwrap(),
            InsertOutcome::Created(_)
        ));

        let log = MessageLog::new(db.clone(), db.clone());
        Fixture { db, log, alice, bob, conversation_id }
    }

    fn delete_user(db: &Database, id: Uuid) {
        db.with_conn(|conn| {
            conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn append_sets_summary_pointer() {
        let f = fixture();

        let message = f.log.append_message(f.conversation_id, f.alice, "hi").unwrap();
        let conversation = f.log.conversation(f.conversation_id).unwrap();

        assert_eq!(conversation.last_message_id, Some(message.id));
        assert_eq!(conversation.updated_at, message.created_at);
        assert!(!message.read);
    }

    #[test]
    fn non_participant_cannot_append() {
        let f = fixture();
        let mallory = Uuid::new_v4();

        let err = f.log.append_message(f.conversation_id, mallory, "hi").unwrap_err();
        assert!(matches!(err, ChatError::NotParticipant));
        assert!(f.db.list_messages(f.conversation_id).unwrap().is_empty());
        assert!(f.log.conversation(f.conversation_id).unwrap().last_message_id.is_none());
    }

    #[test]
    fn text_bounds() {
        let f = fixture();

        let err = f.log.append_message(f.conversation_id, f.alice, "").unwrap_err();
        assert!(matches!(err, ChatError::EmptyOrOversizeText));

        let too_long = "a".repeat(MAX_MESSAGE_LEN + 1);
        let err = f.log.append_message(f.conversation_id, f.alice, &too_long).unwrap_err();
        assert!(matches!(err, ChatError::EmptyOrOversizeText));

        // Limit counts characters, not bytes.
        let wide = "é".repeat(MAX_MESSAGE_LEN);
        f.log.append_message(f.conversation_id, f.alice, &wide).unwrap();

        assert_eq!(f.db.list_messages(f.conversation_id).unwrap().len(), 1);
    }

    #[test]
    fn unknown_conversation() {
        let f = fixture();

        let err = f.log.append_message(Uuid::new_v4(), f.alice, "hi").unwrap_err();
        assert!(matches!(err, ChatError::ConversationNotFound));

        let err = f.log.list_messages(Uuid::new_v4(), f.alice).unwrap_err();
        assert!(matches!(err, ChatError::NotAuthorized));
    }

    #[test]
    fn history_is_ordered_and_carries_sender() {
        let f = fixture();
        for (sender, text) in [(f.alice, "one"), (f.bob, "two"), (f.alice, "three")] {
            f.log.append_message(f.conversation_id, sender, text).unwrap();
        }

        let messages = f.log.list_messages(f.conversation_id, f.bob).unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert_eq!(messages[1].sender.name, "Bob");
        assert_eq!(messages[2].sender.email, "alice@vit.ac.in");

        let err = f.log.list_messages(f.conversation_id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ChatError::NotAuthorized));
    }

    #[test]
    fn listing_uses_placeholder_and_skips_vanished_partners() {
        let f = fixture();
        let carol = Uuid::new_v4();
        f.db.create_user(carol, "carol@vit.ac.in", "Carol").unwrap();
        let with_carol = Uuid::new_v4();
        f.db
            .insert_conversation(with_carol, ParticipantPair::new(f.alice, carol).unwrap())
            .unwrap();

        let summaries = f.log.list_conversations_for(f.alice).unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.last_message == NO_MESSAGES_YET));

        f.log.append_message(f.conversation_id, f.bob, "hi").unwrap();
        let summaries = f.log.list_conversations_for(f.alice).unwrap();
        assert_eq!(summaries[0].conversation_id, f.conversation_id);
        assert_eq!(summaries[0].partner.id, f.bob);
        assert_eq!(summaries[0].last_message, "hi");

        delete_user(&f.db, carol);
        let summaries = f.log.list_conversations_for(f.alice).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].partner.id, f.bob);
    }
}
