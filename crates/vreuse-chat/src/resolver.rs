use anyhow::anyhow;
use tracing::{debug, info};
use uuid::Uuid;

use vreuse_db::InsertOutcome;
use vreuse_types::api::MessageView;
use vreuse_types::models::{Conversation, ParticipantPair, UserProfile};

use crate::error::ChatError;
use crate::message_log::MessageLog;

pub struct ResolvedConversation {
    pub conversation: Conversation,
    /// Oldest first.
    pub messages: Vec<MessageView>,
    pub partner: UserProfile,
}

/// Find-or-create of the one conversation between two users.
#[derive(Clone)]
pub struct ConversationResolver {
    log: MessageLog,
}

impl ConversationResolver {
    pub fn new(log: MessageLog) -> Self {
        Self { log }
    }

    /// Resolve the conversation between `requester_id` and the user named by
    /// `partner_id`, creating it on first contact.
    ///
    /// Safe to call concurrently for the same pair from either side: the
    /// store's unique pair index decides the winner and the loser re-reads.
    pub fn resolve(
        &self,
        requester_id: Uuid,
        partner_id: &str,
    ) -> Result<ResolvedConversation, ChatError> {
        let partner_id: Uuid = partner_id
            .trim()
            .parse()
            .map_err(|_| ChatError::InvalidPartner)?;

        let pair = ParticipantPair::new(requester_id, partner_id).ok_or(ChatError::SelfChatRejected)?;

        let partner = self
            .log
            .users
            .find_by_id(partner_id)?
            .ok_or(ChatError::PartnerNotFound)?;

        debug!("Resolving conversation {} <-> {}", requester_id, partner_id);

        let conversation = self.find_or_create(pair)?;
        let messages = self.log.history(conversation.id)?;

        Ok(ResolvedConversation {
            conversation,
            messages,
            partner,
        })
    }

    fn find_or_create(&self, pair: ParticipantPair) -> Result<Conversation, ChatError> {
        let db = &self.log.db;

        if let Some(row) = db.find_conversation_by_pair(pair)? {
            return Ok(Conversation::try_from(row)?);
        }

        match db.insert_conversation(Uuid::new_v4(), pair)? {
            InsertOutcome::Created(row) => Ok(Conversation::try_from(row)?),
            InsertOutcome::AlreadyExists => {
                info!(
                    "Lost creation race for {} / {}, re-reading",
                    pair.first(),
                    pair.second()
                );
                let row = db.find_conversation_by_pair(pair)?.ok_or_else(|| {
                    anyhow!(
                        "conversation for {} / {} rejected as duplicate but not found",
                        pair.first(),
                        pair.second()
                    )
                })?;
                Ok(Conversation::try_from(row)?)
            }
        }
    }
}
