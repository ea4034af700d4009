use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use vreuse_chat::{ChatError, MessageLog};
use vreuse_types::api::MessageView;
use vreuse_types::events::GatewayEvent;
use vreuse_types::models::ParticipantPair;

use crate::presence::PresenceRegistry;

/// Persists live send events and fans new messages out to whoever is online.
///
/// Delivery is best effort: an offline participant gets nothing now and reads
/// the message from history later. The sender is not excluded, so their own
/// connection receives the echo; clients dedupe optimistic entries by message
/// id.
#[derive(Clone)]
pub struct DeliveryRouter {
    log: MessageLog,
    presence: PresenceRegistry,
}

impl DeliveryRouter {
    pub fn new(log: MessageLog, presence: PresenceRegistry) -> Self {
        Self { log, presence }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Handle an inbound `Send` event. Nothing is reported back to the peer:
    /// malformed, unauthorized and failed sends are all logged and dropped
    /// the same way.
    pub async fn route(&self, conversation_id: &str, sender_id: &str, text: &str) {
        if conversation_id.is_empty() || sender_id.is_empty() || text.is_empty() {
            warn!(
                "Dropping send event with missing fields (conversation '{:.64}', sender '{:.64}')",
                conversation_id, sender_id
            );
            return;
        }

        let (Ok(conversation_id), Ok(sender_id)) =
            (conversation_id.parse::<Uuid>(), sender_id.parse::<Uuid>())
        else {
            warn!(
                "Dropping send event with malformed ids (conversation '{:.64}', sender '{:.64}')",
                conversation_id, sender_id
            );
            return;
        };

        // Run blocking DB work off the async runtime
        let log = self.log.clone();
        let text = text.to_string();
        let stored = tokio::task::spawn_blocking(move || {
            let message = log.append_message(conversation_id, sender_id, &text)?;
            let participants = log.participants(conversation_id)?;
            let view = log.attach_sender(message)?;
            Ok::<_, ChatError>((view, participants))
        })
        .await;

        match stored {
            Ok(Ok((message, participants))) => {
                self.push(&message, participants).await;
            }
            Ok(Err(e)) => {
                warn!("Dropping send from {} to {}: {}", sender_id, conversation_id, e);
            }
            Err(e) => error!("spawn_blocking join error: {}", e),
        }
    }

    /// Push an already stored message to every present participant of its
    /// conversation. Returns how many connections it was handed to.
    pub async fn fan_out(&self, message: &MessageView) -> usize {
        let log = self.log.clone();
        let conversation_id = message.conversation_id;
        let participants = tokio::task::spawn_blocking(move || log.participants(conversation_id)).await;

        match participants {
            Ok(Ok(participants)) => self.push(message, participants).await,
            Ok(Err(e)) => {
                warn!("Not fanning out message {}: {}", message.id, e);
                0
            }
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                0
            }
        }
    }

    async fn push(&self, message: &MessageView, participants: ParticipantPair) -> usize {
        let mut delivered = 0;

        for user_id in participants.members() {
            let Some(handle) = self.presence.lookup(user_id).await else {
                trace!("{} offline, message {} stays in history", user_id, message.id);
                continue;
            };

            if handle.push(GatewayEvent::Deliver { message: message.clone() }) {
                delivered += 1;
            } else {
                debug!("Connection {} for {} already closed", handle.id(), user_id);
            }
        }

        debug!(
            "Message {} in {} delivered to {} connection(s)",
            message.id, message.conversation_id, delivered
        );
        delivered
    }
}
