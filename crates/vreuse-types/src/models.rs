use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on message text, counted in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Public fields of a user as exposed by the user directory. Never carries
/// credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

/// The two participants of a conversation, normalized so that
/// `first() < second()` regardless of construction order.
///
/// Conversation uniqueness is keyed on this normalized form: the store keeps
/// the pair in exactly this order and its unique index only works because
/// (A, B) and (B, A) collapse to the same value here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawParticipantPair")]
pub struct ParticipantPair {
    user_a: Uuid,
    user_b: Uuid,
}

#[derive(Deserialize)]
struct RawParticipantPair {
    user_a: Uuid,
    user_b: Uuid,
}

impl TryFrom<RawParticipantPair> for ParticipantPair {
    type Error = &'static str;

    fn try_from(raw: RawParticipantPair) -> Result<Self, Self::Error> {
        Self::new(raw.user_a, raw.user_b).ok_or("a conversation needs two distinct participants")
    }
}

impl ParticipantPair {
    /// Returns `None` when both ids are the same user.
    pub fn new(x: Uuid, y: Uuid) -> Option<Self> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(Self { user_a: x, user_b: y }),
            std::cmp::Ordering::Greater => Some(Self { user_a: y, user_b: x }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn first(&self) -> Uuid {
        self.user_a
    }

    pub fn second(&self) -> Uuid {
        self.user_b
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The participant that is not `user_id`, or `None` if `user_id` is not in
    /// the pair at all.
    pub fn other(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.user_a {
            Some(self.user_b)
        } else if user_id == self.user_b {
            Some(self.user_a)
        } else {
            None
        }
    }

    pub fn members(&self) -> [Uuid; 2] {
        [self.user_a, self.user_b]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: ParticipantPair,
    pub last_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
