use vreuse_types::models::MAX_MESSAGE_LEN;

/// Failures of the chat operations. Store-level uniqueness conflicts never
/// appear here: the store reports them as `InsertOutcome::AlreadyExists` and
/// the resolver recovers.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Invalid partner ID")]
    InvalidPartner,

    #[error("Cannot chat with yourself")]
    SelfChatRejected,

    #[error("Partner user not found")]
    PartnerNotFound,

    #[error("Conversation not found")]
    ConversationNotFound,

    #[error("Not a participant of this conversation")]
    NotParticipant,

    #[error("Not authorized to view this chat")]
    NotAuthorized,

    #[error("Message text must be between 1 and {} characters", MAX_MESSAGE_LEN)]
    EmptyOrOversizeText,

    #[error("store unavailable: {0}")]
    Transient(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Unauthorized,
    Transient,
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPartner | Self::SelfChatRejected | Self::EmptyOrOversizeText => {
                ErrorKind::InvalidInput
            }
            Self::PartnerNotFound | Self::ConversationNotFound => ErrorKind::NotFound,
            Self::NotParticipant | Self::NotAuthorized => ErrorKind::Unauthorized,
            Self::Transient(_) => ErrorKind::Transient,
        }
    }
}
