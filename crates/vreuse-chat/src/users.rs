use anyhow::Result;
use uuid::Uuid;

use vreuse_db::Database;
use vreuse_types::models::UserProfile;

/// Read side of the user service: resolves an identity to its public fields.
pub trait UserDirectory: Send + Sync {
    fn find_by_id(&self, id: Uuid) -> Result<Option<UserProfile>>;
}

impl UserDirectory for Database {
    fn find_by_id(&self, id: Uuid) -> Result<Option<UserProfile>> {
        self.get_user_by_id(id)?.map(UserProfile::try_from).transpose()
    }
}
