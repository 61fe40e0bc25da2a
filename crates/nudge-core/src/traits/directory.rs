//! User directory: account lookup by email.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::User;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn exists_by_email(&self, email: &str) -> Result<bool>;

    /// Insert (assigning an id) or update a user.
    async fn save(&self, user: User) -> Result<User>;
}
