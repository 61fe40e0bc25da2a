//! Account registration and login.

use std::sync::Arc;

use nudge_core::config::AuthConfig;
use nudge_core::error::{NudgeError, Result};
use nudge_core::model::User;
use nudge_core::traits::UserDirectory;
use serde::Deserialize;

use crate::auth::{self, TokenProvider};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Emails are compared trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct AccountService {
    users: Arc<dyn UserDirectory>,
    tokens: Arc<TokenProvider>,
    bcrypt_cost: u32,
    admin_emails: Vec<String>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserDirectory>, tokens: Arc<TokenProvider>, config: &AuthConfig) -> Self {
        Self {
            users,
            tokens,
            bcrypt_cost: config.bcrypt_cost,
            admin_emails: config.admin_emails.iter().map(|e| normalize_email(e)).collect(),
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<User> {
        let name = req.name.trim().to_string();
        let email = normalize_email(&req.email);

        if name.is_empty() {
            return Err(NudgeError::Validation("name must not be blank".into()));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(NudgeError::Validation("email is not valid".into()));
        }
        if req.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(NudgeError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.users.exists_by_email(&email).await? {
            return Err(NudgeError::Validation("email already registered".into()));
        }

        let password = req.password;
        let cost = self.bcrypt_cost;
        let hash = tokio::task::spawn_blocking(move || auth::hash_password(&password, cost))
            .await
            .map_err(|e| NudgeError::Token(format!("hashing task failed: {e}")))??;

        // A registration racing past the check above is rejected by the directory.
        let user = self.users.save(User::new(&name, &email, hash)).await?;
        tracing::info!("👤 Registered account {email}");
        Ok(user)
    }

    /// Returns a bearer token. Unknown email and wrong password fail alike.
    pub async fn login(&self, req: LoginRequest) -> Result<String> {
        let email = normalize_email(&req.email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            tracing::warn!("Login failed for {email}");
            return Err(NudgeError::InvalidCredentials);
        };

        let password = req.password;
        let hash = user.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
            .await
            .unwrap_or(false);
        if !ok {
            tracing::warn!("Login failed for {email}");
            return Err(NudgeError::InvalidCredentials);
        }

        let roles: &[&str] = if self.admin_emails.contains(&email) {
            &["ADMIN", "USER"]
        } else {
            &["USER"]
        };
        self.tokens.issue(&email, roles)
    }
}
