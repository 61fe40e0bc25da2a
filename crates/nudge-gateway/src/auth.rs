//! Credential Verifier: HS256 bearer tokens and password hashing.
//!
//! Tokens carry the account email as `sub`, a `roles` claim, and
//! `iat`/`exp` in epoch seconds. Expiry is strict: a token whose `exp`
//! equals the current second is already expired.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, get_current_timestamp};
use nudge_core::config::AuthConfig;
use nudge_core::error::{NudgeError, Result};
use serde::{Deserialize, Serialize};

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Signed claim set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, with = "role_claim", skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    pub iat: u64,
    pub exp: u64,
}

/// The `roles` claim is written as one comma-joined string, but tokens from
/// other issuers may carry a JSON list. Both normalise to trimmed, non-empty
/// role names.
mod role_claim {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Joined(String),
        List(Vec<String>),
    }

    pub fn serialize<S: Serializer>(roles: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&roles.join(","))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let names: Vec<String> = match Option::<Raw>::deserialize(deserializer)? {
            None => Vec::new(),
            Some(Raw::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
            Some(Raw::List(list)) => list,
        };
        Ok(names
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect())
    }
}

/// Issues and checks bearer tokens with one shared secret.
pub struct TokenProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
}

impl TokenProvider {
    /// Fails with a configuration error when the secret is shorter than
    /// [`MIN_SECRET_LEN`] bytes.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let secret = config.secret.as_bytes();
        if secret.len() < MIN_SECRET_LEN {
            return Err(NudgeError::Configuration(format!(
                "auth.secret must be at least {MIN_SECRET_LEN} bytes (got {}); set it in config or JWT_SECRET",
                secret.len()
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl_secs: config.ttl_secs,
        })
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Sign a token for `subject` valid for the configured TTL.
    pub fn issue(&self, subject: &str, roles: &[&str]) -> Result<String> {
        let iat = get_current_timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            iat,
            exp: iat + self.ttl_secs,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| NudgeError::Token(format!("failed to sign token: {e}")))
    }

    /// True iff the signature checks out and the token is unexpired.
    /// Never errors.
    pub fn verify(&self, token: &str) -> bool {
        self.claims(token).is_ok()
    }

    pub fn subject_of(&self, token: &str) -> Result<String> {
        Ok(self.claims(token)?.sub)
    }

    pub fn roles_of(&self, token: &str) -> Result<Vec<String>> {
        Ok(self.claims(token)?.roles)
    }

    /// Decode and fully validate a token.
    pub fn claims(&self, token: &str) -> Result<Claims> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| NudgeError::Token(e.to_string()))?;
        if data.claims.exp <= get_current_timestamp() {
            return Err(NudgeError::Token("token expired".into()));
        }
        Ok(data.claims)
    }
}

/// Hash a password with bcrypt. CPU-bound; call from a blocking thread.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|e| NudgeError::Token(format!("password hashing failed: {e}")))
}

/// Check a password against a stored bcrypt hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-bytes-long";

    fn provider(ttl_secs: u64) -> TokenProvider {
        TokenProvider::new(&AuthConfig {
            secret: SECRET.into(),
            ttl_secs,
            ..AuthConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = provider(3600);
        let token = tokens.issue("ana@example.com", &["USER"]).unwrap();
        assert!(tokens.verify(&token));
        assert_eq!(tokens.subject_of(&token).unwrap(), "ana@example.com");
        assert_eq!(tokens.roles_of(&token).unwrap(), vec!["USER".to_string()]);
    }

    #[test]
    fn test_roles_round_trip_in_order() {
        let tokens = provider(3600);
        let token = tokens.issue("ops@example.com", &["ADMIN", "USER"]).unwrap();
        assert_eq!(tokens.roles_of(&token).unwrap(), vec!["ADMIN", "USER"]);
    }

    #[test]
    fn test_no_roles_yields_empty_list() {
        let tokens = provider(3600);
        let token = tokens.issue("ana@example.com", &[]).unwrap();
        assert!(tokens.roles_of(&token).unwrap().is_empty());
    }

    #[test]
    fn test_every_single_character_tamper_fails() {
        let tokens = provider(3600);
        let token = tokens.issue("ana@example.com", &["USER"]).unwrap();

        for (i, c) in token.char_indices() {
            if c == '.' {
                continue;
            }
            let replacement = if c == 'A' { 'B' } else { 'A' };
            let mut tampered = token.clone();
            tampered.replace_range(i..i + 1, &replacement.to_string());
            assert!(!tokens.verify(&tampered), "tamper at {i} was accepted");
        }
    }

    #[test]
    fn test_zero_ttl_is_expired_immediately() {
        let tokens = provider(0);
        let token = tokens.issue("ana@example.com", &["USER"]).unwrap();
        assert!(!tokens.verify(&token));
        assert!(tokens.subject_of(&token).is_err());
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let other = TokenProvider::new(&AuthConfig {
            secret: "another-secret-also-at-least-32-bytes-long".into(),
            ..AuthConfig::default()
        })
        .unwrap();
        let token = other.issue("ana@example.com", &["USER"]).unwrap();
        assert!(!provider(3600).verify(&token));
    }

    #[test]
    fn test_garbage_never_panics() {
        let tokens = provider(3600);
        for junk in ["", "abc", "a.b.c", "...", "Bearer x"] {
            assert!(!tokens.verify(junk));
        }
    }

    #[test]
    fn test_list_encoded_roles_are_normalised() {
        let now = get_current_timestamp();
        let raw = serde_json::json!({
            "sub": "ana@example.com",
            "roles": ["ADMIN", " USER ", ""],
            "iat": now,
            "exp": now + 60,
        });
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &raw,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(provider(3600).roles_of(&token).unwrap(), vec!["ADMIN", "USER"]);
    }

    #[test]
    fn test_joined_roles_drop_empty_entries() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "sub": "x", "roles": "ADMIN,,USER,", "iat": 0, "exp": 1,
        }))
        .unwrap();
        assert_eq!(claims.roles, vec!["ADMIN", "USER"]);
    }

    #[test]
    fn test_weak_secret_rejected() {
        let err = TokenProvider::new(&AuthConfig {
            secret: "short".into(),
            ..AuthConfig::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, NudgeError::Configuration(_)));
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("hunter22", 4).unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-bcrypt-hash"));
    }
}
