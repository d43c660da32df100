//! Session auth: bcrypt login, HS256 cookie sessions, login rate limiting.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use recall::config::{
    ConfigError, require_string_from_env, u64_from_env, usize_from_env,
};

/// Session cookie name.
pub const SESSION_COOKIE: &str = "rag_session";

/// Auth configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub app_user: String,
    pub app_user_hash_bcrypt: String,
    pub session_secret: String,
    pub session_ttl_hours: u64,
    pub login_rate_max_attempts: usize,
    pub login_rate_window_seconds: u64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            app_user: require_string_from_env("APP_USER")?,
            app_user_hash_bcrypt: require_string_from_env("APP_USER_HASH_BCRYPT")?,
            session_secret: require_string_from_env("SESSION_SECRET")?,
            session_ttl_hours: u64_from_env("SESSION_TTL_HOURS", 24),
            login_rate_max_attempts: usize_from_env("LOGIN_RATE_MAX_ATTEMPTS", 5),
            login_rate_window_seconds: u64_from_env("LOGIN_RATE_WINDOW_SECONDS", 900),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Verifies a password against the configured bcrypt hash.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    bcrypt::verify(password, hashed).unwrap_or(false)
}

/// Issues a signed session token for `username`.
pub fn create_session(config: &AuthConfig, username: &str) -> Result<String, String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| e.to_string())?
        .as_secs() as i64;
    let claims = SessionClaims {
        sub: username.to_string(),
        iat: now,
        exp: now + (config.session_ttl_hours as i64) * 3600,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.session_secret.as_bytes()),
    )
    .map_err(|e| e.to_string())
}

/// Validates a session token and returns the username.
pub fn decode_session(config: &AuthConfig, token: &str) -> Option<String> {
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(config.session_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims.sub)
}

/// Extracts the session cookie value from a `Cookie` header.
pub fn session_cookie_value(cookie_header: &str) -> Option<&str> {
    cookie_header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}

/// Process-wide login-attempt tracker (failures only).
#[derive(Default)]
pub struct LoginRateLimiter {
    attempts: Mutex<HashMap<String, Vec<f64>>>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the retry-after delay when the account is locked out.
    pub fn check(&self, config: &AuthConfig, username: &str) -> Option<u64> {
        let now = now_secs();
        let window = config.login_rate_window_seconds as f64;

        let mut attempts = self.attempts.lock();
        let entry = attempts.entry(username.to_string()).or_default();
        entry.retain(|t| now - *t < window);

        if entry.len() >= config.login_rate_max_attempts {
            let oldest = entry.first().copied().unwrap_or(now);
            return Some((window - (now - oldest)).ceil().max(0.0) as u64);
        }
        None
    }

    /// Records one failed attempt.
    pub fn record_failure(&self, config: &AuthConfig, username: &str) {
        let now = now_secs();
        let window = config.login_rate_window_seconds as f64;

        let mut attempts = self.attempts.lock();
        let entry = attempts.entry(username.to_string()).or_default();
        entry.retain(|t| now - *t < window);
        entry.push(now);
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            app_user: "tester".to_string(),
            // bcrypt hash of "secret" at cost 4.
            app_user_hash_bcrypt: bcrypt::hash("secret", 4).unwrap(),
            session_secret: "test-session-secret".to_string(),
            session_ttl_hours: 1,
            login_rate_max_attempts: 3,
            login_rate_window_seconds: 900,
        }
    }

    #[test]
    fn test_password_verification() {
        let config = config();
        assert!(verify_password("secret", &config.app_user_hash_bcrypt));
        assert!(!verify_password("wrong", &config.app_user_hash_bcrypt));
        assert!(!verify_password("secret", "not-a-hash"));
    }

    #[test]
    fn test_session_round_trip() {
        let config = config();
        let token = create_session(&config, "tester").unwrap();
        assert_eq!(decode_session(&config, &token).as_deref(), Some("tester"));
    }

    #[test]
    fn test_session_rejects_wrong_secret() {
        let config = config();
        let token = create_session(&config, "tester").unwrap();

        let other = AuthConfig {
            session_secret: "different".to_string(),
            ..config
        };
        assert!(decode_session(&other, &token).is_none());
        assert!(decode_session(&other, "garbage").is_none());
    }

    #[test]
    fn test_cookie_parsing() {
        assert_eq!(
            session_cookie_value("a=b; rag_session=tok123; c=d"),
            Some("tok123")
        );
        assert_eq!(session_cookie_value("rag_session=solo"), Some("solo"));
        assert_eq!(session_cookie_value("other=x"), None);
        assert_eq!(session_cookie_value(""), None);
    }

    #[test]
    fn test_login_rate_limiter_locks_after_failures() {
        let config = config();
        let limiter = LoginRateLimiter::new();

        assert!(limiter.check(&config, "tester").is_none());
        for _ in 0..3 {
            limiter.record_failure(&config, "tester");
        }
        let retry = limiter.check(&config, "tester").unwrap();
        assert!(retry > 0 && retry <= 900);

        // Another account is unaffected.
        assert!(limiter.check(&config, "other").is_none());
    }
}
