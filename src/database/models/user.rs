use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::validator::{validate_email, validate_password_plaintext, Validator};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: Vec<u8>,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

impl User {
    /// A user that has not been persisted yet; the store assigns id, created_at and version.
    pub fn new(name: String, email: String, password_hash: Vec<u8>) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            name,
            email,
            password_hash,
            activated: false,
            version: 1,
        }
    }
}

pub fn validate_user(v: &mut Validator, name: &str, email: &str, password: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, email);
    validate_password_plaintext(v, password);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_version_stay_private() {
        let user = User::new("Alice".into(), "alice@example.com".into(), b"hash".to_vec());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("version").is_none());
        assert_eq!(json["activated"], false);
    }

    #[test]
    fn validation_reports_each_field() {
        let mut v = Validator::new();
        validate_user(&mut v, "", "nope", "short");
        let errors = v.into_errors();
        assert_eq!(errors["name"], "must be provided");
        assert_eq!(errors["email"], "must be a valid email address");
        assert_eq!(errors["password"], "must be at least 8 bytes long");
    }
}
