use crate::domain::errors::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Usernames are 3-32 characters of ASCII letters, digits and underscores
pub fn validate_username(raw: &str) -> Result<String, ValidationError> {
    let username = raw.trim();
    if !(3..=32).contains(&username.len()) {
        return Err(ValidationError::InvalidUsername(format!(
            "Username must be 3-32 characters, got {}",
            username.len()
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::InvalidUsername(
            "Username may only contain letters, digits and underscores".to_string(),
        ));
    }
    Ok(username.to_string())
}
