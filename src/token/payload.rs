use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TokenError;

/// Claims carried by every access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub id: Uuid,
    pub username: String,
    pub issued_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

impl Payload {
    pub fn new(username: &str, duration: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            issued_at,
            expired_at: issued_at + duration,
        }
    }

    pub fn valid(&self) -> Result<(), TokenError> {
        if Utc::now() > self.expired_at {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_expiry() {
        let live = Payload::new("alice", Duration::minutes(1));
        assert!(live.valid().is_ok());
        assert_eq!(live.expired_at - live.issued_at, Duration::minutes(1));

        let dead = Payload::new("alice", -Duration::minutes(1));
        assert_eq!(dead.valid(), Err(TokenError::Expired));
    }

    #[test]
    fn test_payload_ids_are_unique() {
        let a = Payload::new("alice", Duration::minutes(1));
        let b = Payload::new("alice", Duration::minutes(1));
        assert_ne!(a.id, b.id);
    }
}
