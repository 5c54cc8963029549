//! User and Address

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::Role;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// First sign-in. Every account starts as a customer.
    pub fn register(email: &str, name: Option<String>) -> Self {
        Self { id: Uuid::now_v7(), email: normalize_email(email), name, role: Role::Customer, created_at: Utc::now() }
    }
}

/// Emails are unique case-insensitively.
pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

/// Who is calling, as resolved from the identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller { pub user_id: Uuid, pub role: Role }

impl From<&User> for Caller {
    fn from(u: &User) -> Self { Self { user_id: u.id, role: u.role } }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub is_default: bool,
}

#[derive(Clone, Debug)]
pub struct NewAddress { pub street: String, pub city: String, pub state: String, pub postal_code: String, pub country: String, pub is_default: bool }

impl Address {
    pub fn create(user_id: Uuid, new: NewAddress) -> Self {
        Self {
            id: Uuid::now_v7(), user_id, street: new.street, city: new.city, state: new.state,
            postal_code: new.postal_code, country: new.country, is_default: new.is_default,
        }
    }
    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.user_id == user_id }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_defaults_to_customer() {
        let u = User::register("  Ada@Example.COM ", Some("Ada".into()));
        assert_eq!(u.email, "ada@example.com");
        assert_eq!(u.role, Role::Customer);
        assert_eq!(Caller::from(&u).role, Role::Customer);
    }
}
