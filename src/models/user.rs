//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// Hourly rate given to users who sign in without supplying one.
pub const DEFAULT_HOURLY_RATE: f64 = 2550.0;

/// User profile stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Google subject identifier (also used as document ID)
    pub uid: String,
    pub email: String,
    pub display_name: String,
    /// Billing rate in currency units per hour
    pub hourly_rate: f64,
    /// Opaque id for the public read-only report link
    #[serde(default)]
    pub public_share_id: Option<String>,
    /// When the user first signed in (RFC3339)
    #[serde(default)]
    pub created_at: String,
}

impl User {
    /// Name to show for this user: display name, falling back to email.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.email
        } else {
            &self.display_name
        }
    }
}
