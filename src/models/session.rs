//! Signed-in session model.

use serde::{Deserialize, Serialize};

/// Credentials and identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInfo {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
}
