use molc_chain::{address_hex, Address};
use serde::{Deserialize, Serialize};

pub const USERS: &str = "users";
/// Lowercase wallet address -> user id.
pub const WALLET_INDEX: &str = "wallet_index";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<Address>,
    #[serde(default)]
    pub communities: Vec<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl User {
    /// Name shown next to votes and member lists.
    pub fn label(&self) -> String {
        if !self.display_name.trim().is_empty() {
            self.display_name.clone()
        } else if !self.email.trim().is_empty() {
            self.email.clone()
        } else {
            UNKNOWN_USER.to_string()
        }
    }

    pub fn summary(&self) -> MemberSummary {
        MemberSummary {
            id: self.id.clone(),
            display_name: self.label(),
            wallet_address: self.wallet_address,
        }
    }
}

pub const UNKNOWN_USER: &str = "Unknown User";

/// Profile fields sent by the client on login.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInput {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub id: String,
    pub display_name: String,
    pub wallet_address: Option<Address>,
}

pub fn wallet_key(address: &Address) -> String {
    address_hex(address)
}
