use molc_chain::{Address, CommunityKind, Wei};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::profile::MemberSummary;

pub const COMMUNITIES: &str = "communities";
/// Normalised community name -> community id.
pub const COMMUNITY_NAMES: &str = "community_names";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: u64,
    pub name: String,
    pub community_type: CommunityKind,
    #[serde(default)]
    pub description: String,
    pub member_ids: Vec<String>,
    pub admin: String,
    pub nft_contract: Address,
    /// Membership token held by each member, keyed by user id.
    #[serde(default)]
    pub member_tokens: BTreeMap<String, u64>,
    #[serde(default)]
    pub fund_balance_wei: Wei,
    #[serde(default)]
    pub safe_wallet_address: Option<Address>,
    pub created_at: u64,
}

impl Community {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|m| m == user_id)
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin == user_id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCommunity {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub community_type: CommunityKind,
}

/// Community with its member and admin profiles resolved.
#[derive(Debug, Clone, Serialize)]
pub struct CommunityDetails {
    #[serde(flatten)]
    pub community: Community,
    pub members: Vec<MemberSummary>,
    pub admin_profile: Option<MemberSummary>,
}

pub fn community_key(id: u64) -> String {
    format!("{:020}", id)
}

pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
