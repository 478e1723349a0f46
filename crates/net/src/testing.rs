use molc_chain::{Address, LocalChain};
use molc_database::{InnerDatabase, SafeDatabase};
use molc_service::identity;
use molc_service::parser::profile::{User, UserInput};
use molc_service::{ExchangeRate, GovernanceSettings, ServiceContext, ServiceResult};
use std::sync::Arc;
use tempfile::TempDir;

pub fn wallet(n: u8) -> Address {
    Address::repeat_byte(n)
}

/// Service context over a temporary store and an in-process chain.
pub struct TestApp {
    _dir: TempDir,
    pub ctx: ServiceContext<InnerDatabase>,
}

impl TestApp {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let db = InnerDatabase::new(dir.path().join("molc_db"))?;
        let chain = LocalChain::new();
        let ctx = ServiceContext::new(
            db,
            Arc::new(chain.clone()),
            Arc::new(chain),
            ExchangeRate::default(),
            GovernanceSettings::default(),
        );
        Ok(Self { _dir: dir, ctx })
    }

    pub fn user(&self, id: &str, n: u8) -> ServiceResult<User> {
        identity::create_or_update_user(
            &self.ctx,
            UserInput {
                id: id.to_string(),
                email: format!("{}@example.com", id),
                display_name: id.to_string(),
                bio: None,
                wallet_address: Some(wallet(n)),
            },
        )
    }
}
