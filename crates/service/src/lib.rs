pub mod context;
pub mod error;
pub mod identity;
pub mod parser;
pub mod pricing;
pub mod proposal;
pub mod registry;
pub mod treasury;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{GovernanceSettings, ServiceContext};
pub use error::{ServiceError, ServiceResult};
pub use pricing::{ExchangeRate, UsdCents};
