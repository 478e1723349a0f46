pub mod abi;
pub mod contracts;
pub mod error;
pub mod gateway;
pub mod local;
pub mod rpc;
pub mod types;

pub use contracts::registry::CommunityKind;
pub use contracts::safe::SafeDeployment;
pub use contracts::ContractAddresses;
pub use error::{ChainError, ChainResult};
pub use gateway::{ChainGateway, CreatedCommunity, RpcGateway, SafeGateway, DEFAULT_GAS_LIMIT};
pub use local::LocalChain;
pub use rpc::{RpcClient, RpcSettings};
pub use types::{address_hex, Address, TxHash, Wei, WEI_PER_ETH};
