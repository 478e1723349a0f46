pub mod community;
pub mod error;
pub mod profile;
pub mod proposal;
pub mod router;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ApiError, Caller, CALLER_HEADER};
pub use server::{build_app, serve};
