pub mod community;
pub mod profile;
pub mod proposal;
