pub mod access;
pub mod audit;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod storage;
pub mod vault;

pub use error::{Result, VaultError};
pub use vault::{StoreHandle, UnlockResult, Vault};
