use thiserror::Error;

use crate::vault::StoreHandle;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid commitment: {0}")]
    InvalidCommitment(String),
    #[error("Invalid principal: {0}")]
    InvalidPrincipal(String),
    #[error("Unknown store: {0}")]
    UnknownStore(StoreHandle),
    #[error("Storage fault: {0}")]
    StorageFault(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<sled::Error> for VaultError {
    fn from(err: sled::Error) -> Self {
        VaultError::StorageFault(err.to_string())
    }
}

impl From<bincode::Error> for VaultError {
    fn from(err: bincode::Error) -> Self {
        VaultError::StorageFault(format!("codec: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
