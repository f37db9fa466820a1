//! Error types
//!
//! The per-tick simulation never fails; missing references degrade to no-ops.
//! Errors only surface from player-facing requests (shop purchases) and from
//! snapshot import/export at the persistence boundary.

use thiserror::Error;

use crate::sim::player::WeaponKind;

/// Errors surfaced to the host application
#[derive(Debug, Error)]
pub enum SimError {
    #[error("not enough money: need ${needed}, have ${available}")]
    InsufficientFunds { needed: u32, available: u32 },

    #[error("{0} already owned")]
    AlreadyOwned(WeaponKind),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Storage(String),
}

pub type SimResult<T> = Result<T, SimError>;
