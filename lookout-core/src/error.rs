use thiserror::Error;

use crate::steamid::SteamId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid steam id: {0}")]
    InvalidSteamId(String),

    #[error("value cannot be empty")]
    EmptyValue,

    #[error("mark requires at least one attribute")]
    EmptyAttributes,

    #[error("{0} is already marked")]
    AlreadyMarked(SteamId),

    #[error("{0} not found")]
    NotFound(SteamId),

    #[error("invalid pattern {pattern:?} in list {list:?}: {source}")]
    InvalidPattern {
        list: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;
