//! Tween engine error types

use crate::callbacks::CallbackKind;
use crate::tween::TweenId;
use thiserror::Error;

/// Errors surfaced by the fallible parts of the tween engine
///
/// The per-tick path never produces these; it logs and carries on.
#[derive(Error, Debug)]
pub enum TweenError {
    /// No registered tween has this id
    #[error("No tween registered with id {0}")]
    NotFound(TweenId),

    /// No registered tween has this short id
    #[error("No tween registered with short id '{0}'")]
    ShortIdNotFound(String),

    /// The tween exists but animates a different value type
    #[error("Tween {id} animates `{actual}`, not `{expected}`")]
    TypeMismatch {
        id: TweenId,
        expected: &'static str,
        actual: &'static str,
    },

    /// The pool has no free instance and could not expand
    #[error("Tween pool exhausted for `{type_name}`")]
    PoolExhausted { type_name: &'static str },

    /// The tween is firing its own callbacks and cannot be borrowed
    #[error("Tween {0} is busy running its callbacks")]
    Busy(TweenId),

    /// The handle outlived the use it was issued for (the instance was
    /// recycled and possibly redispensed)
    #[error("Handle for tween {0} is stale")]
    Stale(TweenId),

    /// A value callback kind was passed where a lifecycle kind is required
    #[error("{0:?} is not a lifecycle callback")]
    NotLifecycle(CallbackKind),

    /// Failed to read a configuration file
    #[error("Failed to read tween config: {0}")]
    ConfigRead(#[from] std::io::Error),

    /// Failed to parse a configuration file
    #[error("Failed to parse tween config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for tween engine operations
pub type Result<T> = std::result::Result<T, TweenError>;
