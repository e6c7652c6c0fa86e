use thiserror::Error;

use crate::NodeId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Structural errors raised while mutating the scene.
///
/// These point at authoring mistakes, so nothing here is retried; they
/// propagate to whoever drives the host adapter.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} is not part of the catalogue or the engine namespace; did you forget to extend?")]
    UnknownType(String),
    #[error("the `args` prop of {0} must be an array")]
    InvalidArgs(String),
    #[error("primitives without `object` are invalid")]
    MissingObject,
    #[error("no valid root for {0}")]
    NoRoot(String),
    #[error("{0} is not allowed in the scene tree")]
    UnsupportedNode(String),
    #[error("cannot set `{key}` on {type_name}: {source}")]
    InvalidProperty {
        type_name: String,
        key: String,
        #[source]
        source: PropertyError,
    },
    #[error("constructing {type_name} failed: {reason}")]
    Construct { type_name: String, reason: String },
    #[error("node {0:?} is no longer part of the scene")]
    StaleNode(NodeId),
}

/// Errors a [`SceneObject`](crate::SceneObject) reports for a single property.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PropertyError {
    #[error("unknown property")]
    Unknown,
    #[error("expected {expected}, got {got}")]
    Type {
        expected: &'static str,
        got: &'static str,
    },
    #[error("path segment `{0}` does not resolve")]
    Unresolved(String),
    #[error("property is read-only")]
    ReadOnly,
}

/// A disposal failure. Never propagated; logged by the idle queue.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("dispose failed: {0}")]
pub struct DisposeError(pub String);
