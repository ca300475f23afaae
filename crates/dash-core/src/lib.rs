//! Core types for the dashengine query result cache.
//!
//! Defines the error type, the parameter model, query definitions and their
//! loaders, the cache identity of a query, and the immutable result record
//! produced by one execution.

pub mod binding;
pub mod definition;
pub mod error;
pub mod identity;
pub mod result;
pub mod types;

pub use binding::ParameterBinding;
pub use definition::{
    DefinitionLoader, ParameterSpec, QueryDefinition, StaticDefinitionLoader, YamlDefinitionLoader,
};
pub use error::{DashError, Result};
pub use identity::QueryIdentity;
pub use result::{ExecutionOutput, QueryResult};
pub use types::{ParameterType, ParameterValue, ScalarValue};
