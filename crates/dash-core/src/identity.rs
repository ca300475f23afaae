//! Cache identity of a (query, parameters) pair.

use crate::binding::ParameterBinding;
use ahash::AHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// The key under which a query result is cached and coalesced.
///
/// Two identities are equal iff their query ids are equal and their
/// bindings are equal; bindings are order-independent by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryIdentity {
    query_id: String,
    parameters: ParameterBinding,
}

impl QueryIdentity {
    /// Identity of a query without parameters
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            parameters: ParameterBinding::new(),
        }
    }

    pub fn with_parameters(query_id: impl Into<String>, parameters: ParameterBinding) -> Self {
        Self {
            query_id: query_id.into(),
            parameters,
        }
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn parameters(&self) -> &ParameterBinding {
        &self.parameters
    }

    /// Canonical text form, e.g. `sales{regions=["eu"],year=2024}`.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Compact hash of the canonical form, for log fields.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = AHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for QueryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parameters.is_empty() {
            write!(f, "{}", self.query_id)
        } else {
            write!(f, "{}{}", self.query_id, self.parameters)
        }
    }
}

impl From<&str> for QueryIdentity {
    fn from(query_id: &str) -> Self {
        Self::new(query_id)
    }
}

impl From<String> for QueryIdentity {
    fn from(query_id: String) -> Self {
        Self::new(query_id)
    }
}

impl From<&QueryIdentity> for QueryIdentity {
    fn from(identity: &QueryIdentity) -> Self {
        identity.clone()
    }
}
