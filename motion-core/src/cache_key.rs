//! The composite key identifying a result-cache entry.

use std::fmt;

use crate::key::{FlowKey, Fingerprint};
use crate::state::Version;

/// Identifies a cached serve result: `(flow_key, version, fingerprint)`.
///
/// Two lookups only ever collide when all three components match, per
/// spec. §4.3 ("Lookups must compare all three components").
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheEntryKey {
    flow_key: FlowKey,
    version: Version,
    fingerprint: Fingerprint,
}

impl CacheEntryKey {
    /// Builds a new cache entry key.
    pub fn new(flow_key: FlowKey, version: Version, fingerprint: Fingerprint) -> Self {
        Self {
            flow_key,
            version,
            fingerprint,
        }
    }

    /// The flow this entry belongs to.
    pub fn flow_key(&self) -> &FlowKey {
        &self.flow_key
    }

    /// The state version this entry was computed against.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The request fingerprint this entry was computed for.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

impl fmt::Debug for CacheEntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntryKey")
            .field("flow_key", &self.flow_key)
            .field("version", &self.version)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}
