//! Hierarchical names and digest identifiers.
//!
//! `Name` is the hierarchical-name type shared by Interests, Data, creators,
//! and data objects — the same newtype-over-`Vec`-of-components shape
//! `aura-core::identifiers` uses for its session/event identifiers, adapted
//! to a `/`-delimited hierarchy instead of a bare UUID.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single opaque path component of a [`Name`].
pub type Component = Vec<u8>;

/// A hierarchical name, e.g. `/repo/0/sync/<digest>`.
///
/// Names compare and order by their component sequence, which is what
/// gives [`crate::tree::SyncTree`] a canonical, insertion-order-independent
/// iteration order over creators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Name(Vec<Component>);

impl Name {
    /// The empty (root) name.
    pub fn root() -> Self {
        Name(Vec::new())
    }

    /// Parse a `/`-delimited string into a name. A leading `/` is optional;
    /// empty segments (e.g. from a trailing slash) are skipped.
    pub fn parse(s: &str) -> Self {
        let comps = s
            .split('/')
            .filter(|seg| !seg.is_empty())
            .map(|seg| seg.as_bytes().to_vec())
            .collect();
        Name(comps)
    }

    /// Build a name from an ordered list of components.
    pub fn from_components(comps: Vec<Component>) -> Self {
        Name(comps)
    }

    /// Append a single component and return the extended name.
    pub fn append(&self, comp: impl Into<Component>) -> Self {
        let mut comps = self.0.clone();
        comps.push(comp.into());
        Name(comps)
    }

    /// Append a `/`-delimited suffix and return the extended name.
    pub fn append_str(&self, suffix: &str) -> Self {
        let mut name = self.clone();
        for seg in suffix.split('/').filter(|s| !s.is_empty()) {
            name = name.append(seg.as_bytes().to_vec());
        }
        name
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this name has no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Components as a slice.
    pub fn components(&self) -> &[Component] {
        &self.0
    }

    /// Whether `self` is a prefix of `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Strip a known prefix, returning the remaining components if `self`
    /// starts with `prefix`.
    pub fn strip_prefix(&self, prefix: &Name) -> Option<Vec<Component>> {
        if prefix.is_prefix_of(self) {
            Some(self.0[prefix.0.len()..].to_vec())
        } else {
            None
        }
    }

    /// Render a single component as a UTF-8 string, lossily.
    pub fn component_str(comp: &Component) -> String {
        String::from_utf8_lossy(comp).into_owned()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for comp in &self.0 {
            write!(f, "/{}", String::from_utf8_lossy(comp))?;
        }
        Ok(())
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::parse(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Name::parse(&s)
    }
}

/// A 32-byte SHA-256 digest, used for root digests, entry-name digests,
/// and leaf digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// The all-zero digest, used as the sentinel "initial" digest of an
    /// empty [`crate::tree::SyncTree`].
    pub const ZERO: Digest = Digest([0u8; 32]);

    /// Hash an arbitrary byte slice.
    pub fn of(bytes: &[u8]) -> Self {
        use sha2::{Digest as _, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let out = hasher.finalize();
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&out);
        Digest(buf)
    }

    /// Hash the concatenation of several byte slices without an
    /// intermediate allocation per slice.
    pub fn of_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        use sha2::{Digest as _, Sha256};
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        let out = hasher.finalize();
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&out);
        Digest(buf)
    }

    /// Hex-encode the digest, used in Interest names
    /// (`<syncPrefix>/sync/<rootDigest>`).
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Parse a digest back out of its hex encoding.
    pub fn from_hex(s: &str) -> Result<Self, crate::errors::SyncError> {
        let bytes = hex::decode(s)
            .map_err(|e| crate::errors::SyncError::DigestError(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(crate::errors::SyncError::DigestError(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&bytes);
        Ok(Digest(buf))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
