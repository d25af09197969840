use std::fmt;

use rand::Rng;

/// Number of random bytes behind an identity token (hex-encoded to twice as many chars).
pub const IDENTITY_BYTES: usize = 8;

/// Opaque per-connection token used as the subscriber key in every room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Generate a fresh identity from the thread-local CSPRNG.
    ///
    /// # Examples
    /// ```
    /// let id = hostel_common::Identity::generate();
    /// assert_eq!(id.as_str().len(), 16);
    /// ```
    pub fn generate() -> Self {
        Self(random_hex(IDENTITY_BYTES))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase hex encoding of `bytes` random bytes.
pub fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}
