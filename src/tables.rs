//! Name <-> code tables for the handful of small closed vocabularies the
//! chain engine needs, plus the bounded growable buffer used to accumulate
//! header-field bytes during streaming intake.

use crate::error::ArcError;

/// Signature hash/signature algorithm pairing, as carried in a
/// tag-value set's `a=` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    RsaSha1,
    RsaSha256,
    Ed25519Sha256,
}

impl HashAlgo {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RsaSha1 => "rsa-sha1",
            Self::RsaSha256 => "rsa-sha256",
            Self::Ed25519Sha256 => "ed25519-sha256",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ArcError> {
        match value {
            "rsa-sha1" => Ok(Self::RsaSha1),
            "rsa-sha256" => Ok(Self::RsaSha256),
            "ed25519-sha256" => Ok(Self::Ed25519Sha256),
            other => Err(ArcError::UnsupportedHashAlgorithm(other.to_string())),
        }
    }

    /// The digest name as it appears in a DNS key record's `h=` tag
    /// (RFC 6376 section 3.6.1), distinct from the combined `a=` name.
    pub fn digest_name(&self) -> &'static str {
        match self {
            Self::RsaSha1 => "sha1",
            Self::RsaSha256 | Self::Ed25519Sha256 => "sha256",
        }
    }
}

/// The chain verdict, reported externally as a lower-case string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Unknown,
    None,
    Fail,
    Pass,
}

impl ChainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::None => "none",
            Self::Fail => "fail",
            Self::Pass => "pass",
        }
    }
}

impl Default for ChainStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// DNS key-record `k=` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    Ed25519,
}

impl KeyType {
    pub fn parse(value: &str) -> Result<Self, ArcError> {
        match value {
            "rsa" => Ok(Self::Rsa),
            "ed25519" => Ok(Self::Ed25519),
            _ => Err(ArcError::InappropriateKeyAlgorithm),
        }
    }
}

impl Default for KeyType {
    fn default() -> Self {
        Self::Rsa
    }
}

/// The two ARC header field kinds that carry a full tag-value grammar,
/// plus the DNS key-record kind that shares it. ARC-Authentication-Results
/// is not one of these: only its leading `i=` is structured, the rest is
/// opaque `authres` text, so it is parsed separately in `header.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Seal,
    Signature,
    Key,
}

pub const ARC_SEAL: &str = "ARC-Seal";
pub const ARC_MESSAGE_SIGNATURE: &str = "ARC-Message-Signature";
pub const ARC_AUTHENTICATION_RESULTS: &str = "ARC-Authentication-Results";

/// Promotes a bare CR or LF to a full CRLF, for the `FIXCRLF` intake flag.
/// A CR already followed by LF (or an LF already preceded by CR) is left
/// alone; only unpaired line-ending bytes are rewritten.
pub fn fix_crlf(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied().peekable();
    while let Some(b) = iter.next() {
        match b {
            b'\r' => {
                out.push(b'\r');
                if iter.peek() == Some(&b'\n') {
                    out.push(iter.next().unwrap());
                } else {
                    out.push(b'\n');
                }
            }
            b'\n' => {
                out.push(b'\r');
                out.push(b'\n');
            }
            other => out.push(other),
        }
    }
    out
}

pub const MAX_ARC_INSTANCE: u8 = 50;
pub const DEFAULT_MARGIN: usize = 78;
pub const DEFAULT_MIN_KEY_BITS: usize = 1024;
pub const DNS_NAMESPACE: &str = "_domainkey";

/// A growable byte buffer bounded by a configured maximum size, used to
/// accumulate a header field's raw text across the (possibly many)
/// `header_field` calls a streaming caller makes for a single folded
/// field, without letting a hostile message grow memory unbounded.
pub struct GrowableBuffer {
    data: Vec<u8>,
    max: usize,
    on_overflow: Option<Box<dyn Fn(usize) + Send + Sync>>,
}

impl std::fmt::Debug for GrowableBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrowableBuffer")
            .field("len", &self.data.len())
            .field("max", &self.max)
            .finish()
    }
}

impl GrowableBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            data: Vec::new(),
            max,
            on_overflow: None,
        }
    }

    pub fn with_overflow_callback(mut self, cb: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_overflow = Some(Box::new(cb));
        self
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<(), ArcError> {
        if self.data.len() + bytes.len() > self.max {
            if let Some(cb) = &self.on_overflow {
                cb(self.data.len() + bytes.len());
            }
            return Err(ArcError::ResourceExhausted("growable buffer exceeded its configured maximum"));
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_crlf_promotes_bare_endings() {
        assert_eq!(fix_crlf(b"a\r\nb\rc\nd"), b"a\r\nb\r\nc\r\nd");
        assert_eq!(fix_crlf(b"already\r\nfine\r\n"), b"already\r\nfine\r\n");
    }

    #[test]
    fn test_hash_algo_round_trip() {
        for algo in [HashAlgo::RsaSha1, HashAlgo::RsaSha256, HashAlgo::Ed25519Sha256] {
            assert_eq!(HashAlgo::parse(algo.name()).unwrap(), algo);
        }
        assert!(HashAlgo::parse("rsa-md5").is_err());
    }

    #[test]
    fn test_growable_buffer_overflow() {
        let mut buf = GrowableBuffer::new(4);
        buf.push(b"ab").unwrap();
        buf.push(b"cd").unwrap();
        assert_eq!(buf.as_slice(), b"abcd");
        assert!(buf.push(b"e").is_err());
    }

    #[test]
    fn test_growable_buffer_overflow_callback() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let mut buf = GrowableBuffer::new(2).with_overflow_callback(move |_| {
            fired2.store(true, Ordering::SeqCst);
        });
        assert!(buf.push(b"abc").is_err());
        assert!(fired.load(Ordering::SeqCst));
    }
}
