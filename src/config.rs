//! `ArcLib`: the library handle constructed once per process (or per
//! tenant) and shared across every [`crate::chain::ArcMessage`] it
//! creates.

use crate::chain::{ArcMessage, Mode};
use crate::resolver::Resolver;
use crate::tables::{DEFAULT_MARGIN, DEFAULT_MIN_KEY_BITS};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

bitflags::bitflags! {
    /// Mirrors the reference implementation's `ARC_LIBFLAGS_*` bitmap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LibFlags: u32 {
        /// Promote a bare CR or LF to CRLF on header/body intake.
        const FIX_CRLF = 1 << 0;
        /// Retain canonicalized scratch bytes under the configured tmpdir.
        const KEEP_FILES = 1 << 1;
    }
}

/// A compiled, case-insensitive set of header-field names, standing in
/// for the reference implementation's compiled signing-pattern regex
/// (the set membership test is the only thing the pattern is ever used
/// for here, so a `HashSet` replaces it rather than an actual regex
/// engine).
#[derive(Debug, Clone, Default)]
pub struct HeaderNameSet(HashSet<String>);

impl HeaderNameSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(|n| n.as_ref().to_ascii_lowercase())
                .collect(),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(&name.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Immutable, `Send + Sync` configuration and resolver handle. Construct
/// once with [`ArcLibBuilder`] and share across threads; each message is
/// processed through its own [`ArcMessage`] borrowed from it.
pub struct ArcLib {
    resolver: Arc<dyn Resolver>,
    min_key_bits: usize,
    margin: usize,
    max_body_bytes: usize,
    max_header_bytes: usize,
    fixed_time: Option<i64>,
    flags: LibFlags,
    tmpdir: Option<PathBuf>,
    sign_headers: HeaderNameSet,
    oversign_headers: HeaderNameSet,
}

impl ArcLib {
    pub fn builder(resolver: Arc<dyn Resolver>) -> ArcLibBuilder {
        ArcLibBuilder::new(resolver)
    }

    pub fn new_message(&self, mode: Mode) -> ArcMessage<'_> {
        ArcMessage::new(self, mode)
    }

    pub fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }

    pub fn min_key_bits(&self) -> usize {
        self.min_key_bits
    }

    pub fn margin(&self) -> usize {
        self.margin
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn fixed_time(&self) -> Option<i64> {
        self.fixed_time
    }

    pub fn now(&self) -> i64 {
        self.fixed_time.unwrap_or_else(|| chrono::Utc::now().timestamp())
    }

    pub fn flags(&self) -> LibFlags {
        self.flags
    }

    /// Whether bare CR/LF in intake should be promoted to CRLF.
    pub fn fix_crlf(&self) -> bool {
        self.flags.contains(LibFlags::FIX_CRLF)
    }

    pub fn keep_files(&self) -> bool {
        self.flags.contains(LibFlags::KEEP_FILES)
    }

    pub fn tmpdir(&self) -> Option<&std::path::Path> {
        self.tmpdir.as_deref()
    }

    pub fn sign_headers(&self) -> &HeaderNameSet {
        &self.sign_headers
    }

    pub fn oversign_headers(&self) -> &HeaderNameSet {
        &self.oversign_headers
    }
}

pub struct ArcLibBuilder {
    resolver: Arc<dyn Resolver>,
    min_key_bits: usize,
    margin: usize,
    max_body_bytes: usize,
    max_header_bytes: usize,
    fixed_time: Option<i64>,
    flags: LibFlags,
    tmpdir: Option<PathBuf>,
    sign_headers: HeaderNameSet,
    oversign_headers: HeaderNameSet,
}

impl ArcLibBuilder {
    fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            min_key_bits: DEFAULT_MIN_KEY_BITS,
            margin: DEFAULT_MARGIN,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            fixed_time: None,
            flags: LibFlags::empty(),
            tmpdir: None,
            sign_headers: HeaderNameSet::default(),
            oversign_headers: HeaderNameSet::default(),
        }
    }

    pub fn with_min_key_bits(mut self, bits: usize) -> Self {
        self.min_key_bits = bits;
        self
    }

    /// Sets the line-wrap column for generated headers. 0 disables
    /// wrapping.
    pub fn with_margin(mut self, margin: usize) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    pub fn with_max_header_bytes(mut self, max: usize) -> Self {
        self.max_header_bytes = max;
        self
    }

    /// Overrides the `t=` timestamp used when generating seals, for
    /// reproducible tests.
    pub fn with_fixed_time(mut self, unix_time: i64) -> Self {
        self.fixed_time = Some(unix_time);
        self
    }

    pub fn with_flags(mut self, flags: LibFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the directory [`LibFlags::KEEP_FILES`] writes scratch bytes
    /// under. Has no effect unless that flag is also set.
    pub fn with_tmpdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmpdir = Some(dir.into());
        self
    }

    /// The header-field names the signer must sign, matched
    /// case-insensitively against each message's observed headers.
    pub fn with_sign_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sign_headers = HeaderNameSet::new(names);
        self
    }

    /// Header-field names signed even when absent from the message, to
    /// prevent their later addition from going unnoticed.
    pub fn with_oversign_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.oversign_headers = HeaderNameSet::new(names);
        self
    }

    pub fn build(self) -> ArcLib {
        ArcLib {
            resolver: self.resolver,
            min_key_bits: self.min_key_bits,
            margin: self.margin,
            max_body_bytes: self.max_body_bytes,
            max_header_bytes: self.max_header_bytes,
            fixed_time: self.fixed_time,
            flags: self.flags,
            tmpdir: self.tmpdir,
            sign_headers: self.sign_headers,
            oversign_headers: self.oversign_headers,
        }
    }
}
