//! Incremental hashing: body digests (with `l=` truncation), AMS/seal
//! header digests, and the "oldest unsigned instance" header-selection
//! rule used when computing an AMS digest.

use crate::canon::{self, Type as CanonType};
use crate::header::HeaderField;
use crate::tables::{HashAlgo, ARC_SEAL};
use crate::ArcError;
use base64::engine::general_purpose;
use base64::Engine;
use sha1::{Digest as _, Sha1};
use sha2::Sha256;
use std::collections::HashMap;

pub(crate) enum HashImpl {
    Sha1(Sha1),
    Sha256(Sha256),
    #[cfg(test)]
    Copy(Vec<u8>),
}

impl HashImpl {
    pub fn from_algo(algo: HashAlgo) -> Self {
        match algo {
            HashAlgo::RsaSha1 => Self::Sha1(Sha1::new()),
            HashAlgo::RsaSha256 | HashAlgo::Ed25519Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    #[cfg(test)]
    pub fn copy_data() -> Self {
        Self::Copy(vec![])
    }

    pub fn hash(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(bytes),
            Self::Sha256(h) => h.update(bytes),
            #[cfg(test)]
            Self::Copy(data) => data.extend_from_slice(bytes),
        }
    }

    pub fn finalize(self) -> String {
        match self {
            Self::Sha1(h) => general_purpose::STANDARD.encode(h.finalize()),
            Self::Sha256(h) => general_purpose::STANDARD.encode(h.finalize()),
            #[cfg(test)]
            Self::Copy(data) => String::from_utf8_lossy(&data).into(),
        }
    }

    pub fn finalize_bytes(self) -> Vec<u8> {
        match self {
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            #[cfg(test)]
            Self::Copy(data) => data,
        }
    }
}

/// A hasher that stops accumulating once `limit` bytes have been fed,
/// implementing the AMS `l=` body-length truncation.
pub(crate) struct LimitHasher {
    limit: usize,
    hashed: usize,
    hasher: HashImpl,
}

impl LimitHasher {
    pub fn new(hasher: HashImpl, limit: usize) -> Self {
        Self {
            hasher,
            limit,
            hashed: 0,
        }
    }

    pub fn hash(&mut self, bytes: &[u8]) {
        let remain = self.limit - self.hashed;
        let len = bytes.len().min(remain);
        self.hasher.hash(&bytes[..len]);
        self.hashed += len;
    }

    pub fn finalize(self) -> String {
        self.hasher.finalize()
    }

    #[cfg(test)]
    pub fn finalize_bytes(self) -> Vec<u8> {
        self.hasher.finalize_bytes()
    }
}

/// Computes the base64 body digest for an AMS, honoring an optional `l=`
/// truncation length.
pub(crate) fn compute_body_hash(
    canonicalization: CanonType,
    length: Option<&str>,
    hash_algo: HashAlgo,
    body: &[u8],
) -> Result<String, ArcError> {
    let limit = match length {
        Some(length) => length
            .parse::<usize>()
            .map_err(|err| ArcError::SyntaxError(format!("invalid l= value: {err}")))?,
        None => usize::MAX,
    };

    let mut hasher = LimitHasher::new(HashImpl::from_algo(hash_algo), limit);
    canonicalization.canon_body(body, &mut hasher);
    Ok(hasher.finalize())
}

/// Selects, for each name in an `h=` list, the oldest not-yet-consumed
/// header occurrence with that name (case-insensitive), marking it
/// consumed for `instance` as it goes. Missing names contribute nothing;
/// repeated names in `h=` consume successively older occurrences.
pub(crate) fn select_headers<'a>(
    h_list: &str,
    headers: &'a mut [HeaderField],
    instance: u8,
) -> Vec<(String, &'a str)> {
    let num_headers = headers.len();
    let mut last_index: HashMap<String, usize> = HashMap::new();
    let mut selected_index = Vec::new();

    'outer: for name in h_list.split(':').map(|h| h.trim().to_ascii_lowercase()) {
        let floor = *last_index.get(&name).unwrap_or(&num_headers);
        for header_index in (0..floor).rev() {
            if headers[header_index].name.eq_ignore_ascii_case(&name) {
                selected_index.push(header_index);
                last_index.insert(name, header_index);
                continue 'outer;
            }
        }
        last_index.insert(name, 0);
    }

    let mut out = Vec::with_capacity(selected_index.len());
    for idx in selected_index {
        headers[idx].signed_by.insert(instance);
        out.push((headers[idx].name.clone(), headers[idx].value_raw.as_str()));
    }
    out
}

/// Computes the finalized digest of the headers named by an AMS's `h=`
/// list plus the AMS header itself with its `b=` value erased and no
/// trailing CRLF, per RFC 6376 section 3.7 as reused by RFC 8617 section
/// 4.1.3.
pub(crate) fn compute_ams_headers_hash(
    canonicalization: CanonType,
    h_list: &str,
    hash_algo: HashAlgo,
    ams_raw: &str,
    ams_b_tag: &str,
    headers: &mut [HeaderField],
    instance: u8,
) -> Result<Vec<u8>, ArcError> {
    let mut input = Vec::new();
    let mut hasher = HashImpl::from_algo(hash_algo);

    for (key, value) in select_headers(h_list, headers, instance) {
        canonicalization.canon_header_into(&key, value.as_bytes(), &mut input);
    }

    {
        let value = ams_raw.replacen(ams_b_tag, "b=", 1);
        let mut canonicalized = Vec::new();
        canonicalization.canon_header_into(
            crate::tables::ARC_MESSAGE_SIGNATURE,
            value.as_bytes(),
            &mut canonicalized,
        );
        canonicalized.truncate(canonicalized.len() - 2);
        input.extend_from_slice(&canonicalized);
    }

    tracing::debug!(bytes = input.len(), "hashing AMS header set");
    hasher.hash(&input);
    Ok(hasher.finalize_bytes())
}

/// A single existing ARC set's three header fields, in the order they are
/// fed into the seal hash: AAR, AMS, AS.
pub struct SealSetInput<'a> {
    pub aar_raw: &'a str,
    pub ams_raw: &'a str,
    pub as_raw: &'a str,
}

/// Computes the relaxed-canonicalized seal digest over AAR(1)..AS(N),
/// with the newest AS's `b=` value erased, per RFC 8617 section 4.2.1.
pub(crate) fn compute_seal_hash(
    hash_algo: HashAlgo,
    sets: &[SealSetInput<'_>],
    newest_as_b_tag: &str,
) -> Vec<u8> {
    let mut input = Vec::new();
    let mut hasher = HashImpl::from_algo(hash_algo);

    for (idx, set) in sets.iter().enumerate() {
        canon::Type::Relaxed.canon_header_into(
            crate::tables::ARC_AUTHENTICATION_RESULTS,
            set.aar_raw.as_bytes(),
            &mut input,
        );
        canon::Type::Relaxed.canon_header_into(
            crate::tables::ARC_MESSAGE_SIGNATURE,
            set.ams_raw.as_bytes(),
            &mut input,
        );

        let is_newest = idx == sets.len() - 1;
        if is_newest {
            let value = set.as_raw.replacen(newest_as_b_tag, "b=", 1);
            let mut canonicalized = Vec::new();
            canon::Type::Relaxed.canon_header_into(ARC_SEAL, value.as_bytes(), &mut canonicalized);
            canonicalized.truncate(canonicalized.len() - 2);
            input.extend_from_slice(&canonicalized);
        } else {
            canon::Type::Relaxed.canon_header_into(ARC_SEAL, set.as_raw.as_bytes(), &mut input);
        }
    }

    hasher.hash(&input);
    hasher.finalize_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, value: &str) -> HeaderField {
        HeaderField::new(name.to_string(), value.to_string())
    }

    #[test]
    fn test_select_headers_duplicates_newest_first() {
        let mut headers = vec![
            field("from", "biz"),
            field("foo", "bar"),
            field("from", "baz"),
            field("subject", "boring"),
        ];
        let selected = select_headers("from:subject:to:from", &mut headers, 1);
        assert_eq!(
            selected,
            vec![
                ("from".to_owned(), "baz"),
                ("subject".to_owned(), "boring"),
                ("from".to_owned(), "biz"),
            ]
        );
    }

    #[test]
    fn test_select_headers_missing_name_is_skipped() {
        let mut headers = vec![field("from", "biz"), field("subject", "boring")];
        let selected = select_headers("from:subject:to", &mut headers, 1);
        assert_eq!(
            selected,
            vec![("from".to_owned(), "biz"), ("subject".to_owned(), "boring")]
        );
    }

    #[test]
    fn test_compute_body_hash_length_truncation() {
        let body = b"0123456789ABCDEF\r\n";
        let full = compute_body_hash(CanonType::Simple, None, HashAlgo::RsaSha256, body).unwrap();
        let truncated =
            compute_body_hash(CanonType::Simple, Some("10"), HashAlgo::RsaSha256, body).unwrap();
        assert_ne!(full, truncated);
    }
}
