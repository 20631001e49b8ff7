//! Raw header-field storage plus the AAR/AMS/AS wrappers built over
//! [`TagValueSet`], and the line-wrapping serializer used when generating
//! a new set.

use crate::tables::{self, Kind};
use crate::tagvalue::TagValueSet;
use crate::ArcError;
use std::collections::HashSet;

/// One header field as it arrived over the streaming intake API: a name
/// and its raw (unfolded-at-the-colon, still FWS-bearing) value. Never
/// holds pointers into caller buffers, only owned copies, so a message
/// can outlive the buffers the caller fed it through.
#[derive(Debug, Clone)]
pub struct HeaderField {
    pub name: String,
    pub value_raw: String,
    /// ARC instances whose `h=` list has already consumed this
    /// occurrence, for diagnostics; does not gate selection.
    pub signed_by: HashSet<u8>,
}

impl HeaderField {
    pub fn new(name: String, value_raw: String) -> Self {
        Self {
            name,
            value_raw,
            signed_by: HashSet::new(),
        }
    }

    /// Splits a raw `Name: value` header line (no trailing CRLF) into a
    /// [`HeaderField`]. Lines without a colon are treated as having an
    /// empty name, matching permissive real-world intake.
    pub fn from_line(line: &str) -> Self {
        match line.split_once(':') {
            Some((name, value)) => Self::new(name.to_owned(), value.to_owned()),
            None => Self::new(String::new(), line.to_owned()),
        }
    }

    pub fn raw(&self) -> String {
        format!("{}:{}", self.name, self.value_raw)
    }
}

/// A parsed ARC-Authentication-Results field. Only the leading `i=` tag
/// is structured; everything after it is opaque `authres` text that the
/// chain engine re-canonicalizes verbatim but never parses or validates.
#[derive(Debug)]
pub struct AuthResults {
    pub instance: u8,
    pub value: String,
}

impl AuthResults {
    pub fn parse(value: &str) -> Result<Self, ArcError> {
        let rest = value.trim_start();
        let rest = rest
            .strip_prefix('i')
            .ok_or_else(|| ArcError::SyntaxError("AR value does not start with i=".into()))?
            .trim_start();
        let rest = rest
            .strip_prefix('=')
            .ok_or_else(|| ArcError::SyntaxError("AR value does not start with i=".into()))?
            .trim_start();

        let digit_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digit_end == 0 {
            return Err(ArcError::InvalidArcInstance);
        }
        let instance = parse_instance(&rest[..digit_end])?;

        Ok(Self {
            instance,
            value: value.to_owned(),
        })
    }
}

/// A parsed ARC-Message-Signature field.
#[derive(Debug)]
pub struct MessageSignature {
    pub instance: u8,
    pub value: String,
    pub tags: TagValueSet,
}

impl MessageSignature {
    pub fn parse(value: &str) -> Result<Self, ArcError> {
        let tags = TagValueSet::parse(value, Kind::Signature)?;
        let instance = parse_instance(tags.get_required("i")?)?;

        if let Some(h) = tags.get("h") {
            if h.split(':').any(|n| n.eq_ignore_ascii_case(tables::ARC_SEAL)) {
                return Err(ArcError::SignsOwnSeal);
            }
        }

        Ok(Self {
            instance,
            value: value.to_owned(),
            tags,
        })
    }
}

/// A parsed ARC-Seal field. `h=` is a hard error here, per the redesigned
/// behavior: the reference grammar silently tolerates it, but a seal
/// that names signed headers is malformed beyond repair, not merely
/// suspect.
#[derive(Debug)]
pub struct Seal {
    pub instance: u8,
    pub value: String,
    pub tags: TagValueSet,
}

impl Seal {
    pub fn parse(value: &str) -> Result<Self, ArcError> {
        let tags = TagValueSet::parse(value, Kind::Seal)?;
        let instance = parse_instance(tags.get_required("i")?)?;

        if tags.get("h").is_some() {
            return Err(ArcError::SealHasHeaderList);
        }

        Ok(Self {
            instance,
            value: value.to_owned(),
            tags,
        })
    }
}

fn parse_instance(value: &str) -> Result<u8, ArcError> {
    let n: u32 = value.parse().map_err(|_| ArcError::InvalidArcInstance)?;
    if n == 0 || n > tables::MAX_ARC_INSTANCE as u32 {
        return Err(ArcError::InvalidArcInstance);
    }
    Ok(n as u8)
}

/// Wraps a fully-built `Name: tag=value; tag=value` header at `margin`
/// columns, always starting `b=`/`h=` on a fresh continuation line so a
/// later signature splice never has to re-wrap. `margin` of 0 disables
/// wrapping entirely.
pub fn wrap(name: &str, body: &str, margin: usize) -> String {
    if margin == 0 {
        return format!("{name}: {body}");
    }

    let mut out = format!("{name}: ");
    let mut col = out.len();

    for (idx, part) in body.split(';').enumerate() {
        let part = part.trim();

        let starts_fresh = part.starts_with("b=") || part.starts_with("h=");
        if idx > 0 {
            out.push(';');
            col += 1;
        }

        if idx > 0 && (starts_fresh || col + part.len() + 1 > margin) {
            out.push_str("\r\n\t");
            col = 1;
            out.push_str(part);
            col += part.len();
        } else {
            if idx > 0 {
                out.push(' ');
                col += 1;
            }
            out.push_str(part);
            col += part.len();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_field_from_line() {
        let h = HeaderField::from_line("From: a@example.com");
        assert_eq!(h.name, "From");
        assert_eq!(h.value_raw, " a@example.com");
    }

    #[test]
    fn test_auth_results_parses_opaque_tail() {
        let ar = AuthResults::parse("i=1; mx.example.org; arc=none").unwrap();
        assert_eq!(ar.instance, 1);
        assert_eq!(ar.value, "i=1; mx.example.org; arc=none");
    }

    #[test]
    fn test_auth_results_requires_leading_instance() {
        let err = AuthResults::parse("mx.example.org; arc=none").unwrap_err();
        assert!(matches!(err, ArcError::SyntaxError(_)));
    }

    #[test]
    fn test_wrap_keeps_short_header_on_one_line() {
        let wrapped = wrap(tables::ARC_SEAL, "i=1; a=rsa-sha256; cv=none", 78);
        assert!(!wrapped.contains("\r\n"));
    }

    #[test]
    fn test_wrap_always_breaks_before_b_and_h() {
        let wrapped = wrap(
            tables::ARC_MESSAGE_SIGNATURE,
            "i=1; a=rsa-sha256; d=example.com; h=from:to; b=shortvalue",
            20,
        );
        let h_line = wrapped
            .lines()
            .find(|l| l.trim_start().starts_with("h="))
            .unwrap();
        assert!(h_line.trim_start().starts_with("h="));
        let b_line = wrapped
            .lines()
            .find(|l| l.trim_start().starts_with("b="))
            .unwrap();
        assert!(b_line.trim_start().starts_with("b="));
    }

    #[test]
    fn test_wrap_zero_margin_disables_wrapping() {
        let wrapped = wrap(tables::ARC_SEAL, "i=1; a=rsa-sha256; cv=none", 0);
        assert_eq!(wrapped, "ARC-Seal: i=1; a=rsa-sha256; cv=none");
    }

    #[test]
    fn test_seal_rejects_header_list() {
        let err = Seal::parse(
            "i=1; a=rsa-sha256; cv=none; d=example.com; s=sel; t=1; b=AA; h=from",
        )
        .unwrap_err();
        assert_eq!(err, ArcError::SealHasHeaderList);
    }

    #[test]
    fn test_signature_rejects_signing_own_seal() {
        let err = MessageSignature::parse(
            "i=1; a=rsa-sha256; b=AA; bh=AA; d=example.com; h=from:arc-seal; s=sel",
        )
        .unwrap_err();
        assert_eq!(err, ArcError::SignsOwnSeal);
    }
}
