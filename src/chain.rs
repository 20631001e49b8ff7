//! The chain engine: streaming intake of a message's headers and body,
//! assembly of its ARC sets at end-of-headers, and chain validation (or
//! generation of the next set) at end-of-message.

use crate::canon;
use crate::config::ArcLib;
use crate::crypto::{self, PublicKey};
use crate::hash::{self, SealSetInput};
use crate::header::{AuthResults, HeaderField, MessageSignature, Seal};
use crate::tables::{self, ChainStatus};
use crate::ArcError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sign,
    Verify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Init,
    Header,
    Eoh,
    Body,
    Eom,
    Unusable,
}

/// The three header indices making up one ARC instance.
#[derive(Debug, Clone, Copy)]
pub struct ArcSet {
    pub aar: usize,
    pub ams: usize,
    pub seal: usize,
}

/// A single message's worth of streaming ARC state. Not `Sync`: only one
/// caller should be driving a given message's lifecycle at a time.
pub struct ArcMessage<'lib> {
    lib: &'lib ArcLib,
    mode: Mode,
    state: MessageState,
    headers: Vec<HeaderField>,
    body: tables::GrowableBuffer,
    aar_list: Vec<AuthResults>,
    ams_list: Vec<MessageSignature>,
    seal_list: Vec<Seal>,
    arc_sets: BTreeMap<u8, ArcSet>,
    chain_status: ChainStatus,
    oldest_pass: i32,
    infail: bool,
    last_error: Option<ArcError>,
}

impl<'lib> ArcMessage<'lib> {
    pub(crate) fn new(lib: &'lib ArcLib, mode: Mode) -> Self {
        Self {
            lib,
            mode,
            state: MessageState::Init,
            headers: Vec::new(),
            body: tables::GrowableBuffer::new(lib.max_body_bytes()),
            aar_list: Vec::new(),
            ams_list: Vec::new(),
            seal_list: Vec::new(),
            arc_sets: BTreeMap::new(),
            chain_status: ChainStatus::Unknown,
            oldest_pass: -1,
            infail: false,
            last_error: None,
        }
    }

    pub fn chain_status(&self) -> ChainStatus {
        self.chain_status
    }

    pub fn oldest_pass(&self) -> i32 {
        self.oldest_pass
    }

    fn fail(&mut self, err: ArcError) -> ArcError {
        self.state = MessageState::Unusable;
        self.infail = true;
        self.last_error = Some(err.clone());
        err
    }

    fn check_usable(&self) -> Result<(), ArcError> {
        if self.infail {
            return Err(ArcError::Unusable);
        }
        Ok(())
    }

    /// Feeds one raw `Name: value` header line (no trailing CRLF).
    pub fn header_field(&mut self, name: &str, value: &str) -> Result<(), ArcError> {
        self.check_usable()?;
        if !matches!(self.state, MessageState::Init | MessageState::Header) {
            return Err(self.fail(ArcError::OutOfOrder("header_field called after eoh")));
        }
        self.state = MessageState::Header;
        if name.len() + value.len() > self.lib.max_header_bytes() {
            return Err(self.fail(ArcError::ResourceExhausted(
                "header field exceeds the configured maximum size",
            )));
        }
        let value = if self.lib.fix_crlf() {
            String::from_utf8_lossy(&tables::fix_crlf(value.as_bytes())).into_owned()
        } else {
            value.to_owned()
        };
        self.headers.push(HeaderField::new(name.to_owned(), value));
        Ok(())
    }

    /// Signals that all header fields have been fed, and assembles the
    /// chain's ARC sets from them.
    pub fn eoh(&mut self) -> Result<(), ArcError> {
        self.check_usable()?;
        if !matches!(self.state, MessageState::Init | MessageState::Header) {
            return Err(self.fail(ArcError::OutOfOrder("eoh called twice")));
        }

        for idx in 0..self.headers.len() {
            let name = self.headers[idx].name.trim().to_owned();
            let value = self.headers[idx].value_raw.trim().to_owned();
            if name.eq_ignore_ascii_case(tables::ARC_AUTHENTICATION_RESULTS) {
                let parsed = AuthResults::parse(&value).map_err(|err| self.fail(err))?;
                self.aar_list.push(parsed);
            } else if name.eq_ignore_ascii_case(tables::ARC_MESSAGE_SIGNATURE) {
                let parsed = MessageSignature::parse(&value).map_err(|err| self.fail(err))?;
                self.ams_list.push(parsed);
            } else if name.eq_ignore_ascii_case(tables::ARC_SEAL) {
                let parsed = Seal::parse(&value).map_err(|err| self.fail(err))?;
                self.seal_list.push(parsed);
            }
        }

        if self.seal_list.len() > tables::MAX_ARC_INSTANCE as usize {
            return Err(self.fail(ArcError::TooManyArcInstances(self.seal_list.len() as u8)));
        }

        let mut by_instance: BTreeMap<u8, (Option<usize>, Option<usize>, Option<usize>)> =
            BTreeMap::new();

        for idx in 0..self.aar_list.len() {
            let instance = self.aar_list[idx].instance;
            let entry = by_instance.entry(instance).or_default();
            if entry.0.is_some() {
                return Err(self.fail(ArcError::DuplicateArcInstance(instance)));
            }
            entry.0 = Some(idx);
        }
        for idx in 0..self.ams_list.len() {
            let instance = self.ams_list[idx].instance;
            let entry = by_instance.entry(instance).or_default();
            if entry.1.is_some() {
                return Err(self.fail(ArcError::DuplicateArcInstance(instance)));
            }
            entry.1 = Some(idx);
        }
        for idx in 0..self.seal_list.len() {
            let instance = self.seal_list[idx].instance;
            let entry = by_instance.entry(instance).or_default();
            if entry.2.is_some() {
                return Err(self.fail(ArcError::DuplicateArcInstance(instance)));
            }
            entry.2 = Some(idx);
        }

        if by_instance.is_empty() {
            self.state = MessageState::Eoh;
            return Ok(());
        }

        let max_instance = *by_instance.keys().next_back().unwrap();
        for expected in 1..=max_instance {
            match by_instance.get(&expected) {
                Some((Some(aar), Some(ams), Some(seal))) => {
                    self.arc_sets.insert(
                        expected,
                        ArcSet {
                            aar: *aar,
                            ams: *ams,
                            seal: *seal,
                        },
                    );
                }
                Some(_) => return Err(self.fail(ArcError::MissingArcInstance(expected))),
                None => return Err(self.fail(ArcError::MissingArcInstance(expected))),
            }
        }

        self.state = MessageState::Eoh;
        Ok(())
    }

    /// Feeds one chunk of raw, unterminated-CRLF-normalized body bytes.
    pub fn body(&mut self, chunk: &[u8]) -> Result<(), ArcError> {
        self.check_usable()?;
        if !matches!(self.state, MessageState::Eoh | MessageState::Body) {
            return Err(self.fail(ArcError::OutOfOrder("body called before eoh")));
        }
        self.state = MessageState::Body;
        if self.lib.fix_crlf() {
            let fixed = tables::fix_crlf(chunk);
            self.body.push(&fixed).map_err(|err| self.fail(err))?;
        } else {
            self.body.push(chunk).map_err(|err| self.fail(err))?;
        }
        Ok(())
    }

    fn newest_instance(&self) -> u8 {
        self.arc_sets.keys().next_back().copied().unwrap_or(0)
    }

    /// Signals end-of-message and runs the chain validation algorithm
    /// against whatever ARC sets were found at [`ArcMessage::eoh`]. In
    /// both modes this determines the verdict that a subsequent
    /// [`ArcMessage::seal`] call will assert as its `cv=` tag; in verify
    /// mode it is also the value the caller reports.
    pub async fn eom(&mut self) -> Result<ChainStatus, ArcError> {
        self.check_usable()?;
        if !matches!(self.state, MessageState::Eoh | MessageState::Body) {
            return Err(self.fail(ArcError::OutOfOrder("eom called before eoh")));
        }
        self.state = MessageState::Eom;

        if self.arc_sets.is_empty() {
            self.chain_status = ChainStatus::None;
            return Ok(self.chain_status);
        }

        let n = self.newest_instance();
        match self.validate_chain(n).await {
            Ok(status) => {
                self.chain_status = status;
                Ok(status)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn validate_chain(&mut self, n: u8) -> Result<ChainStatus, ArcError> {
        let set1 = &self.seal_list[self.arc_sets[&1].seal];
        if set1.tags.get("cv") != Some("none") {
            tracing::debug!("instance 1 cv is not none, chain invalid");
            return Ok(ChainStatus::Fail);
        }

        let mut saw_cv_invalid = false;
        let mut ams_ok = Vec::with_capacity(n as usize);
        let mut seal_ok = Vec::with_capacity(n as usize);

        for i in 1..=n {
            let set = self.arc_sets[&i];
            let seal = &self.seal_list[set.seal];
            if i > 1 && seal.tags.get("cv") != Some("pass") {
                tracing::debug!(instance = i, "cv is not pass, chain invalid");
                saw_cv_invalid = true;
            }

            seal_ok.push(self.verify_seal(i).await?);
            ams_ok.push(self.verify_ams(i).await?);
        }

        self.oldest_pass = compute_oldest_pass(&ams_ok);

        if saw_cv_invalid || seal_ok.iter().any(|ok| !ok) || ams_ok.iter().any(|ok| !ok) {
            Ok(ChainStatus::Fail)
        } else {
            Ok(ChainStatus::Pass)
        }
    }

    async fn verify_seal(&self, instance: u8) -> Result<bool, ArcError> {
        let set = self.arc_sets[&instance];
        let hash_algo = {
            let seal = &self.seal_list[set.seal];
            tables::HashAlgo::parse(seal.tags.get_required("a")?)?
        };

        let keys = self
            .retrieve_keys(set.seal, &self.seal_list[set.seal], hash_algo)
            .await?;

        let mut inputs = Vec::with_capacity(instance as usize);
        for i in 1..=instance {
            let s = self.arc_sets[&i];
            inputs.push((self.aar_list[s.aar].value.clone(), self.ams_list[s.ams].value.clone(), self.seal_list[s.seal].value.clone()));
        }
        let sets: Vec<SealSetInput<'_>> = inputs
            .iter()
            .map(|(aar, ams, seal)| SealSetInput {
                aar_raw: aar.as_str(),
                ams_raw: ams.as_str(),
                as_raw: seal.as_str(),
            })
            .collect();

        let seal = &self.seal_list[set.seal];
        let b_tag = format!("b={}", seal.tags.get_required("b")?);
        let digest = hash::compute_seal_hash(hash_algo, &sets, &b_tag);

        let signature = base64_decode(seal.tags.get_required("b")?)?;
        for key in &keys {
            if crypto::verify_signature(hash_algo, &digest, &signature, key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn verify_ams(&mut self, instance: u8) -> Result<bool, ArcError> {
        let set = self.arc_sets[&instance];
        let (hash_algo, canon_pair, h_list, bh, b, length) = {
            let ams = &self.ams_list[set.ams];
            (
                tables::HashAlgo::parse(ams.tags.get_required("a")?)?,
                canon::parse_pair(ams.tags.get("c"))?,
                ams.tags.get_required("h")?.to_owned(),
                ams.tags.get_required("bh")?.to_owned(),
                ams.tags.get_required("b")?.to_owned(),
                ams.tags.get("l").map(|s| s.to_owned()),
            )
        };

        let computed_bh = hash::compute_body_hash(
            canon_pair.1,
            length.as_deref(),
            hash_algo,
            self.body.as_slice(),
        )?;
        if computed_bh != bh {
            return Ok(false);
        }

        let keys = self
            .retrieve_keys_signature(set.ams, hash_algo)
            .await?;

        let ams_value = self.ams_list[set.ams].value.clone();
        let b_tag = format!("b={b}");
        let digest = hash::compute_ams_headers_hash(
            canon_pair.0,
            &h_list,
            hash_algo,
            &ams_value,
            &b_tag,
            &mut self.headers,
            instance,
        )?;

        let signature = base64_decode(&b)?;
        for key in &keys {
            if crypto::verify_signature(hash_algo, &digest, &signature, key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn retrieve_keys(
        &self,
        _seal_idx: usize,
        seal: &Seal,
        hash_algo: tables::HashAlgo,
    ) -> Result<Vec<PublicKey>, ArcError> {
        crypto::retrieve_public_keys(
            self.lib.resolver(),
            seal.tags.get_required("d")?,
            seal.tags.get_required("s")?,
            self.lib.min_key_bits(),
            hash_algo,
        )
        .await
    }

    async fn retrieve_keys_signature(
        &self,
        ams_idx: usize,
        hash_algo: tables::HashAlgo,
    ) -> Result<Vec<PublicKey>, ArcError> {
        let ams = &self.ams_list[ams_idx];
        crypto::retrieve_public_keys(
            self.lib.resolver(),
            ams.tags.get_required("d")?,
            ams.tags.get_required("s")?,
            self.lib.min_key_bits(),
            hash_algo,
        )
        .await
    }

    pub(crate) fn headers(&self) -> &[HeaderField] {
        &self.headers
    }

    pub(crate) fn headers_mut(&mut self) -> &mut [HeaderField] {
        &mut self.headers
    }

    pub(crate) fn body_bytes(&self) -> &[u8] {
        self.body.as_slice()
    }

    pub(crate) fn arc_sets(&self) -> &BTreeMap<u8, ArcSet> {
        &self.arc_sets
    }

    pub(crate) fn aar_list(&self) -> &[AuthResults] {
        &self.aar_list
    }

    pub(crate) fn ams_list(&self) -> &[MessageSignature] {
        &self.ams_list
    }

    pub(crate) fn seal_list(&self) -> &[Seal] {
        &self.seal_list
    }

    pub(crate) fn lib(&self) -> &ArcLib {
        self.lib
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn last_error(&self) -> Option<&ArcError> {
        self.last_error.as_ref()
    }
}

fn base64_decode(value: &str) -> Result<Vec<u8>, ArcError> {
    use base64::engine::general_purpose;
    use base64::Engine;
    general_purpose::STANDARD
        .decode(value)
        .map_err(|_| ArcError::MalformedSignature)
}

/// Scans instances `1..N` (excluding the newest, whose own validity is
/// already reflected in the overall verdict) from newest to oldest for
/// the first AMS that failed to verify, and returns the instance number
/// one newer than it -- the oldest instance for which the chain below it
/// is still known good. Stays 0 if every instance passed, mirroring
/// `arc_oldest_pass`'s calloc'd-zero default. Returns -1 if there is
/// nothing to evaluate.
fn compute_oldest_pass(ams_ok: &[bool]) -> i32 {
    if ams_ok.is_empty() {
        return -1;
    }
    let n = ams_ok.len();
    let mut oldest_pass = 0;
    for idx in (0..n.saturating_sub(1)).rev() {
        if !ams_ok[idx] {
            oldest_pass = (idx + 2) as i32;
            break;
        }
    }
    oldest_pass
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_oldest_pass_all_good() {
        assert_eq!(compute_oldest_pass(&[true, true, true]), 0);
    }

    #[test]
    fn test_compute_oldest_pass_single_instance() {
        assert_eq!(compute_oldest_pass(&[true]), 0);
    }

    #[test]
    fn test_compute_oldest_pass_empty() {
        assert_eq!(compute_oldest_pass(&[]), -1);
    }

    #[test]
    fn test_compute_oldest_pass_failure_in_middle() {
        assert_eq!(compute_oldest_pass(&[true, false, true]), 2);
    }

    #[test]
    fn test_fix_crlf_flag_normalizes_header_and_body_intake() {
        use crate::config::{ArcLib, LibFlags};
        use crate::resolver::TestResolver;
        use std::sync::Arc;

        let lib = ArcLib::builder(Arc::new(TestResolver::default()))
            .with_flags(LibFlags::FIX_CRLF)
            .build();
        let mut msg = lib.new_message(Mode::Sign);
        msg.header_field("Subject", " line1\nline2").unwrap();
        msg.eoh().unwrap();
        msg.body(b"body\n").unwrap();

        assert_eq!(msg.headers()[0].value_raw, " line1\r\nline2");
        assert_eq!(msg.body_bytes(), b"body\r\n");
    }

    #[test]
    fn test_without_fix_crlf_flag_intake_is_unmodified() {
        use crate::config::ArcLib;
        use crate::resolver::TestResolver;
        use std::sync::Arc;

        let lib = ArcLib::builder(Arc::new(TestResolver::default())).build();
        let mut msg = lib.new_message(Mode::Sign);
        msg.header_field("Subject", " line1\nline2").unwrap();
        msg.eoh().unwrap();
        msg.body(b"body\n").unwrap();

        assert_eq!(msg.headers()[0].value_raw, " line1\nline2");
        assert_eq!(msg.body_bytes(), b"body\n");
    }
}
