//! Seal generation: builds the next ARC set (AAR, AMS, AS) for a message
//! that has already run through [`crate::chain::ArcMessage::eom`].

use crate::canon::Type as CanonType;
use crate::chain::{ArcMessage, Mode};
use crate::crypto::Signer;
use crate::hash::{self, SealSetInput};
use crate::header;
use crate::tables::{self, ChainStatus, HashAlgo};
use crate::ArcError;
use base64::engine::general_purpose;
use base64::Engine;

/// Parameters for the next ARC set, everything the signer must supply
/// that isn't already implied by the message's existing chain state or
/// the library's configured signing pattern (see
/// [`crate::config::ArcLibBuilder::with_sign_headers`]).
pub struct SealParams<'a> {
    pub domain: &'a str,
    pub selector: &'a str,
    pub hash_algo: HashAlgo,
    pub header_canon: CanonType,
    pub body_canon: CanonType,
    /// The raw `arc.*` authentication-result payload to embed in the new
    /// AAR, e.g. `"mx.example.com; arc=pass"`. Computing this payload
    /// from SPF/DKIM/DMARC input is outside this engine's scope.
    pub authserv_value: &'a str,
}

/// The three newly generated header lines, in emission order.
pub struct GeneratedSet {
    pub aar: String,
    pub ams: String,
    pub seal: String,
}

impl<'lib> ArcMessage<'lib> {
    /// Generates the next ARC set. Requires [`ArcMessage::eom`] to have
    /// already run (so the chain's `cv` verdict is known) and the
    /// message to have been created with [`Mode::Sign`].
    pub fn seal(
        &mut self,
        signer: &dyn Signer,
        params: &SealParams<'_>,
    ) -> Result<GeneratedSet, ArcError> {
        if self.mode() != Mode::Sign {
            return Err(ArcError::OutOfOrder("seal called on a verify-mode message"));
        }

        let next_instance = self.arc_sets().keys().next_back().map_or(1, |n| n + 1);
        if next_instance > tables::MAX_ARC_INSTANCE {
            return Err(ArcError::TooManyArcInstances(next_instance));
        }

        let cv = if next_instance == 1 {
            "none"
        } else {
            match self.chain_status() {
                ChainStatus::Pass => "pass",
                ChainStatus::Fail => "fail",
                ChainStatus::None | ChainStatus::Unknown => "fail",
            }
        };

        let margin = self.lib().margin();
        let now = self.lib().now();

        let aar_body = format!("i={next_instance}; {authserv}", authserv = params.authserv_value);
        let aar = header::wrap(tables::ARC_AUTHENTICATION_RESULTS, &aar_body, margin);
        let aar_value = aar_body.clone();

        let ams = self.generate_ams(signer, params, next_instance, margin, now)?;
        let seal = self.generate_seal(signer, params, next_instance, cv, margin, now, &aar_value, &ams.1)?;

        Ok(GeneratedSet {
            aar,
            ams: ams.0,
            seal: seal.0,
        })
    }

    /// Builds the AMS `h=` list from the library's configured sign
    /// pattern (each matching header named once per observed occurrence)
    /// plus the oversign list, appended so those names are always
    /// present even when the message carries no such header.
    fn signing_header_list(&self) -> String {
        let sign_headers = self.lib().sign_headers();
        let oversign_headers = self.lib().oversign_headers();

        let mut names: Vec<String> = self
            .headers()
            .iter()
            .filter(|h| sign_headers.contains(&h.name))
            .map(|h| h.name.to_ascii_lowercase())
            .collect();
        names.extend(oversign_headers.iter().map(str::to_owned));
        names.join(":")
    }

    fn generate_ams(
        &self,
        signer: &dyn Signer,
        params: &SealParams<'_>,
        instance: u8,
        margin: usize,
        now: i64,
    ) -> Result<(String, String), ArcError> {
        let h_list = self.signing_header_list();
        let bh = hash::compute_body_hash(
            params.body_canon,
            None,
            params.hash_algo,
            self.body_bytes(),
        )?;

        let template = format!(
            "i={instance}; a={alg}; c={hc}/{bc}; d={domain}; s={selector}; t={time}; h={h_list}; bh={bh}; b=",
            alg = params.hash_algo.name(),
            hc = params.header_canon.name(),
            bc = params.body_canon.name(),
            domain = params.domain,
            selector = params.selector,
            time = now,
        );

        let mut headers_copy: Vec<crate::header::HeaderField> = self.headers().to_vec();
        let digest = hash::compute_ams_headers_hash(
            params.header_canon,
            &h_list,
            params.hash_algo,
            &template,
            "b=",
            &mut headers_copy,
            instance,
        )?;

        let signature = signer.sign(params.hash_algo, &digest)?;
        let b = general_purpose::STANDARD.encode(signature);
        let value = template.replacen("b=", &format!("b={b}"), 1);

        Ok((
            header::wrap(tables::ARC_MESSAGE_SIGNATURE, &value, margin),
            value,
        ))
    }

    fn generate_seal(
        &self,
        signer: &dyn Signer,
        params: &SealParams<'_>,
        instance: u8,
        cv: &str,
        margin: usize,
        now: i64,
        aar_value: &str,
        ams_value: &str,
    ) -> Result<(String, String), ArcError> {
        let template = format!(
            "i={instance}; a={alg}; cv={cv}; d={domain}; s={selector}; t={time}; b=",
            alg = params.hash_algo.name(),
            domain = params.domain,
            selector = params.selector,
            time = now,
        );

        // A `cv=fail` seal hashes only the set it is newly sealing: once the
        // chain is broken there is nothing trustworthy left in the prior
        // sets to fold in.
        let mut inputs = Vec::with_capacity(instance as usize);
        if cv != "fail" {
            for i in 1..instance {
                let set = self.arc_sets()[&i];
                inputs.push((
                    self.aar_list()[set.aar].value.clone(),
                    self.ams_list()[set.ams].value.clone(),
                    self.seal_list()[set.seal].value.clone(),
                ));
            }
        }
        inputs.push((aar_value.to_owned(), ams_value.to_owned(), template.clone()));

        let sets: Vec<SealSetInput<'_>> = inputs
            .iter()
            .map(|(aar, ams, seal)| SealSetInput {
                aar_raw: aar.as_str(),
                ams_raw: ams.as_str(),
                as_raw: seal.as_str(),
            })
            .collect();

        let digest = hash::compute_seal_hash(params.hash_algo, &sets, "b=");
        let signature = signer.sign(params.hash_algo, &digest)?;
        let b = general_purpose::STANDARD.encode(signature);
        let value = template.replacen("b=", &format!("b={b}"), 1);

        Ok((header::wrap(tables::ARC_SEAL, &value, margin), value))
    }
}
