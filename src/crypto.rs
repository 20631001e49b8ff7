//! Key material and the RSA/Ed25519 sign and verify primitives, plus DNS
//! key-record retrieval.

use crate::resolver::Resolver;
use crate::tables::{HashAlgo, KeyType, DNS_NAMESPACE};
use crate::tagvalue::TagValueSet;
use crate::{tables::Kind, ArcError};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;

#[derive(Debug)]
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    Ed25519(SigningKey),
}

impl PrivateKey {
    pub fn rsa_from_pem(data: &[u8]) -> Result<Self, ArcError> {
        let text = std::str::from_utf8(data)
            .map_err(|err| ArcError::Internal(format!("private key is not UTF-8: {err}")))?;
        RsaPrivateKey::from_pkcs1_pem(text)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(text))
            .map(Self::Rsa)
            .map_err(|err| ArcError::Internal(format!("failed to parse RSA private key: {err}")))
    }

    pub fn ed25519_from_pkcs8_pem(data: &[u8]) -> Result<Self, ArcError> {
        let text = std::str::from_utf8(data)
            .map_err(|err| ArcError::Internal(format!("private key is not UTF-8: {err}")))?;
        SigningKey::from_pkcs8_pem(text)
            .map(Self::Ed25519)
            .map_err(|err| {
                ArcError::Internal(format!("failed to parse Ed25519 private key: {err}"))
            })
    }
}

#[derive(Debug)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Ed25519(VerifyingKey),
}

impl PublicKey {
    /// Bit length used against a configured minimum, per RFC 8617
    /// section 4.3 step 3.
    pub fn bit_length(&self) -> usize {
        match self {
            Self::Rsa(key) => rsa::traits::PublicKeyParts::size(key) * 8,
            Self::Ed25519(_) => 256,
        }
    }
}

/// Signs `digest` and returns the raw signature bytes to be base64-encoded
/// into a `b=` tag.
pub trait Signer: Send + Sync {
    fn sign(&self, hash_algo: HashAlgo, digest: &[u8]) -> Result<Vec<u8>, ArcError>;
}

impl Signer for PrivateKey {
    fn sign(&self, hash_algo: HashAlgo, digest: &[u8]) -> Result<Vec<u8>, ArcError> {
        match self {
            Self::Rsa(key) => {
                let scheme = match hash_algo {
                    HashAlgo::RsaSha1 => Pkcs1v15Sign::new::<Sha1>(),
                    HashAlgo::RsaSha256 => Pkcs1v15Sign::new::<Sha256>(),
                    HashAlgo::Ed25519Sha256 => {
                        return Err(ArcError::UnsupportedHashAlgorithm(
                            hash_algo.name().to_owned(),
                        ))
                    }
                };
                key.sign(scheme, digest)
                    .map_err(|err| ArcError::FailedToSign(err.to_string()))
            }
            Self::Ed25519(key) => {
                use ed25519_dalek::Signer as _;
                Ok(key.sign(digest).to_bytes().to_vec())
            }
        }
    }
}

/// Verifies a signature over a digest with a retrieved public key.
pub fn verify_signature(
    hash_algo: HashAlgo,
    digest: &[u8],
    signature: &[u8],
    public_key: &PublicKey,
) -> Result<bool, ArcError> {
    Ok(match public_key {
        PublicKey::Rsa(key) => {
            let scheme = match hash_algo {
                HashAlgo::RsaSha1 => Pkcs1v15Sign::new::<Sha1>(),
                HashAlgo::RsaSha256 => Pkcs1v15Sign::new::<Sha256>(),
                HashAlgo::Ed25519Sha256 => return Err(ArcError::InappropriateKeyAlgorithm),
            };
            key.verify(scheme, digest, signature).is_ok()
        }
        PublicKey::Ed25519(key) => {
            if signature.len() != Signature::BYTE_SIZE {
                return Err(ArcError::MalformedSignature);
            }
            let mut sig_bytes = [0u8; Signature::BYTE_SIZE];
            sig_bytes.copy_from_slice(signature);
            key.verify_strict(digest, &Signature::from_bytes(&sig_bytes))
                .is_ok()
        }
    })
}

/// Retrieves every TXT-record public key published for `selector._domainkey.domain`,
/// to support key rotation where multiple keys are momentarily live.
/// `min_key_bits` enforces a floor below which a key is treated as too
/// weak to trust, and `hash_algo` is checked against each key's `h=`
/// restriction, per RFC 8617 section 4.3 step 3.
pub async fn retrieve_public_keys(
    resolver: &dyn Resolver,
    domain: &str,
    selector: &str,
    min_key_bits: usize,
    hash_algo: HashAlgo,
) -> Result<Vec<PublicKey>, ArcError> {
    let dns_name = format!("{selector}.{DNS_NAMESPACE}.{domain}");
    let records = resolver.resolve_txt(&dns_name).await?;
    if records.is_empty() {
        return Err(ArcError::NoKeyForSignature);
    }

    let mut keys = Vec::with_capacity(records.len());
    for record in &records {
        keys.push(parse_key_record(record, min_key_bits, hash_algo)?);
    }
    Ok(keys)
}

fn parse_key_record(
    record: &str,
    min_key_bits: usize,
    hash_algo: HashAlgo,
) -> Result<PublicKey, ArcError> {
    let tags =
        TagValueSet::parse(record, Kind::Key).map_err(|_| ArcError::KeySyntaxError)?;

    if let Some(version) = tags.get("v") {
        if version != "DKIM1" {
            return Err(ArcError::KeyIncompatibleVersion);
        }
    }

    if let Some(h) = tags.get("h") {
        if !h
            .split(':')
            .any(|a| a.trim().eq_ignore_ascii_case(hash_algo.digest_name()))
        {
            return Err(ArcError::InappropriateKeyAlgorithm);
        }
    }

    if let Some(s) = tags.get("s") {
        if !s
            .split(':')
            .any(|svc| matches!(svc.trim(), "email" | "*"))
        {
            return Err(ArcError::KeyNotForEmail);
        }
    }

    let key_type = match tags.get("k") {
        Some(v) => KeyType::parse(v)?,
        None => KeyType::default(),
    };

    let p = tags.get_required("p")?;
    if p.is_empty() {
        return Err(ArcError::KeyRevoked);
    }

    let bytes = general_purpose::STANDARD
        .decode(p)
        .map_err(|err| ArcError::KeyUnavailable(format!("invalid base64 in p=: {err}")))?;

    let key = match key_type {
        KeyType::Rsa => {
            let key = RsaPublicKey::from_public_key_der(&bytes)
                .or_else(|_| RsaPublicKey::from_pkcs1_der(&bytes))
                .map_err(|err| ArcError::KeyUnavailable(format!("invalid RSA key: {err}")))?;
            PublicKey::Rsa(key)
        }
        KeyType::Ed25519 => {
            let key: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| ArcError::KeyUnavailable("ed25519 key is not 32 bytes".into()))?;
            let key = VerifyingKey::from_bytes(&key)
                .map_err(|err| ArcError::KeyUnavailable(format!("invalid ed25519 key: {err}")))?;
            PublicKey::Ed25519(key)
        }
    };

    if key.bit_length() < min_key_bits {
        return Err(ArcError::KeyTooShort {
            bits: key.bit_length(),
            minimum: min_key_bits,
        });
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::TestResolver;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_retrieve_public_keys_incompatible_version() {
        let resolver = TestResolver::new(HashMap::from([(
            "sel._domainkey.example.com".to_owned(),
            vec!["v=DKIM6; p=AAAA".to_owned()],
        )]));
        let err = retrieve_public_keys(
            &resolver,
            "example.com",
            "sel",
            1024,
            HashAlgo::RsaSha256,
        )
            .await
            .unwrap_err();
        assert_eq!(err, ArcError::KeyIncompatibleVersion);
    }

    #[tokio::test]
    async fn test_retrieve_public_keys_revoked() {
        let resolver = TestResolver::new(HashMap::from([(
            "sel._domainkey.example.com".to_owned(),
            vec!["v=DKIM1; k=rsa; p=".to_owned()],
        )]));
        let err = retrieve_public_keys(
            &resolver,
            "example.com",
            "sel",
            1024,
            HashAlgo::RsaSha256,
        )
            .await
            .unwrap_err();
        assert_eq!(err, ArcError::KeyRevoked);
    }

    #[tokio::test]
    async fn test_retrieve_public_keys_inappropriate_algorithm() {
        let resolver = TestResolver::new(HashMap::from([(
            "sel._domainkey.example.com".to_owned(),
            vec!["v=DKIM1; k=foo; p=AAAA".to_owned()],
        )]));
        let err = retrieve_public_keys(
            &resolver,
            "example.com",
            "sel",
            1024,
            HashAlgo::RsaSha256,
        )
            .await
            .unwrap_err();
        assert_eq!(err, ArcError::InappropriateKeyAlgorithm);
    }

    #[tokio::test]
    async fn test_retrieve_public_keys_rejects_mismatched_digest() {
        let resolver = TestResolver::new(HashMap::from([(
            "sel._domainkey.example.com".to_owned(),
            vec!["v=DKIM1; k=rsa; h=sha1; p=AAAA".to_owned()],
        )]));
        let err = retrieve_public_keys(
            &resolver,
            "example.com",
            "sel",
            1024,
            HashAlgo::RsaSha256,
        )
        .await
        .unwrap_err();
        assert_eq!(err, ArcError::InappropriateKeyAlgorithm);
    }

    #[tokio::test]
    async fn test_retrieve_public_keys_rejects_non_email_service() {
        let resolver = TestResolver::new(HashMap::from([(
            "sel._domainkey.example.com".to_owned(),
            vec!["v=DKIM1; k=rsa; s=sip; p=AAAA".to_owned()],
        )]));
        let err = retrieve_public_keys(
            &resolver,
            "example.com",
            "sel",
            1024,
            HashAlgo::RsaSha256,
        )
        .await
        .unwrap_err();
        assert_eq!(err, ArcError::KeyNotForEmail);
    }
}
