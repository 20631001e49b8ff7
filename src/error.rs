/// Per-message return code taxonomy, mirroring the `ARC_STAT_*` codes of
/// the reference implementation this protocol was specified against.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArcStat {
    Ok,
    BadSig,
    NoSig,
    NoKey,
    CantVrfy,
    Syntax,
    NoResource,
    Internal,
    Revoked,
    Invalid,
    NotImplement,
    KeyFail,
    MultiDnsReply,
    SigGen,
    BadAlg,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ArcError {
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),
    #[error("unsupported canonicalization: {0}")]
    UnsupportedCanonicalization(String),
    #[error("tag-value syntax error: {0}")]
    SyntaxError(String),
    #[error("tag-value set missing required tag ({0})")]
    MissingRequiredTag(&'static str),
    #[error("duplicate tag ({0}) in tag-value set")]
    DuplicateTag(String),
    #[error("first tag must be \"i=\"")]
    FirstTagNotInstance,
    #[error("invalid ARC instance number")]
    InvalidArcInstance,
    #[error("duplicate ARC instance {0}")]
    DuplicateArcInstance(u8),
    #[error("missing ARC instance {0}")]
    MissingArcInstance(u8),
    #[error("too many ARC instances ({0} > 50)")]
    TooManyArcInstances(u8),
    #[error("ARC-Seal must not carry an h= tag")]
    SealHasHeaderList,
    #[error("ARC-Message-Signature h= must not name ARC-Seal")]
    SignsOwnSeal,
    #[error("From field not signed")]
    FromFieldNotSigned,
    #[error("signature expired")]
    SignatureExpired,
    #[error("unsupported query method")]
    UnsupportedQueryMethod,
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),
    #[error("no key for signature")]
    NoKeyForSignature,
    #[error("key syntax error")]
    KeySyntaxError,
    #[error("key incompatible version")]
    KeyIncompatibleVersion,
    #[error("key revoked")]
    KeyRevoked,
    #[error("key too short: {bits} bits, minimum is {minimum}")]
    KeyTooShort { bits: usize, minimum: usize },
    #[error("inappropriate key algorithm")]
    InappropriateKeyAlgorithm,
    #[error("key is not scoped to the email service")]
    KeyNotForEmail,
    #[error("signature did not verify")]
    SignatureDidNotVerify,
    #[error("body hash did not verify")]
    BodyHashDidNotVerify,
    #[error("malformed signature encoding")]
    MalformedSignature,
    #[error("failed to sign: {0}")]
    FailedToSign(String),
    #[error("builder error: {0}")]
    BuilderError(&'static str),
    #[error("out-of-order call: {0}")]
    OutOfOrder(&'static str),
    #[error("message is no longer usable after a prior internal error")]
    Unusable,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("resource limit exceeded: {0}")]
    ResourceExhausted(&'static str),
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("DNS query failed: {0}")]
    KeyFail(String),
    #[error("DNS returned multiple conflicting replies")]
    MultiDnsReply,
}

impl ArcError {
    pub fn stat(&self) -> ArcStat {
        use ArcError::*;
        match self {
            SignatureDidNotVerify | BodyHashDidNotVerify => ArcStat::BadSig,
            NoKeyForSignature => ArcStat::NoSig,
            KeyIncompatibleVersion | InappropriateKeyAlgorithm | KeyNotForEmail => ArcStat::NoKey,
            KeyTooShort { .. } => ArcStat::CantVrfy,
            SyntaxError(_)
            | MissingRequiredTag(_)
            | DuplicateTag(_)
            | FirstTagNotInstance
            | InvalidArcInstance
            | KeySyntaxError
            | MalformedSignature
            | SealHasHeaderList
            | SignsOwnSeal
            | FromFieldNotSigned
            | SignatureExpired
            | UnsupportedQueryMethod => ArcStat::Syntax,
            DuplicateArcInstance(_) | MissingArcInstance(_) | TooManyArcInstances(_) => {
                ArcStat::Invalid
            }
            ResourceExhausted(_) => ArcStat::NoResource,
            Internal(_) | BuilderError(_) => ArcStat::Internal,
            KeyRevoked => ArcStat::Revoked,
            OutOfOrder(_) | Unusable => ArcStat::Invalid,
            NotImplemented(_) => ArcStat::NotImplement,
            KeyUnavailable(_) | KeyFail(_) => ArcStat::KeyFail,
            MultiDnsReply => ArcStat::MultiDnsReply,
            FailedToSign(_) => ArcStat::SigGen,
            UnsupportedHashAlgorithm(_) | UnsupportedCanonicalization(_) => ArcStat::BadAlg,
        }
    }
}
