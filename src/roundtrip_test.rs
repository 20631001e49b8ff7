//! End-to-end sign-then-verify coverage across a two-hop ARC chain,
//! using the fixture keys under `test/keys`.

use crate::chain::Mode;
use crate::config::ArcLib;
use crate::crypto::PrivateKey;
use crate::resolver::TestResolver;
use crate::seal::SealParams;
use crate::tables::{ChainStatus, HashAlgo};
use std::collections::HashMap;
use std::sync::Arc;

fn test_resolver() -> TestResolver {
    let key = std::fs::read_to_string("test/keys/2022.public.b64").unwrap();
    TestResolver::new(HashMap::from([(
        "2022._domainkey.example.com".to_owned(),
        vec![format!("v=DKIM1; k=rsa; p={}", key.trim())],
    )]))
}

fn test_signer() -> PrivateKey {
    let pem = std::fs::read("test/keys/2022.private").unwrap();
    PrivateKey::rsa_from_pem(&pem).unwrap()
}

fn seal_params(authserv_value: &str) -> SealParams<'_> {
    SealParams {
        domain: "example.com",
        selector: "2022",
        hash_algo: HashAlgo::RsaSha256,
        header_canon: crate::canon::Type::Relaxed,
        body_canon: crate::canon::Type::Relaxed,
        authserv_value,
    }
}

fn feed_message(msg: &mut crate::chain::ArcMessage<'_>, headers: &[(&str, &str)], body: &[u8]) {
    for (name, value) in headers {
        msg.header_field(name, value).unwrap();
    }
    msg.eoh().unwrap();
    msg.body(body).unwrap();
}

fn feed_set(msg: &mut crate::chain::ArcMessage<'_>, set: &crate::seal::GeneratedSet) {
    msg.header_field(split_name(&set.seal), split_value(&set.seal))
        .unwrap();
    msg.header_field(split_name(&set.ams), split_value(&set.ams))
        .unwrap();
    msg.header_field(split_name(&set.aar), split_value(&set.aar))
        .unwrap();
}

#[tokio::test]
async fn test_sign_first_hop_then_verify() {
    let lib = ArcLib::builder(Arc::new(test_resolver()))
        .with_fixed_time(1_700_000_000)
        .with_sign_headers(["from", "subject", "to"])
        .build();

    let mut msg = lib.new_message(Mode::Sign);
    let headers = [
        ("From", " alice@example.com"),
        ("Subject", " hello"),
        ("To", " bob@example.org"),
    ];
    feed_message(&mut msg, &headers, b"body text\r\n");

    let status = msg.eom().await.unwrap();
    assert_eq!(status, ChainStatus::None);

    let signer = test_signer();
    let params = seal_params("mx.example.org; arc=none");
    let set = msg.seal(&signer, &params).unwrap();
    assert!(set.seal.contains("cv=none"));
    assert!(set.seal.contains("i=1"));

    let mut verify = lib.new_message(Mode::Verify);
    feed_set(&mut verify, &set);
    for (name, value) in headers {
        verify.header_field(name, value).unwrap();
    }
    verify.eoh().unwrap();
    verify.body(b"body text\r\n").unwrap();

    let verdict = verify.eom().await.unwrap();
    assert_eq!(verdict, ChainStatus::Pass);
}

#[tokio::test]
async fn test_two_hop_chain_passes() {
    let lib = ArcLib::builder(Arc::new(test_resolver()))
        .with_fixed_time(1_700_000_000)
        .with_sign_headers(["from", "subject", "to"])
        .build();
    let signer = test_signer();
    let headers = [("From", " alice@example.com"), ("Subject", " hi")];
    let body: &[u8] = b"hop text\r\n";

    let mut hop1 = lib.new_message(Mode::Sign);
    feed_message(&mut hop1, &headers, body);
    hop1.eom().await.unwrap();
    let set1 = hop1
        .seal(&signer, &seal_params("mx1.example.org; arc=none"))
        .unwrap();

    let mut hop2 = lib.new_message(Mode::Sign);
    feed_set(&mut hop2, &set1);
    for (name, value) in headers {
        hop2.header_field(name, value).unwrap();
    }
    hop2.eoh().unwrap();
    hop2.body(body).unwrap();
    let status = hop2.eom().await.unwrap();
    assert_eq!(status, ChainStatus::Pass);

    let set2 = hop2
        .seal(&signer, &seal_params("mx2.example.org; arc=pass"))
        .unwrap();
    assert!(set2.seal.contains("i=2"));
    assert!(set2.seal.contains("cv=pass"));

    let mut verify = lib.new_message(Mode::Verify);
    feed_set(&mut verify, &set2);
    feed_set(&mut verify, &set1);
    for (name, value) in headers {
        verify.header_field(name, value).unwrap();
    }
    verify.eoh().unwrap();
    verify.body(body).unwrap();

    let verdict = verify.eom().await.unwrap();
    assert_eq!(verdict, ChainStatus::Pass);
}

#[tokio::test]
async fn test_tampered_body_fails_verification() {
    let lib = ArcLib::builder(Arc::new(test_resolver()))
        .with_fixed_time(1_700_000_000)
        .with_sign_headers(["from", "subject", "to"])
        .build();
    let signer = test_signer();
    let headers = [("From", " alice@example.com")];

    let mut msg = lib.new_message(Mode::Sign);
    feed_message(&mut msg, &headers, b"original\r\n");
    msg.eom().await.unwrap();
    let set = msg
        .seal(&signer, &seal_params("mx.example.org; arc=none"))
        .unwrap();

    let mut verify = lib.new_message(Mode::Verify);
    feed_set(&mut verify, &set);
    for (name, value) in headers {
        verify.header_field(name, value).unwrap();
    }
    verify.eoh().unwrap();
    verify.body(b"tampered\r\n").unwrap();

    let verdict = verify.eom().await.unwrap();
    assert_eq!(verdict, ChainStatus::Fail);
}

fn split_name(line: &str) -> &str {
    line.split_once(':').unwrap().0
}

fn split_value(line: &str) -> &str {
    line.split_once(':').unwrap().1
}
