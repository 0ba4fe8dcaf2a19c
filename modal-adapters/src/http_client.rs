use std::sync::Arc;

use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::{Body, Client};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use webpki_roots::TLS_SERVER_ROOTS;

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Builds a client that speaks HTTPS with the webpki roots. Plain HTTP is
/// still accepted by the connector; callers gate it by policy.
pub(crate) fn build_https_client() -> HyperClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Client::builder().build::<_, Body>(connector)
}

/// Outcome of reading a body under a byte ceiling.
pub(crate) enum LimitedBody {
    Complete(Vec<u8>),
    TooLarge,
}

/// Collects `body`, stopping as soon as more than `limit` bytes arrived.
pub(crate) async fn read_limited(mut body: Body, limit: u64) -> Result<LimitedBody, hyper::Error> {
    if body.size_hint().lower() > limit {
        return Ok(LimitedBody::TooLarge);
    }
    let mut collected = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        if (collected.len() + chunk.len()) as u64 > limit {
            return Ok(LimitedBody::TooLarge);
        }
        collected.extend_from_slice(&chunk);
    }
    Ok(LimitedBody::Complete(collected))
}
