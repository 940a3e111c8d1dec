//!
//! OpenID 2.0 relying-party core
//! -----------------------------
//! Redirect construction and response verification against one fixed
//! identity provider. Verification is a pure function of the response URL
//! plus nonce-store state: protocol checks first, then the atomic nonce
//! check-and-mark, then one stateless `check_authentication` round trip to
//! the provider. No retries; a failure is surfaced immediately.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use super::nonce::NonceStore;
use super::principal::Identity;
use crate::error::{AuthError, AuthResult};

/// OpenID 2.0 protocol namespace.
pub const OPENID_NS: &str = "http://specs.openid.net/auth/2.0";
const IDENTIFIER_SELECT: &str = "http://specs.openid.net/auth/2.0/identifier_select";
const SREG_NS: &str = "http://openid.net/extensions/sreg/1.1";
const TEAMS_NS: &str = "http://ns.launchpad.net/2007/openid-teams";

/// The federated login handshake, as a seam so tests can substitute a fake.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Build the provider redirect URL for a login starting at `return_to`.
    /// `required`/`optional` are sreg attribute names; `teams` are group
    /// memberships to query (requested but unused by policy).
    fn redirect_url(&self, return_to: &str, required: &[&str], optional: &[&str], teams: &[&str]) -> String;

    /// Verify a provider response URL and extract the asserted identity.
    async fn verify(&self, response_url: &str) -> AuthResult<Identity>;
}

/// Production verifier speaking to the configured SSO endpoint.
pub struct SsoVerifier {
    endpoint: String,
    realm: String,
    client: reqwest::Client,
    nonces: Arc<dyn NonceStore>,
}

impl SsoVerifier {
    pub fn new(endpoint: impl Into<String>, realm: impl Into<String>, nonces: Arc<dyn NonceStore>) -> Self {
        Self {
            endpoint: endpoint.into(),
            realm: realm.into(),
            client: reqwest::Client::new(),
            nonces,
        }
    }

    /// Stateless signature check: POST the response fields back to the
    /// provider with `openid.mode=check_authentication` and require an
    /// `is_valid:true` line in the key-value reply.
    async fn check_authentication(&self, params: &HashMap<String, String>) -> AuthResult<()> {
        let form: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| {
                if k == "openid.mode" {
                    (k.clone(), "check_authentication".to_string())
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect();
        let resp = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                AuthError::verification(
                    "provider-unreachable".to_string(),
                    format!("check_authentication request failed: {}", e),
                )
            })?;
        let body = resp.text().await.map_err(|e| {
            AuthError::verification(
                "provider-unreachable".to_string(),
                format!("check_authentication read failed: {}", e),
            )
        })?;
        let is_valid = body.lines().any(|line| match line.split_once(':') {
            Some((k, v)) => k.trim() == "is_valid" && v.trim() == "true",
            None => false,
        });
        if is_valid {
            Ok(())
        } else {
            Err(AuthError::verification(
                "invalid-signature".to_string(),
                "provider did not confirm the response signature".to_string(),
            ))
        }
    }
}

#[async_trait]
impl IdentityVerifier for SsoVerifier {
    fn redirect_url(&self, return_to: &str, required: &[&str], optional: &[&str], teams: &[&str]) -> String {
        let mut params: Vec<(&str, String)> = vec![
            ("openid.ns", OPENID_NS.to_string()),
            ("openid.mode", "checkid_setup".to_string()),
            ("openid.claimed_id", IDENTIFIER_SELECT.to_string()),
            ("openid.identity", IDENTIFIER_SELECT.to_string()),
            ("openid.return_to", return_to.to_string()),
            ("openid.realm", self.realm.clone()),
        ];
        if !required.is_empty() || !optional.is_empty() {
            params.push(("openid.ns.sreg", SREG_NS.to_string()));
            if !required.is_empty() {
                params.push(("openid.sreg.required", required.join(",")));
            }
            if !optional.is_empty() {
                params.push(("openid.sreg.optional", optional.join(",")));
            }
        }
        if !teams.is_empty() {
            params.push(("openid.ns.lp", TEAMS_NS.to_string()));
            params.push(("openid.lp.query_membership", teams.join(",")));
        }
        format!("{}?{}", self.endpoint, encode_query(&params))
    }

    async fn verify(&self, response_url: &str) -> AuthResult<Identity> {
        let (base, query) = match response_url.split_once('?') {
            Some((b, q)) => (b, q),
            None => return Err(AuthError::malformed("response carries no parameters")),
        };
        let params = parse_query(query)?;

        match params.get("openid.mode").map(String::as_str).unwrap_or("") {
            "id_res" => {}
            "cancel" => {
                return Err(AuthError::verification(
                    "login-cancelled",
                    "login was cancelled at the provider",
                ))
            }
            "error" => {
                let msg = params
                    .get("openid.error")
                    .cloned()
                    .unwrap_or_else(|| "provider returned an error".to_string());
                return Err(AuthError::verification("provider-error".to_string(), msg));
            }
            other => return Err(AuthError::malformed(format!("unexpected openid.mode {:?}", other))),
        }

        if params.get("openid.ns").map(String::as_str) != Some(OPENID_NS) {
            return Err(AuthError::malformed("missing or unsupported openid.ns"));
        }

        // The asserting endpoint must be the provider we were configured to
        // trust; anything else is an impersonation attempt or misrouting.
        let op = params.get("openid.op_endpoint").map(String::as_str).unwrap_or("");
        if op != self.endpoint {
            return Err(AuthError::verification(
                "endpoint-mismatch".to_string(),
                format!("op_endpoint {:?} is not the configured provider", op),
            ));
        }

        // return_to must point back at the URL this response arrived on.
        let return_to = params.get("openid.return_to").map(String::as_str).unwrap_or("");
        let rt_base = return_to.split('?').next().unwrap_or(return_to);
        if rt_base.is_empty() || rt_base != base {
            return Err(AuthError::verification(
                "return-to-mismatch".to_string(),
                format!("openid.return_to {:?} does not match {:?}", rt_base, base),
            ));
        }

        let signed: HashSet<&str> = params
            .get("openid.signed")
            .map(String::as_str)
            .unwrap_or("")
            .split(',')
            .collect();
        for field in ["op_endpoint", "return_to", "response_nonce"] {
            if !signed.contains(field) {
                return Err(AuthError::verification(
                    "unsigned-field".to_string(),
                    format!("{} is not covered by the response signature", field),
                ));
            }
        }

        // Nonce is consumed before the signature round trip; a burned nonce
        // stays burned even when the provider later rejects the response.
        let nonce = params.get("openid.response_nonce").map(String::as_str).unwrap_or("");
        if nonce.is_empty() {
            return Err(AuthError::malformed("missing openid.response_nonce"));
        }
        self.nonces.accept(nonce)?;

        self.check_authentication(&params).await?;

        Ok(Identity {
            claimed_id: params.get("openid.claimed_id").cloned().unwrap_or_default(),
            nickname: params.get("openid.sreg.nickname").cloned().unwrap_or_default(),
            email: params.get("openid.sreg.email").cloned().filter(|s| !s.is_empty()),
            fullname: params.get("openid.sreg.fullname").cloned().filter(|s| !s.is_empty()),
        })
    }
}

/// Parse a query string or form-encoded body into a map. Keys and values are
/// percent-decoded, `+` means space. Later duplicates win.
pub fn parse_query(query: &str) -> AuthResult<HashMap<String, String>> {
    let mut out = HashMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        out.insert(decode_component(k)?, decode_component(v)?);
    }
    Ok(out)
}

fn decode_component(s: &str) -> AuthResult<String> {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(cow) => Ok(cow.into_owned()),
        Err(e) => Err(AuthError::malformed(format!("bad percent-encoding in {:?}: {}", s, e))),
    }
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::nonce::{format_nonce, MemoryNonceStore};
    use chrono::Utc;

    const ENDPOINT: &str = "https://sso.example.com/openid";
    const RETURN: &str = "https://serial.example.com/login";

    fn verifier() -> SsoVerifier {
        SsoVerifier::new(ENDPOINT, "https://serial.example.com", Arc::new(MemoryNonceStore::default()))
    }

    fn url_with(pairs: &[(&str, &str)]) -> String {
        let q = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", RETURN, q)
    }

    fn id_res_pairs<'a>(nonce: &'a str) -> Vec<(&'a str, &'a str)> {
        vec![
            ("openid.ns", OPENID_NS),
            ("openid.mode", "id_res"),
            ("openid.op_endpoint", ENDPOINT),
            ("openid.return_to", RETURN),
            ("openid.response_nonce", nonce),
            ("openid.signed", "op_endpoint,return_to,response_nonce,claimed_id"),
            ("openid.sig", "c2ln"),
            ("openid.claimed_id", "https://sso.example.com/+id/jane"),
            ("openid.sreg.nickname", "jane"),
        ]
    }

    #[test]
    fn redirect_url_carries_protocol_and_extensions() {
        let v = verifier();
        let url = v.redirect_url(RETURN, &["email", "fullname", "nickname"], &[], &["device-signers", "ops"]);
        assert!(url.starts_with(ENDPOINT));
        let (_, q) = url.split_once('?').unwrap();
        let params = parse_query(q).unwrap();
        assert_eq!(params["openid.ns"], OPENID_NS);
        assert_eq!(params["openid.mode"], "checkid_setup");
        assert_eq!(params["openid.claimed_id"], IDENTIFIER_SELECT);
        assert_eq!(params["openid.identity"], IDENTIFIER_SELECT);
        assert_eq!(params["openid.return_to"], RETURN);
        assert_eq!(params["openid.realm"], "https://serial.example.com");
        assert_eq!(params["openid.ns.sreg"], SREG_NS);
        assert_eq!(params["openid.sreg.required"], "email,fullname,nickname");
        assert!(!params.contains_key("openid.sreg.optional"));
        assert_eq!(params["openid.ns.lp"], TEAMS_NS);
        assert_eq!(params["openid.lp.query_membership"], "device-signers,ops");
    }

    #[test]
    fn redirect_url_omits_empty_extensions() {
        let v = verifier();
        let url = v.redirect_url(RETURN, &[], &[], &[]);
        let (_, q) = url.split_once('?').unwrap();
        let params = parse_query(q).unwrap();
        assert!(!params.contains_key("openid.ns.sreg"));
        assert!(!params.contains_key("openid.ns.lp"));
    }

    #[test]
    fn parse_query_percent_and_plus_decoding() {
        let params = parse_query("a=1&b=hello%20world&c=x%2By&d=sp+ace&empty=&flag").unwrap();
        assert_eq!(params["a"], "1");
        assert_eq!(params["b"], "hello world");
        assert_eq!(params["c"], "x+y");
        assert_eq!(params["d"], "sp ace");
        assert_eq!(params["empty"], "");
        assert_eq!(params["flag"], "");
    }

    #[tokio::test]
    async fn verify_rejects_parameterless_url() {
        let err = verifier().verify(RETURN).await.unwrap_err();
        assert_eq!(err.code_str(), "malformed-response");
    }

    #[tokio::test]
    async fn verify_rejects_cancel_and_error_modes() {
        let v = verifier();
        let err = v
            .verify(&url_with(&[("openid.mode", "cancel")]))
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "login-cancelled");

        let err = v
            .verify(&url_with(&[("openid.mode", "error"), ("openid.error", "upstream exploded")]))
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "provider-error");
        assert!(err.message().contains("upstream exploded"));
    }

    #[tokio::test]
    async fn verify_rejects_wrong_namespace() {
        let nonce = format_nonce(Utc::now(), "ns");
        let mut pairs = id_res_pairs(&nonce);
        pairs.retain(|(k, _)| *k != "openid.ns");
        pairs.push(("openid.ns", "http://specs.openid.net/auth/1.1"));
        let err = verifier().verify(&url_with(&pairs)).await.unwrap_err();
        assert_eq!(err.code_str(), "malformed-response");
    }

    #[tokio::test]
    async fn verify_rejects_foreign_endpoint() {
        let nonce = format_nonce(Utc::now(), "ep");
        let mut pairs = id_res_pairs(&nonce);
        pairs.retain(|(k, _)| *k != "openid.op_endpoint");
        pairs.push(("openid.op_endpoint", "https://evil.example.com/openid"));
        let err = verifier().verify(&url_with(&pairs)).await.unwrap_err();
        assert_eq!(err.code_str(), "endpoint-mismatch");
    }

    #[tokio::test]
    async fn verify_rejects_return_to_mismatch() {
        let nonce = format_nonce(Utc::now(), "rt");
        let mut pairs = id_res_pairs(&nonce);
        pairs.retain(|(k, _)| *k != "openid.return_to");
        pairs.push(("openid.return_to", "https://other.example.com/login"));
        let err = verifier().verify(&url_with(&pairs)).await.unwrap_err();
        assert_eq!(err.code_str(), "return-to-mismatch");
    }

    #[tokio::test]
    async fn verify_requires_signed_mandatory_fields() {
        let nonce = format_nonce(Utc::now(), "sg");
        let mut pairs = id_res_pairs(&nonce);
        pairs.retain(|(k, _)| *k != "openid.signed");
        pairs.push(("openid.signed", "op_endpoint,claimed_id"));
        let err = verifier().verify(&url_with(&pairs)).await.unwrap_err();
        assert_eq!(err.code_str(), "unsigned-field");
    }

    #[tokio::test]
    async fn verify_requires_a_nonce() {
        let pairs: Vec<(&str, &str)> = id_res_pairs("")
            .into_iter()
            .filter(|(k, _)| *k != "openid.response_nonce")
            .collect();
        let err = verifier().verify(&url_with(&pairs)).await.unwrap_err();
        assert_eq!(err.code_str(), "malformed-response");
    }
}
