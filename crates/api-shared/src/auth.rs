//! Credential extraction for requests from other organisations.
//!
//! Only extraction happens here. Whether the credentials are any good is decided by the
//! authorization gate in `ehr-core`.

use ehr_core::AccessRequest;
use http::header::AUTHORIZATION;
use http::HeaderMap;

/// Header carrying a signed identity contract of the person behind the request.
pub const IDENTITY_CONTRACT_HEADER: &str = "x-identity-contract";

/// Header carrying the URN of the organisation the requester acts for.
pub const REQUESTING_ORGANISATION_HEADER: &str = "x-requesting-organisation";

/// Returns the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively. Any other scheme, or an empty token, yields `None`.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Collects every credential the gate looks at.
pub fn access_request(headers: &HeaderMap) -> AccessRequest {
    AccessRequest {
        bearer_token: bearer_token(headers),
        identity_contract: header_text(headers, IDENTITY_CONTRACT_HEADER),
        requesting_organisation: header_text(headers, REQUESTING_ORGANISATION_HEADER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_bearer_token_requires_bearer_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_access_request_reads_contract_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        headers.insert(IDENTITY_CONTRACT_HEADER, HeaderValue::from_static("c2lnbmVk"));
        headers.insert(REQUESTING_ORGANISATION_HEADER, HeaderValue::from_static(" "));

        let request = access_request(&headers);
        assert_eq!(request.bearer_token.as_deref(), Some("t"));
        assert_eq!(request.identity_contract.as_deref(), Some("c2lnbmVk"));
        assert_eq!(request.requesting_organisation, None);
    }
}
