//! Request headers set by the gateway and by IdM agents.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use idmsvc_core::identity::Identity;
use serde::Deserialize;

use super::error::ApiError;

pub const IDENTITY_HEADER: &str = "x-rh-identity";
pub const REGISTRATION_TOKEN_HEADER: &str = "x-rh-idm-registration-token";
pub const IDM_VERSION_HEADER: &str = "x-rh-idm-version";
pub const REQUEST_ID_HEADER: &str = "x-rh-insights-request-id";

/// Caller identity decoded from `X-Rh-Identity`.
#[derive(Debug, Clone)]
pub struct RhIdentity(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for RhIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(IDENTITY_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing 'X-Rh-Identity' header".into()))?
            .to_str()
            .map_err(|_| ApiError::BadRequest("'X-Rh-Identity' is not ASCII".into()))?;
        Identity::from_header(raw)
            .map(RhIdentity)
            .map_err(ApiError::from)
    }
}

/// Value of `X-Rh-Idm-Registration-Token`.
pub fn registration_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let token = headers
        .get(REGISTRATION_TOKEN_HEADER)
        .ok_or_else(|| {
            ApiError::Unauthorized("missing 'X-Rh-Idm-Registration-Token' header".into())
        })?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("token invalid".into()))?
        .trim();
    if token.is_empty() {
        return Err(ApiError::Unauthorized(
            "missing 'X-Rh-Idm-Registration-Token' header".into(),
        ));
    }
    Ok(token)
}

/// Software versions reported by an IdM agent in `X-Rh-Idm-Version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IdmVersion {
    #[serde(rename = "ipa-hcc")]
    pub ipa_hcc: String,
    pub ipa: String,
    #[serde(rename = "os-release-id")]
    pub os_release_id: String,
    #[serde(rename = "os-release-version-id")]
    pub os_release_version_id: String,
}

/// Optional agent version header; malformed values are rejected.
pub fn idm_version(headers: &HeaderMap) -> Result<Option<IdmVersion>, ApiError> {
    let Some(raw) = headers.get(IDM_VERSION_HEADER) else {
        return Ok(None);
    };
    let invalid = || ApiError::BadRequest("'X-Rh-Idm-Version' is not valid".into());
    let raw = raw.to_str().map_err(|_| invalid())?;
    let decoded = STANDARD.decode(raw.trim()).map_err(|_| invalid())?;
    let version = serde_json::from_slice(&decoded).map_err(|_| invalid())?;
    Ok(Some(version))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn decodes_idm_version() {
        let mut headers = HeaderMap::new();
        assert_eq!(idm_version(&headers).unwrap(), None);

        let json = r#"{"ipa-hcc":"0.9","ipa":"4.10.0-8.el9_1","os-release-id":"rhel","os-release-version-id":"9.1"}"#;
        headers.insert(
            IDM_VERSION_HEADER,
            HeaderValue::from_str(&STANDARD.encode(json)).unwrap(),
        );
        let version = idm_version(&headers).unwrap().unwrap();
        assert_eq!(version.ipa_hcc, "0.9");
        assert_eq!(version.os_release_version_id, "9.1");

        headers.insert(IDM_VERSION_HEADER, HeaderValue::from_static("not base64!"));
        assert!(matches!(
            idm_version(&headers),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn registration_token_is_required() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            registration_token(&headers),
            Err(ApiError::Unauthorized(_))
        ));
        headers.insert(REGISTRATION_TOKEN_HEADER, HeaderValue::from_static(" abc.def "));
        assert_eq!(registration_token(&headers).unwrap(), "abc.def");
    }
}
