use std::sync::Arc;

use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: Option<String>,
}

/// Verifies HS256 access tokens issued by the identity provider
#[derive(Clone)]
pub struct JwtVerifier {
    config: Arc<AppConfig>,
    key: DecodingKey,
}

impl JwtVerifier {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            config,
        }
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = self.config.auth_clock_skew.as_secs();
        if let Some(issuer) = self.config.jwt_issuer.as_deref() {
            validation.set_issuer(&[issuer]);
        }

        let decoded = decode::<AccessClaims>(token, &self.key, &validation).map_err(|error| {
            AppError::unauthorized(format!("Token validation failed: {}", sanitize(&error)))
        })?;

        if !audience_matches(decoded.claims.aud.as_ref(), &self.config.jwt_audience) {
            return Err(AppError::unauthorized("Token audience is not allowed"));
        }
        let user_id = decoded.claims.sub.trim();
        if user_id.is_empty() {
            return Err(AppError::unauthorized("Token subject is missing"));
        }
        validate_temporal_claims(&decoded.claims, self.config.auth_clock_skew)?;

        Ok(AuthenticatedUser {
            user_id: user_id.to_string(),
            email: tally_core::util::normalize_text_option(decoded.claims.email),
        })
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AccessClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

fn validate_temporal_claims(
    claims: &AccessClaims,
    clock_skew: std::time::Duration,
) -> Result<(), AppError> {
    let now = tally_core::util::unix_timestamp_now();
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(0);

    let exp = claims
        .exp
        .ok_or_else(|| AppError::unauthorized("Token missing `exp` claim"))?;
    if exp <= now.saturating_sub(skew) {
        return Err(AppError::unauthorized("Token is expired"));
    }

    let iat = claims
        .iat
        .ok_or_else(|| AppError::unauthorized("Token missing `iat` claim"))?;
    if iat > now.saturating_add(skew) {
        return Err(AppError::unauthorized("Token `iat` is in the future"));
    }

    if let Some(nbf) = claims.nbf {
        if nbf > now.saturating_add(skew) {
            return Err(AppError::unauthorized("Token is not yet valid"));
        }
    }

    Ok(())
}

fn audience_matches(aud: Option<&Value>, expected: &str) -> bool {
    let Some(aud) = aud else {
        return false;
    };

    match aud {
        Value::String(value) => value == expected,
        Value::Array(values) => values
            .iter()
            .filter_map(Value::as_str)
            .any(|value| value == expected),
        _ => false,
    }
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    pub(crate) const SECRET: &str = "test-secret-test-secret-test-secret";

    pub(crate) fn test_config(overrides: &[(&str, &str)]) -> Arc<AppConfig> {
        let mut map = HashMap::from([
            ("AUTH_JWT_SECRET", SECRET),
            ("TALLY_DATABASE_PATH", ":memory:"),
        ]);
        map.extend(overrides.iter().copied());
        Arc::new(
            AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string())).unwrap(),
        )
    }

    pub(crate) fn claims_for(sub: &str) -> AccessClaims {
        let now = chrono::Utc::now().timestamp();
        AccessClaims {
            sub: sub.to_string(),
            email: Some(format!("{sub}@example.com")),
            aud: Some(Value::String("authenticated".to_string())),
            iss: None,
            exp: Some(now + 300),
            iat: Some(now),
            nbf: None,
        }
    }

    pub(crate) fn sign(claims: &AccessClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn bearer_token_extractor_accepts_standard_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );

        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn bearer_token_extractor_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn verifier_accepts_valid_token() {
        let verifier = JwtVerifier::new(test_config(&[]));
        let token = sign(&claims_for("user-1"), SECRET);

        let user = verifier.verify_access_token(&token).unwrap();
        assert_eq!(user.user_id, "user-1");
        assert_eq!(user.email.as_deref(), Some("user-1@example.com"));
    }

    #[test]
    fn verifier_rejects_foreign_signature() {
        let verifier = JwtVerifier::new(test_config(&[]));
        let token = sign(&claims_for("user-1"), "another-secret-another-secret-123");
        assert!(matches!(
            verifier.verify_access_token(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn verifier_checks_audience_and_issuer() {
        let verifier = JwtVerifier::new(test_config(&[("AUTH_JWT_ISSUER", "https://id.example")]));

        let mut claims = claims_for("user-1");
        claims.iss = Some("https://id.example".to_string());
        assert!(verifier.verify_access_token(&sign(&claims, SECRET)).is_ok());

        claims.aud = Some(Value::String("anon".to_string()));
        let err = verifier
            .verify_access_token(&sign(&claims, SECRET))
            .unwrap_err();
        assert!(err.to_string().contains("audience"));

        let mut claims = claims_for("user-1");
        claims.iss = Some("https://evil.example".to_string());
        assert!(verifier.verify_access_token(&sign(&claims, SECRET)).is_err());
    }

    #[test]
    fn audience_matches_string_or_array() {
        assert!(audience_matches(
            Some(&Value::String("authenticated".to_string())),
            "authenticated"
        ));
        assert!(audience_matches(
            Some(&Value::Array(vec![
                Value::String("anon".to_string()),
                Value::String("authenticated".to_string())
            ])),
            "authenticated"
        ));
        assert!(!audience_matches(None, "authenticated"));
    }

    #[test]
    fn temporal_claims_require_exp_and_iat() {
        let mut claims = claims_for("user");
        claims.exp = None;
        claims.iat = None;
        let err =
            validate_temporal_claims(&claims, std::time::Duration::from_secs(60)).unwrap_err();
        assert!(err.to_string().contains("missing `exp`"));
    }

    #[test]
    fn temporal_claims_reject_future_iat() {
        let now = chrono::Utc::now().timestamp();
        let mut claims = claims_for("user");
        claims.iat = Some(now + 120);
        let err =
            validate_temporal_claims(&claims, std::time::Duration::from_secs(30)).unwrap_err();
        assert!(err.to_string().contains("future"));
    }
}
