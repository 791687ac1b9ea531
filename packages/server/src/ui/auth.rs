//! Caller identity as seen by the upgrade handler.
//!
//! Authentication happens upstream. Whoever authenticated the request leaves
//! an `AuthContext` in the request extensions; `gateway_identity` builds one
//! from the headers a trusted API gateway forwards.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::domain::{TenantId, UserId, ValueObjectError};

pub const IDENTITY_HEADER: &str = "x-user-identity";
pub const COLLEGE_ID_HEADER: &str = "x-college-id";
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity attached to a request by the authentication layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub identity: Option<String>,
    pub college_id: Option<String>,
    pub user_id: Option<String>,
}

/// Why an upgrade request was refused before the handshake
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    #[error("missing user identity")]
    MissingIdentity,

    #[error("missing college id")]
    MissingCollegeId,

    #[error("missing user id")]
    MissingUserId,

    #[error("invalid college id: {0}")]
    InvalidCollegeId(ValueObjectError),

    #[error("invalid user id: {0}")]
    InvalidUserId(ValueObjectError),
}

impl AuthRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthRejection::InvalidCollegeId(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl AuthContext {
    /// Read the gateway headers; unreadable or blank values count as absent
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| non_empty(headers.get(name).and_then(|v| v.to_str().ok()));
        Self {
            identity: header(IDENTITY_HEADER),
            college_id: header(COLLEGE_ID_HEADER),
            user_id: header(USER_ID_HEADER),
        }
    }

    /// Validate the context into the registry key
    pub fn resolve(&self) -> Result<(TenantId, UserId), AuthRejection> {
        if self.identity.is_none() {
            return Err(AuthRejection::MissingIdentity);
        }
        let college_id = self
            .college_id
            .as_deref()
            .ok_or(AuthRejection::MissingCollegeId)?;
        let user_id = self.user_id.as_deref().ok_or(AuthRejection::MissingUserId)?;

        let tenant_id = college_id
            .parse::<TenantId>()
            .map_err(AuthRejection::InvalidCollegeId)?;
        let user_id = user_id
            .parse::<UserId>()
            .map_err(AuthRejection::InvalidUserId)?;

        Ok((tenant_id, user_id))
    }
}

/// Middleware placing an `AuthContext` built from gateway headers into the
/// request extensions.
///
/// A context already attached by an outer authentication layer is kept;
/// headers never override a verified identity.
pub async fn gateway_identity(mut request: Request, next: Next) -> Response {
    attach_gateway_identity(&mut request);
    next.run(request).await
}

fn attach_gateway_identity(request: &mut Request) {
    if request.extensions().get::<AuthContext>().is_some() {
        return;
    }
    let context = AuthContext::from_headers(request.headers());
    request.extensions_mut().insert(context);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::HeaderValue};

    fn context(identity: Option<&str>, college_id: Option<&str>, user_id: Option<&str>) -> AuthContext {
        AuthContext {
            identity: identity.map(str::to_string),
            college_id: college_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
        }
    }

    #[test]
    fn test_resolve_success() {
        // テスト項目: 正しい識別情報から (TenantId, UserId) が得られる
        // given (前提条件):
        let ctx = context(Some("alice@example.edu"), Some("5"), Some("42"));

        // when (操作):
        let result = ctx.resolve();

        // then (期待する結果):
        let (tenant_id, user_id) = result.unwrap();
        assert_eq!(tenant_id.value(), 5);
        assert_eq!(user_id.value(), 42);
    }

    #[test]
    fn test_missing_fields_are_unauthorized() {
        // テスト項目: identity / college_id / user_id の欠落は 401
        // given (前提条件):
        let cases = [
            context(None, Some("5"), Some("1")),
            context(Some("alice"), None, Some("1")),
            context(Some("alice"), Some("5"), None),
        ];

        for ctx in cases {
            // when (操作):
            let rejection = ctx.resolve().unwrap_err();

            // then (期待する結果):
            assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_malformed_ids() {
        // テスト項目: 不正な college_id は 400、不正な user_id は 401
        // when (操作):
        let bad_college = context(Some("alice"), Some("abc"), Some("1")).resolve();
        let bad_user = context(Some("alice"), Some("5"), Some("-3")).resolve();

        // then (期待する結果):
        assert_eq!(bad_college.unwrap_err().status(), StatusCode::BAD_REQUEST);
        assert_eq!(bad_user.unwrap_err().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_from_headers_ignores_blank_values() {
        // テスト項目: 空白のみのヘッダーは未指定として扱われる
        // given (前提条件):
        let mut headers = HeaderMap::new();
        headers.insert(IDENTITY_HEADER, HeaderValue::from_static("alice"));
        headers.insert(COLLEGE_ID_HEADER, HeaderValue::from_static(" 5 "));
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));

        // when (操作):
        let ctx = AuthContext::from_headers(&headers);

        // then (期待する結果):
        assert_eq!(ctx, context(Some("alice"), Some("5"), None));
        assert_eq!(ctx.resolve(), Err(AuthRejection::MissingUserId));
    }

    #[test]
    fn test_gateway_headers_do_not_override_verified_identity() {
        // テスト項目: 上位の認証層が付与した AuthContext はヘッダーで上書きされない
        // given (前提条件):
        let verified = context(Some("verified@example.edu"), Some("7"), Some("3"));
        let mut request = axum::http::Request::builder()
            .uri("/ws")
            .header(IDENTITY_HEADER, "mallory")
            .header(COLLEGE_ID_HEADER, "5")
            .header(USER_ID_HEADER, "1")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(verified.clone());

        // when (操作):
        attach_gateway_identity(&mut request);

        // then (期待する結果):
        assert_eq!(request.extensions().get::<AuthContext>(), Some(&verified));
    }

    #[test]
    fn test_gateway_headers_fill_missing_identity() {
        // テスト項目: AuthContext がない場合はゲートウェイヘッダーから作られる
        // given (前提条件):
        let mut request = axum::http::Request::builder()
            .uri("/ws")
            .header(IDENTITY_HEADER, "alice")
            .header(COLLEGE_ID_HEADER, "5")
            .header(USER_ID_HEADER, "1")
            .body(Body::empty())
            .unwrap();

        // when (操作):
        attach_gateway_identity(&mut request);

        // then (期待する結果):
        assert_eq!(
            request.extensions().get::<AuthContext>(),
            Some(&context(Some("alice"), Some("5"), Some("1")))
        );
    }
}
