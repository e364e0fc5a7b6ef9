use axum::{middleware::Next, response::Response};
use tracing::debug;

/// Header carrying the already-authenticated user's email, set by the
/// upstream authenticating proxy.
pub const USER_HEADER: &str = "x-user-email";

/// Authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub email: String,
}

/// Identity middleware
///
/// Copies the proxy-supplied identity into request extensions. Requests
/// without it continue anonymously; handlers that mutate state reject them.
pub async fn identity_middleware(
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Some(user) = extract_auth_user(&request) {
        debug!(user = %user.email, "Authenticated request");
        request.extensions_mut().insert(user);
    }

    next.run(request).await
}

fn extract_auth_user(request: &axum::http::Request<axum::body::Body>) -> Option<AuthUser> {
    let email = request.headers().get(USER_HEADER)?.to_str().ok()?.trim();
    if email.is_empty() {
        return None;
    }
    Some(AuthUser {
        email: email.to_ascii_lowercase(),
    })
}
