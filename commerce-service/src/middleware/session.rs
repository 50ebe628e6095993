//! Caller identity forwarded by the BFF.
//!
//! The BFF authenticates the user and sets `X-User-ID` / `X-User-Role` on
//! signed requests. Headers are only trusted behind the signature middleware.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use std::convert::Infallible;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn from_string(s: &str) -> Self {
        if s.eq_ignore_ascii_case("ADMIN") {
            Role::Admin
        } else {
            Role::User
        }
    }
}

/// What an operation needs from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Buy, verify, cancel and read one's own account.
    Purchase,
    /// Seasons and plans.
    ManageCatalog,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Option<String>,
    pub role: Role,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            role: Role::User,
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role: Role::User,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Gate for every mutating operation. Returns the caller's user id.
pub fn authorize(session: &Session, capability: Capability) -> Result<&str, AppError> {
    let user_id = session
        .user_id
        .as_deref()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Unauthorized")))?;

    match capability {
        Capability::Purchase => Ok(user_id),
        Capability::ManageCatalog if session.is_admin() => Ok(user_id),
        Capability::ManageCatalog => {
            tracing::warn!(
                security_event = true,
                user_id = %user_id,
                "Non-admin attempted a catalog change"
            );
            Err(AppError::Forbidden(anyhow::anyhow!("Unauthorized")))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(Role::from_string)
            .unwrap_or(Role::User);

        if let Some(ref uid) = user_id {
            tracing::Span::current().record("user_id", uid.as_str());
        }

        Ok(Session { user_id, role })
    }
}
