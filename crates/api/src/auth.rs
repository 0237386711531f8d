//! Caller identity taken from headers set by the upstream gateway.
//!
//! Authentication happens before requests reach this service; the gateway
//! forwards the caller as `x-user-id` (numeric) and `x-user-role`
//! (`customer` or `admin`, defaulting to `customer`).

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::CustomerId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Admin,
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: CustomerId,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| {
                ApiError::Unauthorized(format!("missing or invalid {USER_ID_HEADER} header"))
            })?;

        let role = match headers.get(USER_ROLE_HEADER).map(|v| v.to_str()) {
            None => Role::Customer,
            Some(Ok(v)) if v.eq_ignore_ascii_case("customer") => Role::Customer,
            Some(Ok(v)) if v.eq_ignore_ascii_case("admin") => Role::Admin,
            Some(_) => {
                return Err(ApiError::Unauthorized(format!(
                    "invalid {USER_ROLE_HEADER} header"
                )));
            }
        };

        Ok(Self {
            user_id: CustomerId::new(user_id),
            role,
        })
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Identity::from_headers(&parts.headers)
    }
}

/// An identity that must carry the admin role.
#[derive(Debug, Clone, Copy)]
pub struct Admin(pub Identity);

impl<S> FromRequestParts<S> for Admin
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            return Err(ApiError::Forbidden("admin role required".to_string()));
        }
        Ok(Admin(identity))
    }
}
