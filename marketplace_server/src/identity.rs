//! Caller identity.
//!
//! The marketplace sits behind a gateway that has already authenticated the caller. The gateway forwards who the
//! caller is in two headers:
//! * `x-user-id`: the caller's user id.
//! * `x-user-role`: one of `buyer`, `seller`, `admin` or `gateway`.
//!
//! Handlers take an [`Identity`] argument to receive the caller. A request with a missing or malformed header is
//! answered with `401 Unauthorized` before the handler runs.
use std::str::FromStr;

use actix_web::{dev::Payload, http::header::HeaderMap, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use log::*;
use marketplace_engine::db_types::Role;

use crate::errors::ServerError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new<S: Into<String>>(user_id: S, role: Role) -> Self {
        Self { user_id: user_id.into(), role }
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ServerError> {
        let user_id = header_value(headers, USER_ID_HEADER)?;
        let role = header_value(headers, USER_ROLE_HEADER)?;
        let role = Role::from_str(role).map_err(|e| ServerError::Unauthenticated(e.to_string()))?;
        Ok(Self::new(user_id, role))
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ServerError> {
    let value = headers
        .get(name)
        .ok_or_else(|| ServerError::Unauthenticated(format!("The {name} header is required")))?
        .to_str()
        .map_err(|_| ServerError::Unauthenticated(format!("The {name} header is not valid text")))?
        .trim();
    if value.is_empty() {
        return Err(ServerError::Unauthenticated(format!("The {name} header is empty")));
    }
    Ok(value)
}

impl FromRequest for Identity {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let identity = Identity::from_headers(req.headers());
        if let Err(e) = &identity {
            debug!("💻️ Rejected request to {}. {e}", req.path());
        }
        ready(identity)
    }
}
