//! The trusted identity tuple, carried on every request as headers set by
//! the authentication collaborator in front of this service. The core does
//! not verify it further.

use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use uuid::Uuid;

use crate::domain::state::Role;
use crate::errors::AppError;
use crate::orders::Actor;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            role: self.role,
        }
    }
}

fn parse_identity(req: &HttpRequest) -> Option<Identity> {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()?
        .parse()
        .ok()?;
    let role = req
        .headers()
        .get(USER_ROLE_HEADER)?
        .to_str()
        .ok()?
        .parse()
        .ok()?;
    Some(Identity { user_id, role })
}

impl FromRequest for Identity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(parse_identity(req).ok_or(AppError::Unauthorized))
    }
}
