use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Dispatch,
    Driver,
}

/// Authenticated caller identity, supplied by the upstream identity
/// provider as trusted headers. Every core operation takes this explicitly;
/// there is no ambient session state.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn dispatch(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Dispatch,
        }
    }

    pub fn driver(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Driver,
        }
    }

    pub fn require_dispatch(&self) -> Result<(), AppError> {
        if self.role != Role::Dispatch {
            return Err(AppError::Forbidden(
                "dispatch role required".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Forbidden("missing x-user-id header".to_string()))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|err| AppError::BadRequest(format!("invalid x-user-id: {err}")))?;

        let role = parts
            .headers
            .get("x-role")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Forbidden("missing x-role header".to_string()))?;
        let role = match role {
            "dispatch" => Role::Dispatch,
            "driver" => Role::Driver,
            other => {
                return Err(AppError::BadRequest(format!(
                    "invalid x-role: {other}, expected dispatch/driver"
                )))
            }
        };

        Ok(Caller { user_id, role })
    }
}
