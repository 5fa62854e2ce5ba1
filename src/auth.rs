use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AppConfig, Env},
    models::User,
    repository::RepositoryState,
};

/// Header accepted in `Env::Local` in place of a token.
pub const LOCAL_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// The JWT payload. Tokens are HS256-signed with `AppConfig::jwt_secret`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Fully qualified user id, e.g. `acct:seanh@hypothes.is`.
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request, loaded fresh from the
/// repository so flag changes (admin, staff) take effect immediately.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

/// Principal
///
/// What the requester is, as far as authorization is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Authenticated,
    Staff,
    Admin,
}

/// Permission
///
/// What a route asks the requester to be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Use the admin console.
    Admin,
    /// Use staff-only tooling. Admins have it too.
    Staff,
    CreateGroup,
}

/// The authorization policy: whether any of `principals` grants `permission`.
pub fn permits(principals: &[Principal], permission: Permission) -> bool {
    let has = |principal: Principal| principals.contains(&principal);
    match permission {
        Permission::Admin => has(Principal::Admin),
        Permission::Staff => has(Principal::Staff) || has(Principal::Admin),
        Permission::CreateGroup => has(Principal::Authenticated),
    }
}

impl AuthUser {
    pub fn principals(&self) -> Vec<Principal> {
        let mut principals = vec![Principal::Authenticated];
        if self.user.staff {
            principals.push(Principal::Staff);
        }
        if self.user.admin {
            principals.push(Principal::Admin);
        }
        principals
    }

    pub fn userid(&self) -> String {
        self.user.userid()
    }
}

/// resolve
///
/// 1. In `Env::Local`, an `x-user-id` header naming an existing user wins.
/// 2. Otherwise a `Bearer` JWT is decoded and its `sub` loaded.
///
/// Rejects with 401 on any failure, 500 if the repository is unreachable.
async fn resolve(
    parts: &Parts,
    repo: &RepositoryState,
    config: &AppConfig,
) -> Result<AuthUser, StatusCode> {
    if config.env == Env::Local {
        if let Some(userid) = parts
            .headers
            .get(LOCAL_USER_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            if let Some(user) = load_user(repo, userid).await? {
                return Ok(AuthUser { user });
            }
        }
    }

    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!("rejected token: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    // The user may have been deleted after the token was issued.
    let user = load_user(repo, &token_data.claims.sub)
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;
    Ok(AuthUser { user })
}

async fn load_user(repo: &RepositoryState, userid: &str) -> Result<Option<User>, StatusCode> {
    repo.get_user_by_userid(userid).await.map_err(|e| {
        tracing::error!("failed to load user {}: {}", userid, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        resolve(parts, &repo, &config).await
    }
}

/// `Option<AuthUser>` for routes that also serve anonymous requests: any
/// credential failure resolves to `None`.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        Ok(resolve(parts, &repo, &config).await.ok())
    }
}
