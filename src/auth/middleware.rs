use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::role::Role;
use crate::auth::token;
use crate::credentials::{CredentialsError, CredentialsProvider, TokenScope};
use crate::error::ApiError;
use crate::store::AppState;

/// Parsed `<realm>:<role>:<secret>` header. The realm is carried but not
/// interpreted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub realm: String,
    pub role: Role,
    pub secret: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("realm", &self.realm)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Split the header into exactly three colon-delimited parts with a known role.
pub fn parse_header(value: &str) -> Result<Credential, ApiError> {
    let parts: Vec<&str> = value.split(':').collect();
    let [realm, role, secret] = parts.as_slice() else {
        return Err(ApiError::Unauthorized);
    };
    let role: Role = role.parse().map_err(|_| ApiError::Unauthorized)?;
    Ok(Credential {
        realm: (*realm).to_owned(),
        role,
        secret: (*secret).to_owned(),
    })
}

/// Validated caller identity for one request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub role: Role,
    /// Projects a user token is bound to. Empty for the admin.
    pub scope: TokenScope,
}

impl AuthContext {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    /// The caller must be a user whose token covers `project`.
    pub fn require_user_scope(&self, project: &str) -> Result<(), ApiError> {
        if self.role == Role::User && self.scope.allows(project) {
            Ok(())
        } else {
            tracing::warn!(%project, role = %self.role, "project outside caller scope");
            Err(ApiError::Unauthorized)
        }
    }
}

/// Validate a parsed credential: the admin secret by digest comparison, a
/// user secret through the credentials provider.
pub async fn authorize(
    credentials: &dyn CredentialsProvider,
    admin_secret: &str,
    credential: &Credential,
) -> Result<AuthContext, ApiError> {
    match credential.role {
        Role::Admin => {
            if !token::secrets_match(&credential.secret, admin_secret) {
                tracing::warn!("admin secret rejected");
                return Err(ApiError::Unauthorized);
            }
            Ok(AuthContext {
                role: Role::Admin,
                scope: TokenScope::default(),
            })
        }
        Role::User => match credentials.validate_user_token(&credential.secret).await {
            Ok(scope) => Ok(AuthContext {
                role: Role::User,
                scope,
            }),
            Err(CredentialsError::InvalidToken) => {
                tracing::warn!("user token rejected");
                Err(ApiError::Unauthorized)
            }
            Err(e) => {
                tracing::warn!(error = %e, "user token could not be validated");
                Err(ApiError::Unauthorized)
            }
        },
    }
}

fn header_credential(parts: &Parts) -> Result<Credential, ApiError> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    parse_header(value)
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = header_credential(parts)?;
        authorize(
            state.credentials.as_ref(),
            &state.config.admin_secret,
            &credential,
        )
        .await
    }
}

/// Admin-only extractor. The role is checked before any secret validation,
/// so a user credential never reaches the credentials provider here.
#[derive(Debug, Clone)]
pub struct AdminAuth(pub AuthContext);

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = header_credential(parts)?;
        if credential.role != Role::Admin {
            return Err(ApiError::Unauthorized);
        }
        let ctx = authorize(
            state.credentials.as_ref(),
            &state.config.admin_secret,
            &credential,
        )
        .await?;
        ctx.require_admin()?;
        Ok(Self(ctx))
    }
}

/// User-only extractor; project scope is checked by the handler once the
/// target project is known.
#[derive(Debug, Clone)]
pub struct UserAuth(pub AuthContext);

impl FromRequestParts<AppState> for UserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = header_credential(parts)?;
        if credential.role != Role::User {
            return Err(ApiError::Unauthorized);
        }
        let ctx = authorize(
            state.credentials.as_ref(),
            &state.config.admin_secret,
            &credential,
        )
        .await?;
        Ok(Self(ctx))
    }
}
