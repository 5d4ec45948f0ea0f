use thiserror::Error;

use super::model::{EmailCredentials, SigninPayload, User};
use super::store::{DocumentStore, StoreError};

const TOKEN_PREFIX: &str = "token-";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header must have the form `bearer <token>`")]
    MalformedHeader,
    #[error("token does not belong to any user")]
    UnknownToken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Token handed out by `signinUser` and expected back in the `Authorization` header.
pub fn token_for(user: &User) -> String {
    format!("{}{}", TOKEN_PREFIX, user.email)
}

/// Resolves the user behind an `Authorization: bearer token-<email>` header.
///
/// No header means an anonymous request (`Ok(None)`).
pub async fn authenticate(
    authorization: Option<&str>,
    store: &dyn DocumentStore,
) -> Result<Option<User>, AuthError> {
    let header = match authorization.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(header) => header,
    };
    let (scheme, token) = header.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }
    let email = token.trim().strip_prefix(TOKEN_PREFIX).ok_or(AuthError::UnknownToken)?;
    match store.find_user_by_email(email).await? {
        Some(user) => Ok(Some(user)),
        None => {
            tracing::debug!(email, "token for unknown user");
            Err(AuthError::UnknownToken)
        }
    }
}

pub async fn signin(
    credentials: &EmailCredentials,
    store: &dyn DocumentStore,
) -> Result<SigninPayload, AuthError> {
    let user = store
        .find_user_by_email(&credentials.email)
        .await?
        .filter(|user| user.password == credentials.password)
        .ok_or(AuthError::InvalidCredentials)?;
    Ok(SigninPayload { token: token_for(&user), user })
}
