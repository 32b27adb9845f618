use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;
use uuid::Uuid;

use messup_db::NewUserOutcome;
use messup_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;
use crate::state::{AppState, with_db};

/// An authenticated user, resolved from a token before any core operation
/// runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

/// Maps bearer tokens to identities.
pub trait Authenticator: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, ApiError>;

    fn issue(&self, identity: &Identity) -> Result<String, ApiError>;
}

/// HS256 JWTs carrying `Claims`.
pub struct JwtAuthenticator {
    secret: String,
    ttl: chrono::Duration,
}

impl JwtAuthenticator {
    pub fn new(secret: impl Into<String>, ttl: chrono::Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn verify(&self, token: &str) -> Result<Identity, ApiError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| ApiError::Authentication(format!("invalid token: {}", e)))?;

        Ok(Identity {
            user_id: token_data.claims.sub,
            username: token_data.claims.username,
        })
    }

    fn issue(&self, identity: &Identity) -> Result<String, ApiError> {
        let claims = Claims {
            sub: identity.user_id,
            username: identity.username.clone(),
            exp: (chrono::Utc::now() + self.ttl).timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::Internal(e.into()))
    }
}

/// Lengths are counted in characters, not bytes.
fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    let username_len = req.username.chars().count();
    if !(3..=32).contains(&username_len) {
        return Err(ApiError::Validation(
            "username must be 3 to 32 characters".into(),
        ));
    }
    if !req.email.contains('@') {
        return Err(ApiError::Validation("invalid email address".into()));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

pub async fn register_user(state: &AppState, req: RegisterRequest) -> Result<RegisterResponse, ApiError> {
    validate_registration(&req)?;

    let username = req.username.clone();
    let outcome = with_db(state, move |db| {
        // Argon2id, hashed on the blocking pool
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();
        db.create_user(&req.username, &req.email, &password_hash)
    })
    .await?;

    let user = match outcome {
        NewUserOutcome::Created(user) => user,
        NewUserOutcome::UsernameTaken => {
            return Err(ApiError::Conflict(format!("username taken: {}", username)));
        }
        NewUserOutcome::EmailTaken => {
            return Err(ApiError::Conflict("email already registered".into()));
        }
    };

    let token = state.authenticator.issue(&Identity {
        user_id: user.id,
        username: user.username.clone(),
    })?;

    info!("Registered {} ({})", user.username, user.id);
    Ok(RegisterResponse {
        user_id: user.id,
        token,
    })
}

pub async fn login_user(state: &AppState, req: LoginRequest) -> Result<LoginResponse, ApiError> {
    let username = req.username.clone();
    let user = with_db(state, move |db| {
        let Some(user) = db.get_user_by_username(&username)? else {
            return Ok(None);
        };
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("corrupt password hash: {}", e))?;
        let valid = Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_ok();
        Ok(valid.then_some(user))
    })
    .await?
    .ok_or_else(|| ApiError::Authentication("invalid username or password".into()))?;

    let token = state.authenticator.issue(&Identity {
        user_id: user.id,
        username: user.username.clone(),
    })?;

    Ok(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = register_user(&state, req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(login_user(&state, req).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let auth = JwtAuthenticator::new("secret", chrono::Duration::days(1));
        let identity = Identity {
            user_id: Uuid::new_v4(),
            username: "alice".into(),
        };

        let token = auth.issue(&identity).unwrap();
        assert_eq!(auth.verify(&token).unwrap(), identity);
    }

    #[test]
    fn foreign_or_expired_tokens_fail() {
        let auth = JwtAuthenticator::new("secret", chrono::Duration::days(1));
        let other = JwtAuthenticator::new("other-secret", chrono::Duration::days(1));
        let expired = JwtAuthenticator::new("secret", chrono::Duration::days(-1));
        let identity = Identity {
            user_id: Uuid::new_v4(),
            username: "alice".into(),
        };

        let foreign = other.issue(&identity).unwrap();
        assert!(matches!(auth.verify(&foreign), Err(ApiError::Authentication(_))));

        let stale = expired.issue(&identity).unwrap();
        assert!(matches!(auth.verify(&stale), Err(ApiError::Authentication(_))));

        assert!(matches!(auth.verify("not-a-jwt"), Err(ApiError::Authentication(_))));
    }

    fn registration(username: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: "someone@example.com".into(),
            password: "correct horse".into(),
        }
    }

    #[test]
    fn username_length_counts_characters() {
        // 32 characters, 64 bytes
        assert!(validate_registration(&registration(&"é".repeat(32))).is_ok());
        assert!(validate_registration(&registration("żółw")).is_ok());

        let too_long = validate_registration(&registration(&"é".repeat(33))).unwrap_err();
        assert!(matches!(too_long, ApiError::Validation(_)));
        let too_short = validate_registration(&registration("ab")).unwrap_err();
        assert!(matches!(too_short, ApiError::Validation(_)));
    }
}
