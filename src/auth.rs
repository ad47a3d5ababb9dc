use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar};
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::{error::AppError, models::user::User, state::AppState};

pub const SESSION_COOKIE: &str = "wayfare_session";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub uuid: String,
    pub username: String,
}

#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // `AppState` itself also implements `FromRef<AppState>`, so the
        // jar's key type has to be spelled out.
        let jar: PrivateCookieJar = match PrivateCookieJar::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(err) => match err {},
        };
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(Self(None));
        };

        let user = sqlx::query_as::<_, AuthenticatedUser>(
            "SELECT u.id, u.uuid, u.username
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.id = ?",
        )
        .bind(cookie.value())
        .fetch_optional(&state.db)
        .await?;

        if user.is_some() {
            sqlx::query("UPDATE sessions SET last_seen_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(cookie.value())
                .execute(&state.db)
                .await?;
        }

        Ok(Self(user))
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }
}

pub async fn register_user(
    state: &AppState,
    username: &str,
    email: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let username = username.trim();
    let email = email.trim();
    if username.is_empty() || email.is_empty() {
        return Err(AppError::BadRequest(
            "Benutzername und E-Mail dürfen nicht leer sein.".into(),
        ));
    }
    if password.len() < 8 {
        return Err(AppError::BadRequest(
            "Das Passwort braucht mindestens 8 Zeichen.".into(),
        ));
    }

    let taken: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ? OR email = ?")
            .bind(username)
            .bind(email)
            .fetch_one(&state.db)
            .await?;
    if taken > 0 {
        return Err(AppError::BadRequest(
            "Benutzername oder E-Mail ist schon vergeben.".into(),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AppError::Other(anyhow::anyhow!("password hashing failed: {err}")))?
        .to_string();

    let uuid = Uuid::new_v4().to_string();
    let result = sqlx::query(
        "INSERT INTO users (uuid, username, email, password_hash, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&uuid)
    .bind(username)
    .bind(email)
    .bind(&password_hash)
    .bind(Utc::now())
    .execute(&state.db)
    .await?;

    Ok(AuthenticatedUser {
        id: result.last_insert_rowid(),
        uuid,
        username: username.to_string(),
    })
}

pub async fn authenticate_user(
    state: &AppState,
    identifier: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let Some(user) =
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ? OR email = ?")
            .bind(identifier.trim())
            .bind(identifier.trim())
            .fetch_optional(&state.db)
            .await?
    else {
        return Err(AppError::Unauthorized);
    };

    let parsed = PasswordHash::new(&user.password_hash)
        .map_err(|err| AppError::Other(anyhow::anyhow!("stored hash unreadable: {err}")))?;
    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_err()
    {
        warn!(identifier = %identifier, "failed login attempt");
        return Err(AppError::Unauthorized);
    }

    sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(user.id)
        .execute(&state.db)
        .await?;

    Ok(AuthenticatedUser {
        id: user.id,
        uuid: user.uuid,
        username: user.username,
    })
}

pub async fn create_session(state: &AppState, user_id: i64) -> Result<String, AppError> {
    let session_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query("INSERT INTO sessions (id, user_id, created_at, last_seen_at) VALUES (?, ?, ?, ?)")
        .bind(&session_id)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(&state.db)
        .await?;
    Ok(session_id)
}

pub async fn destroy_session(state: &AppState, session_id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(session_id)
        .execute(&state.db)
        .await?;
    Ok(())
}

pub fn apply_session_cookie(jar: PrivateCookieJar, session_id: &str) -> PrivateCookieJar {
    let cookie = Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .build();
    jar.add(cookie)
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    jar.remove(cookie)
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, path::PathBuf};

    use axum::http::Request;

    use super::*;
    use crate::{config::AppConfig, db::init_pool, services::store::TripStore, state::AppState};

    async fn test_state() -> AppState {
        let config = AppConfig {
            database_url: "sqlite::memory:".into(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            store_root: PathBuf::from("store"),
            cookie_secret: "test-cookie-secret".into(),
        };
        let db = init_pool(&config.database_url).await.expect("pool");
        let store = TripStore::new(config.store_root.clone());
        AppState::new(config, db, store)
    }

    #[tokio::test]
    async fn request_without_session_cookie_is_anonymous() {
        let state = test_state().await;
        let (mut parts, _) = Request::builder()
            .uri("/me")
            .body(())
            .expect("request")
            .into_parts();

        let current = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .expect("extract");
        assert!(current.0.is_none());
        assert!(current.require_user().is_err());
    }
}
