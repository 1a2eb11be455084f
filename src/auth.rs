//! Identity provider: user accounts, password checks and sessions.
//!
//! Every method takes the connection to use, so account changes made by a
//! command share that command's transaction and roll back with it.

use anyhow::{anyhow, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{parse_datetime, parse_uuid, parse_uuid_opt};
use crate::error::ValidationError;
use crate::models::{AppUser, SessionToken};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Details for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub family_member_id: Option<Uuid>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The provider refused the account. Each entry says why.
    #[error("user rejected ({} error(s))", .0.len())]
    Rejected(Vec<ValidationError>),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for IdentityError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.into())
    }
}

pub trait AuthProvider: Send + Sync {
    fn find_user_by_email(&self, conn: &Connection, email: &str) -> Result<Option<AppUser>>;

    fn check_password(&self, conn: &Connection, user: &AppUser, password: &str) -> Result<bool>;

    fn create_user(
        &self,
        conn: &Connection,
        user: &NewUser,
        now: DateTime<Utc>,
    ) -> Result<AppUser, IdentityError>;

    fn sign_in(&self, conn: &Connection, user: &AppUser, now: DateTime<Utc>) -> Result<SessionToken>;

    /// Signing out an unknown token is not an error.
    fn sign_out(&self, conn: &Connection, token: &SessionToken) -> Result<()>;

    /// Resolve a session token to the signed-in user.
    fn authenticate(&self, conn: &Connection, token: &SessionToken) -> Result<Option<AppUser>>;
}

/// Accounts in the `users` table with Argon2id password hashes stored as PHC
/// strings, and sessions in `auth_sessions`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteIdentity;

const USER_COLUMNS: &str = "u.id, u.email, u.display_name, u.family_member_id, u.created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<AppUser> {
    Ok(AppUser {
        id: parse_uuid(row, 0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        family_member_id: parse_uuid_opt(row, 3)?,
        created_at: parse_datetime(row, 4)?,
    })
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| anyhow!("Stored password hash is malformed: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

impl AuthProvider for SqliteIdentity {
    fn find_user_by_email(&self, conn: &Connection, email: &str) -> Result<Option<AppUser>> {
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?"),
                [email.trim()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn check_password(&self, conn: &Connection, user: &AppUser, password: &str) -> Result<bool> {
        let stored: Option<String> = conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?",
                [user.id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(hash) => verify_password(password, &hash),
            None => Ok(false),
        }
    }

    fn create_user(
        &self,
        conn: &Connection,
        user: &NewUser,
        now: DateTime<Utc>,
    ) -> Result<AppUser, IdentityError> {
        let mut errors = Vec::new();
        if user.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.push(ValidationError::new(
                "password",
                format!("Password must be at least {MIN_PASSWORD_LENGTH} characters."),
                "PASSWORD_TOO_SHORT",
            ));
        }
        if self.find_user_by_email(conn, &user.email)?.is_some() {
            errors.push(ValidationError::new(
                "email",
                format!("Email '{}' is already taken.", user.email.trim()),
                "DUPLICATE_EMAIL",
            ));
        }
        if !errors.is_empty() {
            return Err(IdentityError::Rejected(errors));
        }

        let created = AppUser {
            id: Uuid::new_v4(),
            email: user.email.trim().to_string(),
            display_name: user.display_name.trim().to_string(),
            family_member_id: user.family_member_id,
            created_at: now,
        };
        let password_hash = hash_password(&user.password)?;

        conn.execute(
            "INSERT INTO users (id, email, display_name, password_hash, family_member_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                created.id.to_string(),
                &created.email,
                &created.display_name,
                password_hash,
                created.family_member_id.map(|id| id.to_string()),
                created.created_at.to_rfc3339(),
            ),
        )?;

        tracing::info!(user_id = %created.id, "Registered user");
        Ok(created)
    }

    fn sign_in(&self, conn: &Connection, user: &AppUser, now: DateTime<Utc>) -> Result<SessionToken> {
        let token = SessionToken::generate();
        conn.execute(
            "INSERT INTO auth_sessions (token, user_id, created_at) VALUES (?, ?, ?)",
            (token.as_str(), user.id.to_string(), now.to_rfc3339()),
        )?;
        Ok(token)
    }

    fn sign_out(&self, conn: &Connection, token: &SessionToken) -> Result<()> {
        conn.execute("DELETE FROM auth_sessions WHERE token = ?", [token.as_str()])?;
        Ok(())
    }

    fn authenticate(&self, conn: &Connection, token: &SessionToken) -> Result<Option<AppUser>> {
        let user = conn
            .query_row(
                &format!(
                    "SELECT {USER_COLUMNS} FROM auth_sessions s
                     JOIN users u ON u.id = s.user_id
                     WHERE s.token = ?"
                ),
                [token.as_str()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::run_migrations(&conn).unwrap();
        conn
    }

    fn alice() -> NewUser {
        NewUser {
            email: "alice@example.com".to_string(),
            display_name: "Alice".to_string(),
            password: "correct horse".to_string(),
            family_member_id: None,
        }
    }

    #[test]
    fn password_is_stored_as_an_argon2_phc_string() {
        let conn = setup();
        let identity = SqliteIdentity;
        let user = identity.create_user(&conn, &alice(), Utc::now()).unwrap();

        assert!(identity.check_password(&conn, &user, "correct horse").unwrap());
        assert!(!identity.check_password(&conn, &user, "wrong horse").unwrap());

        let hash: String = conn
            .query_row("SELECT password_hash FROM users", [], |row| row.get(0))
            .unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("correct horse"));
        assert!(PasswordHash::new(&hash).is_ok());
    }

    #[test]
    fn same_password_hashes_differently_per_user() {
        let conn = setup();
        let identity = SqliteIdentity;
        identity.create_user(&conn, &alice(), Utc::now()).unwrap();
        let mut bob = alice();
        bob.email = "bob@example.com".to_string();
        identity.create_user(&conn, &bob, Utc::now()).unwrap();

        let hashes: Vec<String> = conn
            .prepare("SELECT password_hash FROM users")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(hashes.len(), 2);
        assert_ne!(hashes[0], hashes[1]);
    }

    #[test]
    fn malformed_stored_hash_is_an_error_not_a_match() {
        let conn = setup();
        let identity = SqliteIdentity;
        let user = identity.create_user(&conn, &alice(), Utc::now()).unwrap();
        conn.execute("UPDATE users SET password_hash = 'not-a-phc-string'", [])
            .unwrap();

        assert!(identity.check_password(&conn, &user, "correct horse").is_err());
    }

    #[test]
    fn rejects_short_password_and_duplicate_email() {
        let conn = setup();
        let identity = SqliteIdentity;
        identity.create_user(&conn, &alice(), Utc::now()).unwrap();

        let mut again = alice();
        again.email = "ALICE@example.com".to_string();
        again.password = "short".to_string();

        match identity.create_user(&conn, &again, Utc::now()) {
            Err(IdentityError::Rejected(errors)) => {
                let codes: Vec<_> = errors.iter().map(|e| e.code.as_str()).collect();
                assert_eq!(codes, vec!["PASSWORD_TOO_SHORT", "DUPLICATE_EMAIL"]);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn sessions_resolve_until_signed_out() {
        let conn = setup();
        let identity = SqliteIdentity;
        let user = identity.create_user(&conn, &alice(), Utc::now()).unwrap();

        let token = identity.sign_in(&conn, &user, Utc::now()).unwrap();
        let resolved = identity.authenticate(&conn, &token).unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        identity.sign_out(&conn, &token).unwrap();
        assert!(identity.authenticate(&conn, &token).unwrap().is_none());
        identity.sign_out(&conn, &token).unwrap();
    }
}
