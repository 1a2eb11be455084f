use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Response;
use crate::auth::{IdentityError, NewUser};
use crate::error::{Failure, Outcome, ValidationError};
use crate::models::{AppUser, FamilyMember, SessionToken};
use crate::pipeline::RequestContext;
use crate::validation::{Rules, Validate};

pub const INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";

#[derive(Clone, Serialize, Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logout {
    pub token: SessionToken,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Register {
    pub email: String,
    pub display_name: String,
    pub password: String,
    #[serde(default)]
    pub family_member_id: Option<Uuid>,
}

// Passwords stay out of logs
impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login").field("email", &self.email).finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Register")
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("family_member_id", &self.family_member_id)
            .finish_non_exhaustive()
    }
}

impl Validate for Login {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_empty("email", &self.email, "Email is required.")
            .not_empty("password", &self.password, "Password is required.")
            .finish()
    }
}

impl Validate for Logout {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_empty("token", self.token.as_str(), "Session token is required.")
            .finish()
    }
}

impl Validate for Register {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_empty("email", &self.email, "Email is required.")
            .email_opt("email", Some(&self.email), "Email is not a valid email address.")
            .not_empty("display_name", &self.display_name, "Display name is required.")
            .max_len("display_name", &self.display_name, 100, "Display name must not exceed 100 characters.")
            .not_empty("password", &self.password, "Password is required.")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    pub token: SessionToken,
    pub user: AppUser,
}

fn invalid_credentials() -> Failure {
    Failure::invalid(ValidationError::new(
        "email",
        "Invalid email or password.",
        INVALID_CREDENTIALS,
    ))
}

/// Unknown email and wrong password fail the same way.
pub(crate) async fn login(cmd: &Login, ctx: &mut RequestContext) -> Outcome<Response> {
    let identity = ctx.identity();
    let now = ctx.now();
    let email = cmd.email.clone();
    let password = cmd.password.clone();

    let session = ctx
        .with_conn(move |conn| -> anyhow::Result<Option<LoginResponse>> {
            let Some(user) = identity.find_user_by_email(conn, &email)? else {
                return Ok(None);
            };
            if !identity.check_password(conn, &user, &password)? {
                return Ok(None);
            }
            let token = identity.sign_in(conn, &user, now)?;
            Ok(Some(LoginResponse { token, user }))
        })
        .await?;

    match session {
        Some(session) => {
            tracing::info!(user_id = %session.user.id, "User signed in");
            Ok(Response::Session(session))
        }
        None => Err(invalid_credentials()),
    }
}

pub(crate) async fn logout(cmd: &Logout, ctx: &mut RequestContext) -> Outcome<Response> {
    let identity = ctx.identity();
    let token = cmd.token.clone();
    ctx.with_conn(move |conn| identity.sign_out(conn, &token))
        .await?;

    Ok(Response::Done)
}

pub(crate) async fn register(cmd: &Register, ctx: &mut RequestContext) -> Outcome<Response> {
    if let Some(member_id) = cmd.family_member_id {
        if ctx.find::<FamilyMember>(member_id).await?.is_none() {
            return Err(Failure::not_found(format!("Member {member_id}")));
        }
    }

    let identity = ctx.identity();
    let now = ctx.now();
    let new_user = NewUser {
        email: cmd.email.clone(),
        display_name: cmd.display_name.clone(),
        password: cmd.password.clone(),
        family_member_id: cmd.family_member_id,
    };

    let user = ctx
        .with_conn(move |conn| identity.create_user(conn, &new_user, now))
        .await
        .map_err(|e| match e {
            IdentityError::Rejected(errors) => Failure::ValidationFailed(errors),
            IdentityError::Store(e) => Failure::Unexpected(e),
        })?;

    Ok(Response::User(user))
}
