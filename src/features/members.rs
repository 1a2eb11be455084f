use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Response;
use crate::db::list_members_with_task_counts;
use crate::error::{Failure, Outcome, ValidationError};
use crate::models::FamilyMember;
use crate::pipeline::RequestContext;
use crate::validation::{Rules, Validate};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMember {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Free text such as "Parent" or "Child". Required.
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteMember {
    pub member_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetMembers;

impl Validate for CreateMember {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_empty("first_name", &self.first_name, "First name is required.")
            .max_len("first_name", &self.first_name, 100, "First name must not exceed 100 characters.")
            .not_empty("last_name", &self.last_name, "Last name is required.")
            .max_len("last_name", &self.last_name, 100, "Last name must not exceed 100 characters.")
            .email_opt("email", self.email.as_deref(), "Email is not a valid email address.")
            .not_empty("role", &self.role, "Role is required.")
            .max_len("role", &self.role, 50, "Role must not exceed 50 characters.")
            .finish()
    }
}

impl Validate for DeleteMember {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_nil("member_id", self.member_id, "Member id is required.")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberDto {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub task_count: usize,
}

impl MemberDto {
    fn project(member: FamilyMember, task_count: usize) -> Self {
        Self {
            full_name: member.full_name(),
            id: member.id,
            first_name: member.first_name,
            last_name: member.last_name,
            email: member.email,
            role: member.role,
            created_at: member.created_at,
            task_count,
        }
    }
}

pub(crate) async fn create_member(cmd: &CreateMember, ctx: &mut RequestContext) -> Outcome<Response> {
    let member = FamilyMember::new(
        cmd.first_name.trim().to_string(),
        cmd.last_name.trim().to_string(),
        cmd.email.clone(),
        Some(cmd.role.trim().to_string()),
        ctx.now(),
    );
    let id = member.id;
    ctx.add(member);

    Ok(Response::Created(id))
}

/// Tasks and shopping items that reference the member keep existing with the
/// reference cleared.
pub(crate) async fn delete_member(cmd: &DeleteMember, ctx: &mut RequestContext) -> Outcome<Response> {
    ctx.remove::<FamilyMember>(cmd.member_id)
        .await?
        .ok_or_else(|| Failure::not_found(format!("Member {}", cmd.member_id)))?;

    Ok(Response::Done)
}

pub(crate) async fn get_members(_query: &GetMembers, ctx: &mut RequestContext) -> Outcome<Response> {
    let members = ctx
        .with_conn(list_members_with_task_counts)
        .await?
        .into_iter()
        .map(|(member, task_count)| MemberDto::project(member, task_count))
        .collect();

    Ok(Response::Members(members))
}
