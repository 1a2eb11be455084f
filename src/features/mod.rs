//! Commands, queries and their handlers.
//!
//! Each use case is a request struct, an optional [`Validate`] impl and one
//! handler function. [`Request`] is the closed set of everything the pipeline
//! accepts: commands change state and run inside a transaction, queries only
//! read.

pub mod auth;
pub mod members;
pub mod shopping;
pub mod tasks;

use uuid::Uuid;

use crate::error::{Outcome, ValidationError};
use crate::models::AppUser;
use crate::pipeline::RequestContext;
use crate::validation::Validate;

pub use auth::{Login, LoginResponse, Logout, Register};
pub use members::{CreateMember, DeleteMember, GetMembers, MemberDto};
pub use shopping::{
    AddShoppingItem, DeleteShoppingItem, GetShoppingList, MarkItemPurchased, ShoppingItemDto,
};
pub use tasks::{
    ChangeTaskPriority, CompleteTask, CreateTask, DeleteTask, GetTaskById, GetTasks,
    PriorityDirection, TaskDetailDto, TaskDto,
};

#[derive(Debug, Clone)]
pub enum Request {
    Command(Command),
    Query(Query),
}

#[derive(Debug, Clone)]
pub enum Command {
    CreateTask(CreateTask),
    CompleteTask(CompleteTask),
    DeleteTask(DeleteTask),
    ChangeTaskPriority(ChangeTaskPriority),
    CreateMember(CreateMember),
    DeleteMember(DeleteMember),
    AddShoppingItem(AddShoppingItem),
    DeleteShoppingItem(DeleteShoppingItem),
    MarkItemPurchased(MarkItemPurchased),
    Login(Login),
    Logout(Logout),
    Register(Register),
}

#[derive(Debug, Clone)]
pub enum Query {
    GetTasks(GetTasks),
    GetTaskById(GetTaskById),
    GetMembers(GetMembers),
    GetShoppingList(GetShoppingList),
}

/// What a handler hands back on success.
#[derive(Debug, Clone)]
pub enum Response {
    Created(Uuid),
    Done,
    Task(TaskDetailDto),
    Tasks(Vec<TaskDto>),
    Members(Vec<MemberDto>),
    ShoppingList(Vec<ShoppingItemDto>),
    Session(LoginResponse),
    User(AppUser),
}

impl Request {
    pub fn is_command(&self) -> bool {
        matches!(self, Self::Command(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Command(command) => match command {
                Command::CreateTask(_) => "CreateTask",
                Command::CompleteTask(_) => "CompleteTask",
                Command::DeleteTask(_) => "DeleteTask",
                Command::ChangeTaskPriority(_) => "ChangeTaskPriority",
                Command::CreateMember(_) => "CreateMember",
                Command::DeleteMember(_) => "DeleteMember",
                Command::AddShoppingItem(_) => "AddShoppingItem",
                Command::DeleteShoppingItem(_) => "DeleteShoppingItem",
                Command::MarkItemPurchased(_) => "MarkItemPurchased",
                Command::Login(_) => "Login",
                Command::Logout(_) => "Logout",
                Command::Register(_) => "Register",
            },
            Self::Query(query) => match query {
                Query::GetTasks(_) => "GetTasks",
                Query::GetTaskById(_) => "GetTaskById",
                Query::GetMembers(_) => "GetMembers",
                Query::GetShoppingList(_) => "GetShoppingList",
            },
        }
    }

    /// Structural checks only. Requests without rules always pass.
    pub fn validate(&self) -> Vec<ValidationError> {
        match self {
            Self::Command(command) => match command {
                Command::CreateTask(c) => c.validate(),
                Command::CompleteTask(c) => c.validate(),
                Command::DeleteTask(c) => c.validate(),
                Command::ChangeTaskPriority(c) => c.validate(),
                Command::CreateMember(c) => c.validate(),
                Command::DeleteMember(c) => c.validate(),
                Command::AddShoppingItem(c) => c.validate(),
                Command::DeleteShoppingItem(c) => c.validate(),
                Command::MarkItemPurchased(c) => c.validate(),
                Command::Login(c) => c.validate(),
                Command::Logout(c) => c.validate(),
                Command::Register(c) => c.validate(),
            },
            Self::Query(query) => match query {
                Query::GetTaskById(q) => q.validate(),
                Query::GetTasks(_) | Query::GetMembers(_) | Query::GetShoppingList(_) => {
                    Vec::new()
                }
            },
        }
    }
}

/// Route a request to its handler.
pub(crate) async fn handle(request: &Request, ctx: &mut RequestContext) -> Outcome<Response> {
    match request {
        Request::Command(command) => match command {
            Command::CreateTask(c) => tasks::create_task(c, ctx).await,
            Command::CompleteTask(c) => tasks::complete_task(c, ctx).await,
            Command::DeleteTask(c) => tasks::delete_task(c, ctx).await,
            Command::ChangeTaskPriority(c) => tasks::change_task_priority(c, ctx).await,
            Command::CreateMember(c) => members::create_member(c, ctx).await,
            Command::DeleteMember(c) => members::delete_member(c, ctx).await,
            Command::AddShoppingItem(c) => shopping::add_shopping_item(c, ctx).await,
            Command::DeleteShoppingItem(c) => shopping::delete_shopping_item(c, ctx).await,
            Command::MarkItemPurchased(c) => shopping::mark_item_purchased(c, ctx).await,
            Command::Login(c) => auth::login(c, ctx).await,
            Command::Logout(c) => auth::logout(c, ctx).await,
            Command::Register(c) => auth::register(c, ctx).await,
        },
        Request::Query(query) => match query {
            Query::GetTasks(q) => tasks::get_tasks(q, ctx).await,
            Query::GetTaskById(q) => tasks::get_task_by_id(q, ctx).await,
            Query::GetMembers(q) => members::get_members(q, ctx).await,
            Query::GetShoppingList(q) => shopping::get_shopping_list(q, ctx).await,
        },
    }
}

/// A typed request: converts into a [`Request`] and knows which [`Response`]
/// variant carries its result.
pub trait Message: Into<Request> {
    type Output;

    fn extract(response: Response) -> Option<Self::Output>;
}

macro_rules! message {
    ($kind:ident :: $variant:ident => Done) => {
        impl From<$variant> for Request {
            fn from(message: $variant) -> Self {
                Request::$kind($kind::$variant(message))
            }
        }

        impl Message for $variant {
            type Output = ();

            fn extract(response: Response) -> Option<()> {
                matches!(response, Response::Done).then_some(())
            }
        }
    };
    ($kind:ident :: $variant:ident => $response:ident($output:ty)) => {
        impl From<$variant> for Request {
            fn from(message: $variant) -> Self {
                Request::$kind($kind::$variant(message))
            }
        }

        impl Message for $variant {
            type Output = $output;

            fn extract(response: Response) -> Option<$output> {
                match response {
                    Response::$response(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

message!(Command::CreateTask => Created(Uuid));
message!(Command::CompleteTask => Done);
message!(Command::DeleteTask => Done);
message!(Command::ChangeTaskPriority => Done);
message!(Command::CreateMember => Created(Uuid));
message!(Command::DeleteMember => Done);
message!(Command::AddShoppingItem => Created(Uuid));
message!(Command::DeleteShoppingItem => Done);
message!(Command::MarkItemPurchased => Done);
message!(Command::Login => Session(LoginResponse));
message!(Command::Logout => Done);
message!(Command::Register => User(AppUser));
message!(Query::GetTasks => Tasks(Vec<TaskDto>));
message!(Query::GetTaskById => Task(TaskDetailDto));
message!(Query::GetMembers => Members(Vec<MemberDto>));
message!(Query::GetShoppingList => ShoppingList(Vec<ShoppingItemDto>));
