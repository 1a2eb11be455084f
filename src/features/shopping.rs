use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Response;
use crate::db::{list_shopping_items, ShoppingRow};
use crate::error::{Failure, Outcome, ValidationError};
use crate::models::{FamilyMember, ShoppingItem};
use crate::pipeline::RequestContext;
use crate::validation::{Rules, Validate};

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddShoppingItem {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub added_by_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteShoppingItem {
    pub item_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkItemPurchased {
    pub item_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetShoppingList {
    #[serde(default)]
    pub show_purchased: bool,
}

impl Validate for AddShoppingItem {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_empty("name", &self.name, "Name is required.")
            .max_len("name", &self.name, 200, "Name must not exceed 200 characters.")
            .greater_than("quantity", self.quantity, 0, "Quantity must be greater than 0.")
            .at_most(
                "quantity",
                self.quantity,
                i64::from(u32::MAX),
                "Quantity is too large.",
            )
            .max_len_opt(
                "category",
                self.category.as_deref(),
                100,
                "Category must not exceed 100 characters.",
            )
            .finish()
    }
}

impl Validate for DeleteShoppingItem {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_nil("item_id", self.item_id, "Item id is required.")
            .finish()
    }
}

impl Validate for MarkItemPurchased {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_nil("item_id", self.item_id, "Item id is required.")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShoppingItemDto {
    pub id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub is_purchased: bool,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub added_by_id: Option<Uuid>,
    pub added_by_name: Option<String>,
}

impl From<ShoppingRow> for ShoppingItemDto {
    fn from(row: ShoppingRow) -> Self {
        let ShoppingRow {
            item,
            added_by_name,
        } = row;
        Self {
            id: item.id,
            is_purchased: item.is_purchased(),
            name: item.name,
            quantity: item.quantity,
            category: item.category,
            created_at: item.created_at,
            added_by_id: item.added_by_id,
            added_by_name,
        }
    }
}

fn item_not_found(id: Uuid) -> Failure {
    Failure::not_found(format!("Shopping item {id}"))
}

pub(crate) async fn add_shopping_item(
    cmd: &AddShoppingItem,
    ctx: &mut RequestContext,
) -> Outcome<Response> {
    if let Some(member_id) = cmd.added_by_id {
        if ctx.find::<FamilyMember>(member_id).await?.is_none() {
            return Err(Failure::not_found(format!("Member {member_id}")));
        }
    }

    let quantity = u32::try_from(cmd.quantity).map_err(|e| Failure::Unexpected(e.into()))?;
    let category = cmd
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let item = ShoppingItem::new(
        cmd.name.trim().to_string(),
        quantity,
        category,
        cmd.added_by_id,
        ctx.now(),
    );
    let id = item.id;
    ctx.add(item);

    Ok(Response::Created(id))
}

pub(crate) async fn delete_shopping_item(
    cmd: &DeleteShoppingItem,
    ctx: &mut RequestContext,
) -> Outcome<Response> {
    ctx.remove::<ShoppingItem>(cmd.item_id)
        .await?
        .ok_or_else(|| item_not_found(cmd.item_id))?;

    Ok(Response::Done)
}

/// Marking an item that is already purchased succeeds and writes nothing.
pub(crate) async fn mark_item_purchased(
    cmd: &MarkItemPurchased,
    ctx: &mut RequestContext,
) -> Outcome<Response> {
    let item = ctx
        .find::<ShoppingItem>(cmd.item_id)
        .await?
        .ok_or_else(|| item_not_found(cmd.item_id))?;

    item.mark_as_purchased();
    Ok(Response::Done)
}

pub(crate) async fn get_shopping_list(
    query: &GetShoppingList,
    ctx: &mut RequestContext,
) -> Outcome<Response> {
    let include_purchased = query.show_purchased;
    let items = ctx
        .with_conn(move |conn| list_shopping_items(conn, include_purchased))
        .await?
        .into_iter()
        .map(ShoppingItemDto::from)
        .collect();

    Ok(Response::ShoppingList(items))
}
