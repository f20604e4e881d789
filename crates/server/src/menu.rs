//! Catalog upload.
//!
//! - `POST /api/v1/menu/upload`  merges a tenant's menu into the catalog (JSON)
//!
//! Sessions already open keep the menu snapshot they started with; only new
//! sessions see the uploaded catalog.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use comanda_core::domain::menu::{MenuCategory, MenuExtra, MenuItem, MenuSnapshot};
use comanda_core::domain::tenant::TenantId;
use comanda_core::errors::ApplicationError;
use comanda_db::repositories::{MenuRepository, TenantRepository};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::HttpError;

pub const MENU_UPLOAD_PATH: &str = "/api/v1/menu/upload";

#[derive(Clone)]
pub struct MenuState {
    tenants: Arc<dyn TenantRepository>,
    menus: Arc<dyn MenuRepository>,
}

impl MenuState {
    pub fn new(tenants: Arc<dyn TenantRepository>, menus: Arc<dyn MenuRepository>) -> Self {
        Self { tenants, menus }
    }
}

#[derive(Debug, Deserialize)]
pub struct MenuUpload {
    pub tenant_id: i64,
    pub categories: Vec<CategoryUpload>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryUpload {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ItemUpload>,
}

#[derive(Debug, Deserialize)]
pub struct ItemUpload {
    pub name: String,
    #[serde(default)]
    pub ingredients: Option<String>,
    pub price: Decimal,
    #[serde(default = "available_by_default")]
    pub available: bool,
    #[serde(default)]
    pub extras: Vec<ExtraUpload>,
}

#[derive(Debug, Deserialize)]
pub struct ExtraUpload {
    pub name: String,
    pub price: Decimal,
    #[serde(default = "available_by_default")]
    pub available: bool,
}

fn available_by_default() -> bool {
    true
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct MenuUploadReceipt {
    pub status: &'static str,
    pub categories_created: u64,
    pub items_created: u64,
    pub extras_created: u64,
}

pub fn router(state: MenuState) -> Router {
    Router::new().route(MENU_UPLOAD_PATH, post(upload_menu)).with_state(state)
}

pub async fn upload_menu(
    State(state): State<MenuState>,
    Json(upload): Json<MenuUpload>,
) -> Result<(StatusCode, Json<MenuUploadReceipt>), HttpError> {
    let correlation_id = Uuid::new_v4().to_string();
    let tenant_id = TenantId(upload.tenant_id);

    let rejected = |error: ApplicationError| {
        warn!(
            event_name = "menu.upload.rejected",
            correlation_id = %correlation_id,
            tenant_id = %tenant_id,
            error = %error,
            "menu upload rejected"
        );
        HttpError::new(error, &correlation_id)
    };

    let tenant =
        state.tenants.find_by_id(tenant_id).await.map_err(|error| rejected(error.into()))?;
    if tenant.is_none() {
        return Err(rejected(ApplicationError::Validation(format!("unknown tenant {tenant_id}"))));
    }

    let menu = into_snapshot(upload).map_err(&rejected)?;
    let summary =
        state.menus.upsert(tenant_id, &menu).await.map_err(|error| rejected(error.into()))?;

    info!(
        event_name = "menu.upload.applied",
        correlation_id = %correlation_id,
        tenant_id = %tenant_id,
        categories_created = summary.categories_created,
        items_created = summary.items_created,
        extras_created = summary.extras_created,
        "menu merged into catalog"
    );

    Ok((
        StatusCode::CREATED,
        Json(MenuUploadReceipt {
            status: "ok",
            categories_created: summary.categories_created,
            items_created: summary.items_created,
            extras_created: summary.extras_created,
        }),
    ))
}

fn into_snapshot(upload: MenuUpload) -> Result<MenuSnapshot, ApplicationError> {
    let mut categories = Vec::with_capacity(upload.categories.len());
    for category in upload.categories {
        let name = required_name("category", category.name)?;
        let mut items = Vec::with_capacity(category.items.len());
        for item in category.items {
            let item_name = required_name("item", item.name)?;
            let price = non_negative(&item_name, item.price)?;
            let mut extras = Vec::with_capacity(item.extras.len());
            for extra in item.extras {
                let extra_name = required_name("extra", extra.name)?;
                extras.push(MenuExtra {
                    price: non_negative(&extra_name, extra.price)?,
                    name: extra_name,
                    available: extra.available,
                });
            }
            items.push(MenuItem {
                name: item_name,
                ingredients: item.ingredients.filter(|value| !value.trim().is_empty()),
                price,
                available: item.available,
                extras,
            });
        }
        categories.push(MenuCategory { name, items });
    }
    Ok(MenuSnapshot(categories))
}

fn required_name(kind: &str, name: String) -> Result<String, ApplicationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApplicationError::Validation(format!("{kind} name must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn non_negative(name: &str, price: Decimal) -> Result<Decimal, ApplicationError> {
    if price.is_sign_negative() {
        return Err(ApplicationError::Validation(format!("price of `{name}` is negative")));
    }
    Ok(price)
}
