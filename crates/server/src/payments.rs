//! Card payment routes.
//!
//! - `GET  /api/v1/payments/checkout`      auto-submitting gateway form (HTML)
//! - `POST /api/v1/payments/notification`  gateway callback (form-encoded)

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use comanda_core::domain::order::{round_currency, OrderNumber, OrderStatus};
use comanda_core::domain::tenant::TenantId;
use comanda_core::errors::ApplicationError;
use comanda_core::payment::RedsysGateway;
use comanda_core::reconciliation::Settlement;
use comanda_db::repositories::{OrderRepository, TenantRepository};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::HttpError;
use crate::reconciliation::Reconciler;

pub const CHECKOUT_PATH: &str = "/api/v1/payments/checkout";
pub const NOTIFICATION_PATH: &str = "/api/v1/payments/notification";

const CHECKOUT_TEMPLATE: &str = "checkout.html";
const CHECKOUT_ERROR_TEMPLATE: &str = "checkout_error.html";

#[derive(Clone)]
pub struct PaymentState {
    gateway: Arc<RedsysGateway>,
    tenants: Arc<dyn TenantRepository>,
    orders: Arc<dyn OrderRepository>,
    reconciler: Arc<Reconciler>,
    templates: Arc<Tera>,
}

impl PaymentState {
    pub fn new(
        gateway: Arc<RedsysGateway>,
        tenants: Arc<dyn TenantRepository>,
        orders: Arc<dyn OrderRepository>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self { gateway, tenants, orders, reconciler, templates: init_templates() }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutQuery {
    pub order_number: String,
    pub amount: String,
    pub tenant_id: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct NotificationReceipt {
    pub status: &'static str,
}

pub fn init_templates() -> Arc<Tera> {
    let mut tera = Tera::default();
    if let Err(error) = tera.add_raw_templates(vec![
        (CHECKOUT_TEMPLATE, include_str!("../../../templates/payment/checkout.html")),
        (CHECKOUT_ERROR_TEMPLATE, include_str!("../../../templates/payment/checkout_error.html")),
    ]) {
        error!(
            event_name = "system.templates.invalid",
            error = %error,
            "payment templates failed to compile"
        );
    }
    Arc::new(tera)
}

pub fn router(state: PaymentState) -> Router {
    Router::new()
        .route(CHECKOUT_PATH, get(checkout))
        .route(NOTIFICATION_PATH, post(notification))
        .with_state(state)
}

type PageError = (StatusCode, Html<String>);

/// Renders the signed form for a pending order. The query amount must match
/// the ledger total; the ledger is what gets signed.
pub async fn checkout(
    State(state): State<PaymentState>,
    Query(query): Query<CheckoutQuery>,
) -> Result<Html<String>, PageError> {
    let bad_request =
        |message: &str| error_page(&state.templates, StatusCode::BAD_REQUEST, message);

    let tenant_id = TenantId::from_str(&query.tenant_id)
        .map_err(|_| bad_request("El enlace de pago no es válido."))?;
    let order_number = OrderNumber::parse(&query.order_number)
        .ok_or_else(|| bad_request("El enlace de pago no es válido."))?;
    let amount = parse_amount(&query.amount)
        .ok_or_else(|| bad_request("El importe del enlace no es válido."))?;

    let unavailable = |error: &dyn std::fmt::Display| {
        error!(
            event_name = "payment.checkout.lookup_failed",
            tenant_id = %tenant_id,
            order_number = %order_number,
            error = %error,
            "checkout lookup failed"
        );
        error_page(
            &state.templates,
            StatusCode::SERVICE_UNAVAILABLE,
            "No podemos procesar el pago ahora mismo. Inténtalo de nuevo en unos minutos.",
        )
    };

    let tenant = state
        .tenants
        .find_by_id(tenant_id)
        .await
        .map_err(|error| unavailable(&error))?
        .ok_or_else(|| not_found(&state.templates))?;
    let order = state
        .orders
        .find_by_number(tenant_id, &order_number)
        .await
        .map_err(|error| unavailable(&error))?
        .ok_or_else(|| not_found(&state.templates))?;

    if order.status != OrderStatus::Pending {
        warn!(
            event_name = "payment.checkout.not_pending",
            tenant_id = %tenant_id,
            order_number = %order_number,
            status = order.status.as_str(),
            "checkout requested for a settled order"
        );
        return Err(error_page(
            &state.templates,
            StatusCode::CONFLICT,
            "Este pedido ya no está pendiente de pago.",
        ));
    }
    if round_currency(amount) != round_currency(order.total) {
        warn!(
            event_name = "payment.checkout.amount_mismatch",
            tenant_id = %tenant_id,
            order_number = %order_number,
            requested = %amount,
            recorded = %order.total,
            "checkout amount does not match the ledger"
        );
        return Err(bad_request("El importe no coincide con el del pedido."));
    }

    let redirect = state
        .gateway
        .build_redirect(
            &order.order_number,
            order.total,
            tenant.id,
            tenant.merchant_code.as_deref(),
        )
        .map_err(|error| unavailable(&error))?;

    let mut context = Context::new();
    context.insert("order_number", order.order_number.as_str());
    context.insert("total", &format!("{:.2}", round_currency(order.total)));
    context.insert("gateway_url", &redirect.redirect_url);
    context.insert("signature_version", &redirect.fields.signature_version);
    context.insert("merchant_parameters", &redirect.fields.merchant_parameters);
    context.insert("signature", &redirect.fields.signature);

    let html = state.templates.render(CHECKOUT_TEMPLATE, &context).map_err(|error| {
        error!(event_name = "payment.checkout.render_failed", error = %error, "render failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>Error</h1>".to_string()))
    })?;

    info!(
        event_name = "payment.checkout.rendered",
        tenant_id = %tenant_id,
        order_number = %order_number,
        "checkout form issued"
    );
    Ok(Html(html))
}

/// Gateway callback. Unsigned or tampered bodies are rejected before any
/// merchant data is read.
pub async fn notification(
    State(state): State<PaymentState>,
    body: String,
) -> Result<(StatusCode, Json<NotificationReceipt>), HttpError> {
    let correlation_id = Uuid::new_v4().to_string();

    let callback = state.gateway.parse_notification(&body).map_err(|error| {
        warn!(
            event_name = "payment.notification.rejected",
            correlation_id = %correlation_id,
            error = %error,
            "payment notification failed verification"
        );
        HttpError::new(error.into(), &correlation_id)
    })?;

    let settlement = state.reconciler.apply(&callback).await.map_err(|error| {
        error!(
            event_name = "payment.notification.failed",
            correlation_id = %correlation_id,
            tenant_id = %callback.tenant_id,
            order_number = %callback.order_number,
            error = %error,
            "payment notification could not be applied"
        );
        HttpError::new(error, &correlation_id)
    })?;

    let status = match settlement {
        None => "ignored",
        Some(Settlement::Applied(_)) => "processed",
        Some(Settlement::AlreadySettled(_)) => "duplicate",
        Some(Settlement::NotFound) => {
            warn!(
                event_name = "payment.notification.unknown_order",
                correlation_id = %correlation_id,
                tenant_id = %callback.tenant_id,
                order_number = %callback.order_number,
                "notification for an order the ledger does not have"
            );
            return Err(HttpError::new(
                ApplicationError::NotFound(format!("order {}", callback.order_number)),
                &correlation_id,
            ));
        }
    };

    Ok((StatusCode::OK, Json(NotificationReceipt { status })))
}

// Accepts `20.00` and `20,00`.
fn parse_amount(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.trim().replace(',', ".")).ok().filter(|amount| *amount > Decimal::ZERO)
}

fn not_found(templates: &Tera) -> PageError {
    error_page(templates, StatusCode::NOT_FOUND, "No encontramos el pedido de este enlace.")
}

fn error_page(templates: &Tera, status: StatusCode, message: &str) -> PageError {
    let mut context = Context::new();
    context.insert("message", message);
    let html = templates
        .render(CHECKOUT_ERROR_TEMPLATE, &context)
        .unwrap_or_else(|_| format!("<h1>{message}</h1>"));
    (status, Html(html))
}
