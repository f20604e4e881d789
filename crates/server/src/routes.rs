use axum::Router;

use crate::bootstrap::Application;
use crate::{health, menu, payments, webhook};

pub fn router(app: &Application) -> Router {
    let repositories = &app.repositories;

    let webhook_state = webhook::WebhookState::new(
        app.config.whatsapp.verify_token.clone(),
        repositories.tenants.clone(),
        repositories.processed_messages.clone(),
        app.pipeline.clone(),
    );
    let payment_state = payments::PaymentState::new(
        app.gateway.clone(),
        repositories.tenants.clone(),
        repositories.orders.clone(),
        app.reconciler.clone(),
    );

    let menu_state = menu::MenuState::new(repositories.tenants.clone(), repositories.menus.clone());

    Router::new()
        .merge(health::router(app.db_pool.clone()))
        .merge(menu::router(menu_state))
        .merge(webhook::router(webhook_state))
        .merge(payments::router(payment_state))
}
