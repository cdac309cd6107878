pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::export::handlers as export_handlers;
use crate::generation::handlers as generation_handlers;
use crate::intake::handlers as intake_handlers;
use crate::orders::{admin, checkout, webhook};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Intake & kits
        .route("/api/v1/kits", post(intake_handlers::handle_create_kit))
        .route(
            "/api/v1/kits/express",
            post(intake_handlers::handle_create_kit_express),
        )
        .route("/api/v1/kits/:id", get(intake_handlers::handle_get_kit))
        .route(
            "/api/v1/kits/:id/sections/:section/regenerate",
            post(generation_handlers::handle_regenerate_section),
        )
        // Orders & payments
        .route("/api/v1/checkout", post(checkout::handle_create_checkout))
        .route(
            "/api/v1/webhooks/payments",
            post(webhook::handle_payment_webhook),
        )
        // Exports
        .route(
            "/api/v1/kits/:id/export",
            post(export_handlers::handle_create_export),
        )
        .route(
            "/api/v1/exports/jobs/:id",
            get(export_handlers::handle_job_status),
        )
        // Admin review surface
        .route("/api/v1/admin/kits/:id", get(admin::handle_admin_get_kit))
        .route(
            "/api/v1/admin/kits/:id/sections/:section",
            patch(admin::handle_admin_edit_section),
        )
        .route(
            "/api/v1/admin/kits/:id/approve",
            post(admin::handle_admin_approve),
        )
        .route(
            "/api/v1/admin/orders/:id/mark-paid",
            post(admin::handle_admin_mark_paid),
        )
        .route(
            "/api/v1/admin/orders/:id/notes",
            post(admin::handle_admin_add_note),
        )
        .route(
            "/api/v1/admin/orders/:id/resend-email",
            post(admin::handle_admin_resend_email),
        )
        .with_state(state)
}
