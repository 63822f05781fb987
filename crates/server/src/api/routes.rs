use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::middleware::metrics_middleware;
use super::{automation, comments, handlers, tickets};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Tickets
        .route(
            "/tickets",
            get(tickets::list_tickets).post(tickets::create_ticket),
        )
        .route(
            "/tickets/{number}",
            get(tickets::get_ticket)
                .put(tickets::update_ticket)
                .delete(tickets::delete_ticket),
        )
        // Hierarchy
        .route("/tickets/{number}/parent", put(tickets::set_parent))
        .route("/tickets/{number}/children", post(tickets::add_child))
        .route("/tickets/{number}/sync", post(tickets::sync_ticket))
        // Comments
        .route(
            "/tickets/{number}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/comments/{id}",
            put(comments::update_comment).delete(comments::delete_comment),
        )
        // Automation
        .route(
            "/tickets/{number}/automation",
            get(automation::get_automation)
                .post(automation::start_automation)
                .put(automation::update_automation),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
