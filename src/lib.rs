//! SEO content platform server.
//!
//! A multi-tenant REST API for planning and producing search-optimized articles: projects,
//! keyword research, content briefs, AI-generated drafts, on-page SEO scoring, internal
//! link suggestions, a publishing calendar and exports, all paid for with prepaid credits.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: hosted auth provider sign-in, then server-issued bearer sessions
//!   stored as SHA-256 hashes
//! - **Billing**: credit wallet with an append-only ledger, topped up through Stripe
//! - **Format**: JSON requests/responses

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the full router: public routes, session-authenticated routes and the admin surface.
pub fn build_router(state: AppState) -> Router {
    let pool = state.pool.clone();

    let authenticated_routes = Router::new()
        // Session
        .route("/api/auth/session", get(handlers::auth::get_session))
        .route("/api/auth/signout", post(handlers::auth::sign_out))
        // Projects
        .route(
            "/api/projects",
            get(handlers::projects::list_projects).post(handlers::projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(handlers::projects::get_project)
                .patch(handlers::projects::update_project)
                .delete(handlers::projects::delete_project),
        )
        // Keywords
        .route(
            "/api/keywords",
            get(handlers::keywords::list_keywords).post(handlers::keywords::create_keywords),
        )
        .route("/api/keywords/stats", get(handlers::keywords::keyword_stats))
        .route(
            "/api/keywords/{id}",
            get(handlers::keywords::get_keyword)
                .patch(handlers::keywords::update_keyword)
                .delete(handlers::keywords::delete_keyword),
        )
        // Briefs
        .route(
            "/api/briefs",
            get(handlers::briefs::list_briefs).post(handlers::briefs::create_brief),
        )
        .route(
            "/api/briefs/{id}",
            get(handlers::briefs::get_brief)
                .patch(handlers::briefs::update_brief)
                .delete(handlers::briefs::delete_brief),
        )
        .route(
            "/api/briefs/{id}/generate-outline",
            post(handlers::briefs::generate_outline),
        )
        .route(
            "/api/briefs/{id}/generate-draft",
            post(handlers::briefs::generate_draft),
        )
        // Drafts
        .route(
            "/api/drafts",
            get(handlers::drafts::list_drafts).post(handlers::drafts::create_draft),
        )
        .route(
            "/api/drafts/{id}",
            get(handlers::drafts::get_draft)
                .patch(handlers::drafts::update_draft)
                .delete(handlers::drafts::delete_draft),
        )
        .route("/api/drafts/{id}/score", post(handlers::drafts::score_draft))
        .route("/api/drafts/{id}/export", post(handlers::drafts::export_draft))
        .route("/api/exports/history", get(handlers::exports::export_history))
        // Internal links
        .route("/api/links", get(handlers::links::list_draft_links))
        .route("/api/links/suggest", post(handlers::links::suggest_links))
        .route("/api/links/project", get(handlers::links::list_project_links))
        .route("/api/links/graph", get(handlers::links::list_graph))
        .route(
            "/api/links/graph/recompute",
            post(handlers::links::recompute_graph),
        )
        .route("/api/links/{id}/accept", post(handlers::links::accept_link))
        .route("/api/links/{id}/dismiss", post(handlers::links::dismiss_link))
        // Calendar
        .route(
            "/api/calendar",
            get(handlers::calendar::list_items).post(handlers::calendar::create_item),
        )
        .route(
            "/api/calendar/{id}",
            axum::routing::patch(handlers::calendar::update_item)
                .delete(handlers::calendar::delete_item),
        )
        // Credits and billing
        .route("/api/credits/wallet", get(handlers::credits::get_wallet))
        .route(
            "/api/credits/transactions",
            get(handlers::credits::list_transactions),
        )
        .route("/api/credits/estimate", get(handlers::credits::estimate_cost))
        .route("/api/stripe/checkout", post(handlers::stripe::create_checkout))
        // Partner network
        .route(
            "/api/partners/optin",
            get(handlers::partners::get_optin)
                .post(handlers::partners::upsert_optin)
                .patch(handlers::partners::update_optin),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            pool.clone(),
            middleware::auth::auth_middleware,
        ));

    // Layers run bottom-up: authenticate first, then check the platform role
    let admin_routes = Router::new()
        .route("/api/admin/stats", get(handlers::admin::platform_stats))
        .route(
            "/api/admin/organizations",
            get(handlers::admin::list_organizations),
        )
        .route("/api/admin/users", get(handlers::admin::list_users))
        .route(
            "/api/admin/users/{id}/role",
            axum::routing::patch(handlers::admin::update_user_role),
        )
        .route("/api/admin/credits/grant", post(handlers::admin::grant_credits))
        .route(
            "/api/admin/partners/review",
            get(handlers::admin::review_partners),
        )
        .route(
            "/api/admin/partners/{id}/approve",
            post(handlers::admin::approve_partner),
        )
        .route(
            "/api/admin/partners/{id}/reject",
            post(handlers::admin::reject_partner),
        )
        .route_layer(axum_middleware::from_fn(middleware::auth::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            pool,
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .route("/api/auth/signup", post(handlers::auth::sign_up))
        .route("/api/auth/signin", post(handlers::auth::sign_in))
        .route("/auth/callback", get(handlers::auth::auth_callback))
        .route("/api/credits/packages", get(handlers::credits::list_packages))
        .route("/api/stripe/webhook", post(handlers::stripe::stripe_webhook))
        .merge(authenticated_routes)
        .merge(admin_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
