//! API module - HTTP routes, guards, and handlers

pub mod error;
pub mod handlers;
pub mod middleware;

use actix_web::web;

/// Configure all API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::scope("/logs")
                    .route("", web::post().to(handlers::ingest::submit_log))
                    .route(
                        "/{projectId}/search",
                        web::post().to(handlers::search::search_logs),
                    )
                    .route(
                        "/{projectId}/{logType}/environments",
                        web::get().to(handlers::facets::environments),
                    )
                    .route(
                        "/{projectId}/{logType}/categories",
                        web::get().to(handlers::facets::categories),
                    )
                    .route(
                        "/{projectId}/{logType}/hostnames",
                        web::get().to(handlers::facets::hostnames),
                    )
                    .route("/{projectId}/{logId}", web::get().to(handlers::logs::get_log))
                    .route("/{projectId}", web::delete().to(handlers::purge::purge_logs)),
            )
            .service(
                web::scope("/projects/{projectId}")
                    .route("/api-keys", web::post().to(handlers::keys::create_key))
                    .route("/api-keys", web::get().to(handlers::keys::list_keys))
                    .route(
                        "/api-keys/{keyId}",
                        web::delete().to(handlers::keys::delete_key),
                    )
                    .route(
                        "/users/{userId}/role",
                        web::put().to(handlers::members::change_role),
                    ),
            )
            .route("/usage/quota", web::get().to(handlers::usage::quota_status)),
    )
    .route("/health", web::get().to(handlers::health::health_check));
}
