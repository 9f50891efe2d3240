use crate::{handlers, health};
use actix_web::web;

/// Every HTTP route the service exposes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::hello_world))
        .route("/test-cors", web::get().to(handlers::test_cors))
        .route("/test-openai", web::get().to(handlers::test_openai))
        .route("/conversations/start", web::post().to(handlers::start_conversation))
        .route("/conversations", web::get().to(handlers::list_conversations))
        .route("/record", web::post().to(handlers::record_audio))
        .route("/health", web::get().to(health::health_check))
        .route("/metrics", web::get().to(health::detailed_metrics));
}
