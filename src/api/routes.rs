use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/blocks", web::post().to(handlers::append_block))
            .route("/blocks/search", web::get().to(handlers::search_block))
            .route("/blocks/{index}", web::put().to(handlers::edit_block))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/keys/generate", web::post().to(handlers::generate_key))
    );
}
