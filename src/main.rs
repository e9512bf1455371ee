use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use hashlink_ledger::{api, blockchain, Blockchain, LedgerConfig, ServerConfig};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::append_block,
        api::handlers::edit_block,
        api::handlers::search_block,
        api::handlers::validate_chain,
        api::handlers::generate_key
    ),
    components(
        schemas(
            blockchain::Block,
            api::handlers::ChainResponse,
            api::handlers::AppendRequest,
            api::handlers::AppendResponse,
            api::handlers::EditRequest,
            api::handlers::ValidationResponse,
            api::handlers::KeyResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger API endpoints")
    ),
    info(
        title = "Hash-linked Ledger API",
        version = "0.1.0",
        description = "Append, inspect, tamper with and validate an in-memory ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let ledger_config = LedgerConfig::from_env().context("invalid ledger configuration")?;
    let server_config = ServerConfig::from_env().context("invalid server configuration")?;

    let blockchain = web::Data::new(Blockchain::with_config(ledger_config));
    info!(
        "Ledger ready (difficulty {}, signing {}, public key {})",
        blockchain.difficulty(),
        blockchain.config().signing_enabled,
        blockchain.public_key()
    );

    info!(
        "Starting HTTP server at http://{}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(blockchain.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((server_config.host.as_str(), server_config.port))
    .with_context(|| format!("failed to bind {}:{}", server_config.host, server_config.port))?
    .run()
    .await
    .context("HTTP server failed")?;

    Ok(())
}
