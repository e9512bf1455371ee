use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::blockchain::{generate_standalone_key_pair, Block, Blockchain, BlockchainError};

/// Data structure for the ledger state
pub type BlockchainData = web::Data<Blockchain>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// Whether the chain is valid
    pub is_valid: bool,

    /// Index of the first block that fails validation
    pub first_invalid_index: Option<u64>,

    /// Per-block validity, in chain order
    pub validity: Vec<bool>,

    /// Base64 public key of the ledger signer
    pub public_key: String,
}

/// Request for the append endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AppendRequest {
    /// The block payload
    pub payload: String,

    /// Optional base64 private key to sign with instead of the ledger key
    #[serde(default)]
    pub private_key: Option<String>,
}

/// Response for the append endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AppendResponse {
    /// The newly appended block
    pub block: Block,

    /// Time spent mining, in milliseconds
    pub mining_duration_ms: u64,
}

/// Request for the edit endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct EditRequest {
    /// Replacement payload
    pub payload: String,

    /// Replacement base64 signature, absent to strip it
    #[serde(default)]
    pub signature: Option<String>,
}

/// Query for the search endpoint
#[derive(Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Block index, or block hash in any case
    pub query: String,
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    pub is_valid: bool,
    pub first_invalid_index: Option<u64>,

    /// Description of the first failure
    pub message: Option<String>,
}

/// Response for the generate key endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct KeyResponse {
    /// Base64 encoded Ed25519 private key
    pub private_key: String,
}

fn error_response(err: &BlockchainError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });

    match err {
        BlockchainError::BlockNotFound(_) => HttpResponse::NotFound().json(body),
        BlockchainError::CryptoError(_) => HttpResponse::BadRequest().json(body),
        BlockchainError::MiningError(_) => HttpResponse::ServiceUnavailable().json(body),
    }
}

/// Get the full chain
///
/// Returns every block together with the validation status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(blockchain: BlockchainData) -> impl Responder {
    let status = blockchain.status();

    let response = ChainResponse {
        length: status.blocks.len(),
        is_valid: status.is_valid(),
        first_invalid_index: status.first_invalid_index(),
        chain: status.blocks,
        validity: status.validity,
        public_key: blockchain.public_key(),
    };

    HttpResponse::Ok().json(response)
}

/// Append a new block
///
/// Mines and signs a block carrying the payload. When a private key is
/// supplied the block is signed with it instead of the ledger key.
#[utoipa::path(
    post,
    path = "/api/v1/blocks",
    request_body = AppendRequest,
    responses(
        (status = 201, description = "Block appended successfully", body = AppendResponse),
        (status = 400, description = "Malformed private key"),
        (status = 503, description = "Mining timed out or was cancelled"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn append_block(
    blockchain: BlockchainData,
    append_req: web::Json<AppendRequest>,
) -> impl Responder {
    let ledger = blockchain.get_ref().clone();
    let AppendRequest { payload, private_key } = append_req.into_inner();

    // Mining is CPU bound, keep it off the async workers
    let result = tokio::task::spawn_blocking(move || match private_key.as_deref() {
        Some(key) if !key.trim().is_empty() => ledger.append_with_key(&payload, key),
        _ => ledger.append_block(&payload),
    })
    .await;

    match result {
        Ok(Ok(block)) => HttpResponse::Created().json(AppendResponse {
            mining_duration_ms: block.mining_duration_ms(),
            block,
        }),
        Ok(Err(err)) => error_response(&err),
        Err(err) => {
            error!("Append task failed: {}", err);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to append block"
            }))
        }
    }
}

/// Edit a block out of band
///
/// Overwrites the payload and signature and recomputes the hash without
/// re-mining or re-signing, which breaks validation from that block on
#[utoipa::path(
    put,
    path = "/api/v1/blocks/{index}",
    request_body = EditRequest,
    params(
        ("index" = u64, Path, description = "Index of the block to edit")
    ),
    responses(
        (status = 200, description = "Block edited", body = Block),
        (status = 404, description = "Block not found")
    )
)]
pub async fn edit_block(
    blockchain: BlockchainData,
    index: web::Path<u64>,
    edit_req: web::Json<EditRequest>,
) -> impl Responder {
    let EditRequest { payload, signature } = edit_req.into_inner();

    match blockchain.tamper_block(index.into_inner(), &payload, signature) {
        Ok(block) => HttpResponse::Ok().json(block),
        Err(err) => error_response(&err),
    }
}

/// Search for a block
///
/// Looks up by index when the query is a non-negative integer, otherwise by
/// hash ignoring case
#[utoipa::path(
    get,
    path = "/api/v1/blocks/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Block found", body = Block),
        (status = 404, description = "No matching block")
    )
)]
pub async fn search_block(
    blockchain: BlockchainData,
    search: web::Query<SearchQuery>,
) -> impl Responder {
    match blockchain.find_block(&search.query) {
        Some(block) => HttpResponse::Ok().json(block),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("No block matches {:?}", search.query)
        })),
    }
}

/// Check if the chain is valid
///
/// Validates the entire chain
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Chain validation status", body = ValidationResponse)
    )
)]
pub async fn validate_chain(blockchain: BlockchainData) -> impl Responder {
    let violation = blockchain.first_violation();

    HttpResponse::Ok().json(ValidationResponse {
        is_valid: violation.is_none(),
        first_invalid_index: violation.map(|v| v.index),
        message: violation.map(|v| v.to_string()),
    })
}

/// Generate a key pair
///
/// Returns a fresh private key unrelated to the ledger, usable as the
/// `private_key` of the append endpoint. The key is not stored.
#[utoipa::path(
    post,
    path = "/api/v1/keys/generate",
    responses(
        (status = 201, description = "Key generated", body = KeyResponse)
    )
)]
pub async fn generate_key() -> impl Responder {
    HttpResponse::Created().json(KeyResponse {
        private_key: generate_standalone_key_pair(),
    })
}
