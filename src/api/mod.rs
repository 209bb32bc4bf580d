pub mod metrics;
pub mod stale;

pub use metrics::get_metrics;
pub use stale::{flush_stale, list_stale};

use actix_web::{HttpResponse, Responder};

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy"
    }))
}
