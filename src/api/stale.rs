use actix_web::{web, HttpResponse, Responder};

use crate::state::AppState;

/// 列出等待删除 metrics 的已消失进程
pub async fn list_stale(data: web::Data<AppState>) -> impl Responder {
    match data.list_stale().await {
        Ok(entries) => HttpResponse::Ok().json(entries),
        Err(e) => unavailable(e),
    }
}

/// 立即删除所有累积的已消失进程的 metrics
pub async fn flush_stale(data: web::Data<AppState>) -> impl Responder {
    match data.request_flush().await {
        Ok(report) => {
            log::info!("Flush requested over HTTP: {} deleted, {} failed", report.deleted, report.failed);
            HttpResponse::Ok().json(serde_json::json!({
                "status": "success",
                "deleted": report.deleted,
                "failed": report.failed
            }))
        }
        Err(e) => unavailable(e),
    }
}

fn unavailable(e: anyhow::Error) -> HttpResponse {
    log::warn!("Monitor request failed: {:#}", e);
    HttpResponse::ServiceUnavailable().json(serde_json::json!({
        "status": "error",
        "message": format!("{:#}", e)
    }))
}
