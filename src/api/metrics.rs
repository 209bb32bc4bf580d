use actix_web::{web, HttpResponse, Responder};

use crate::state::AppState;

pub async fn get_metrics(data: web::Data<AppState>) -> impl Responder {
    // gauge 由监控循环在每条通知到达时更新，这里只负责渲染
    match data.metrics.render() {
        Ok(metrics_text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(metrics_text),
        Err(e) => {
            log::error!("Failed to render metrics: {:#}", e);
            HttpResponse::InternalServerError().body("Failed to render metrics")
        }
    }
}
