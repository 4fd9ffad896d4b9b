//! Health and Prometheus endpoints

use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer};
use serde::Serialize;

use crate::config::SERVICE_NAME;
use crate::metrics;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
    })
}

async fn serve_metrics() -> HttpResponse {
    match metrics::render() {
        Ok((content_type, body)) => HttpResponse::Ok().content_type(content_type).body(body),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(serve_metrics));
}

/// Bind the server without installing signal handlers; the caller stops it
/// through its handle.
pub fn bind(port: u16) -> std::io::Result<Server> {
    let server = HttpServer::new(|| App::new().configure(configure))
        .workers(1)
        .disable_signals()
        .bind(("0.0.0.0", port))?
        .run();
    Ok(server)
}
