use actix_web::{http::StatusCode, web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::health::{ComponentHealth, SystemHealth};
use crate::models::Order;
use crate::service::OrderService;

const RECENT_DEFAULT_LIMIT: i64 = 20;

pub struct AppState {
    pub service: Arc<OrderService>,
    pub registry: Registry,
}

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<i64>,
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/order/{uid}", web::get().to(get_order))
        .route("/order", web::post().to(post_order))
        .route("/recent", web::get().to(recent))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics));
}

/// Serve until the process receives SIGINT/SIGTERM.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    tracing::info!(addr = %addr, "Starting HTTP server");
    let state = web::Data::new(state);

    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .bind(addr)?
        .run()
        .await
}

fn error_response(err: &ServiceError) -> HttpResponse {
    match err {
        ServiceError::Validation { .. } => HttpResponse::BadRequest().body(format!("bad id: {err}")),
        ServiceError::Store(_) => HttpResponse::InternalServerError().body("internal error"),
    }
}

async fn get_order(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let uid = path.into_inner();
    tracing::info!(method = "GET", path = "/order/{uid}", order_uid = %uid, "request");

    match state.service.get(&uid).await {
        Ok(Some(order)) => HttpResponse::Ok().json(order),
        Ok(None) => HttpResponse::NotFound().body("not found"),
        Err(e) => error_response(&e),
    }
}

async fn post_order(state: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let order = match Order::from_json(&body) {
        Ok(order) => order,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected malformed order body");
            return HttpResponse::BadRequest().body(format!("bad order: {e}"));
        }
    };
    tracing::info!(method = "POST", path = "/order", order_uid = %order.order_uid, "request");

    match state.service.set(&order).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "order_uid": order.id() })),
        Err(e) => error_response(&e),
    }
}

async fn recent(state: web::Data<AppState>, query: web::Query<RecentQuery>) -> impl Responder {
    let limit = query.limit.unwrap_or(RECENT_DEFAULT_LIMIT);
    tracing::info!(method = "GET", path = "/recent", limit, "request");

    match state.service.recent_ids(limit).await {
        Ok(ids) => HttpResponse::Ok().json(ids),
        Err(e) => error_response(&e),
    }
}

async fn health(state: web::Data<AppState>) -> impl Responder {
    let (store, cache) = state.service.check_components().await;
    let health = SystemHealth::from_components(vec![
        ComponentHealth::required("store", store),
        ComponentHealth::optional("cache", cache),
    ]);

    let status = if health.overall_status.is_unhealthy() {
        tracing::warn!(status = ?health.overall_status, "Health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    HttpResponse::build(status).json(health)
}

async fn metrics(state: web::Data<AppState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().body("metrics encoding failed");
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}
