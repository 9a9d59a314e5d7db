use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use vitrine_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    catalog_products: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub catalog: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, catalog_products: usize) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, catalog_products })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let catalog = catalog_check(state.catalog_products);
    let ready = database.status == "ready" && catalog.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck { status: "ready", detail: "vitrine-server runtime initialized".to_string() },
        database,
        catalog,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn catalog_check(products: usize) -> HealthCheck {
    if products == 0 {
        HealthCheck { status: "degraded", detail: "catalog has no products".to_string() }
    } else {
        HealthCheck { status: "ready", detail: format!("{products} products loaded") }
    }
}
