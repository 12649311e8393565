use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use requesty_db::DbPool;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub slack_ingress: HealthCheck,
    pub checked_at: String,
}

#[derive(Clone)]
struct ProbeState {
    health: HealthState,
    http_ingress: bool,
}

pub fn router(db_pool: DbPool, http_ingress: bool) -> Router {
    Router::new()
        .route("/health", get(probe))
        .with_state(ProbeState { health: HealthState { db_pool }, http_ingress })
}

/// Binds the listener and serves `app` in the background.
pub async fn spawn(bind_address: &str, port: u16, app: Router) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.http.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "http listener started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app).await {
            error!(
                event_name = "system.http.error",
                correlation_id = "bootstrap",
                error = %error,
                "http listener terminated unexpectedly"
            );
        }
    });

    Ok(())
}

async fn probe(State(state): State<ProbeState>) -> (StatusCode, Json<HealthResponse>) {
    health(State(state.health), state.http_ingress).await
}

pub async fn health(
    State(state): State<HealthState>,
    http_ingress: bool,
) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let slack_ingress = if http_ingress {
        HealthCheck { status: "ready", detail: "signed http endpoints mounted".to_owned() }
    } else {
        HealthCheck { status: "disabled", detail: "no signing secret configured".to_owned() }
    };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        slack_ingress,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM requests").fetch_one(pool).await {
        Ok(count) => HealthCheck { status: "ready", detail: format!("{count} requests stored") },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use requesty_db::{connect_and_migrate, connect_with_settings};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::health::{health, router, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_schema_is_reachable() {
        let pool = connect_and_migrate("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool.clone() }), true).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.detail, "0 requests stored");
        assert_eq!(payload.slack_ingress.status, "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_is_degraded_before_migrations() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool }), false).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.slack_ingress.status, "disabled");
    }

    #[tokio::test]
    async fn health_route_serves_json() {
        let pool = connect_and_migrate("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let response = router(pool, false)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["database"]["status"], "ready");
    }
}
