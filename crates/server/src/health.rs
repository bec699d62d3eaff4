use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use moldquote_db::DbPool;
use serde::Serialize;

/// How readiness of the persistence layer is judged.
#[derive(Clone, Debug)]
pub enum PersistenceProbe {
    Sqlite(DbPool),
    /// Remote sinks are not probed over the network on every health call.
    Remote { sink: &'static str, detail: String },
    Disabled,
}

#[derive(Clone)]
pub struct HealthState {
    persistence: PersistenceProbe,
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
    pub persistence: HealthCheck,
    pub checked_at: String,
}

pub fn router(persistence: PersistenceProbe) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { persistence })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let persistence = persistence_check(&state.persistence).await;
    let ready = persistence.status != "degraded";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "moldquote-server webhook initialized".to_string(),
        },
        persistence,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn persistence_check(probe: &PersistenceProbe) -> HealthCheck {
    match probe {
        PersistenceProbe::Sqlite(pool) => {
            match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quotation").fetch_one(pool).await
            {
                Ok(rows) => HealthCheck {
                    status: "ready",
                    detail: format!("sqlite ledger reachable ({rows} quotations)"),
                },
                Err(error) => HealthCheck {
                    status: "degraded",
                    detail: format!("database query failed: {error}"),
                },
            }
        }
        PersistenceProbe::Remote { sink, detail } => {
            HealthCheck { status: "ready", detail: format!("{sink}: {detail}") }
        }
        PersistenceProbe::Disabled => {
            HealthCheck { status: "disabled", detail: "quotations are not persisted".to_string() }
        }
    }
}
