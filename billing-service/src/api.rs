use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use billing_core::TransactionRecord;
use serde::Serialize;

use crate::session::{BillingSession, SessionError, SessionView};

/// The display surface: a read-only projection of the session plus the three
/// user-invocable actions. Busy rejections map to 409, workflow failures to
/// 502; diagnostics go to the log, not the response body.
pub fn router(session: Arc<BillingSession>) -> Router {
    Router::new()
        .route("/session", get(session_view))
        .route("/energy/submit", post(submit_energy))
        .route("/bill/fetch", post(fetch_bill))
        .route("/bill/pay", post(pay_bill))
        .with_state(session)
}

async fn session_view(State(session): State<Arc<BillingSession>>) -> Json<SessionView> {
    Json(session.snapshot().await)
}

#[derive(Serialize)]
struct ActionResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<TransactionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bill_wei: Option<String>,
}

async fn submit_energy(
    State(session): State<Arc<BillingSession>>,
) -> Result<Json<ActionResponse>, StatusCode> {
    match session.submit_energy().await {
        Ok(Some(record)) => Ok(Json(ActionResponse {
            status: "submitted",
            record: Some(record),
            bill_wei: None,
        })),
        Ok(None) => Ok(Json(ActionResponse {
            status: "no_reading",
            record: None,
            bill_wei: None,
        })),
        Err(e) => Err(error_status(&e)),
    }
}

async fn fetch_bill(
    State(session): State<Arc<BillingSession>>,
) -> Result<Json<ActionResponse>, StatusCode> {
    match session.fetch_bill().await {
        Ok(bill) => Ok(Json(ActionResponse {
            status: "fetched",
            record: None,
            bill_wei: Some(bill.to_string()),
        })),
        Err(e) => Err(error_status(&e)),
    }
}

async fn pay_bill(
    State(session): State<Arc<BillingSession>>,
) -> Result<Json<ActionResponse>, StatusCode> {
    match session.pay_bill().await {
        Ok(Some(record)) => Ok(Json(ActionResponse {
            status: "paid",
            record: Some(record),
            bill_wei: None,
        })),
        Ok(None) => Ok(Json(ActionResponse {
            status: "nothing_to_pay",
            record: None,
            bill_wei: None,
        })),
        Err(e) => Err(error_status(&e)),
    }
}

fn error_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::Busy => StatusCode::CONFLICT,
        _ => StatusCode::BAD_GATEWAY,
    }
}
