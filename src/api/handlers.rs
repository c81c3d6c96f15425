//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{info, warn};

use super::AppState;
use super::types::CalculateRequest;
use crate::aep::CancellationToken;
use crate::analysis::{AnalysisReport, run_analysis};

/// Runs one analysis on the pre-loaded inputs.
///
/// `POST /calculate` → 200 + `AnalysisReport` JSON on success
/// `POST /calculate` with malformed or invalid overrides → 400 + failure report
/// Any construction or run-level failure → 500 + failure report
pub async fn calculate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> (StatusCode, Json<AnalysisReport>) {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CalculateRequest::default()
    } else {
        match serde_json::from_slice::<CalculateRequest>(&body) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "rejected calculate request");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(AnalysisReport::failure(format!("invalid request body: {e}"))),
                );
            }
        }
    };

    let config = request.apply(&state.config);
    let errors = config.validate();
    if !errors.is_empty() {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        warn!(%message, "rejected calculate overrides");
        return (StatusCode::BAD_REQUEST, Json(AnalysisReport::failure(message)));
    }

    info!(
        num_simulations = config.analysis.num_simulations,
        master_seed = config.analysis.master_seed,
        "calculate request accepted"
    );
    let worker_state = Arc::clone(&state);
    let joined = tokio::task::spawn_blocking(move || {
        let outcome = run_analysis(&config, &worker_state.inputs, &CancellationToken::new());
        AnalysisReport::from_outcome(&outcome)
    })
    .await;

    match joined {
        Ok(report) if report.is_success() => (StatusCode::OK, Json(report)),
        Ok(report) => (StatusCode::INTERNAL_SERVER_ERROR, Json(report)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AnalysisReport::failure(format!("analysis worker failed: {e}"))),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    use super::*;
    use crate::analysis::AnalysisInputs;
    use crate::api::router;
    use crate::config::AnalysisConfig;
    use crate::io::load::read_csv;
    use crate::schema::RawTable;

    fn table(text: &str) -> RawTable {
        read_csv(text.as_bytes()).unwrap()
    }

    fn make_test_state() -> Arc<AppState> {
        let mut meter = String::from("time,net_energy\n");
        let mut curtail = String::from("time,availability_loss,curtailment_loss\n");
        let mut scada = String::from("time,asset_id,power,wind_speed\n");
        for i in 0..24 {
            let t = format!("{}-{:02}-01", 2014 + i / 12, i % 12 + 1);
            let ws = 6.0 + (i % 5) as f64 * 0.4;
            meter.push_str(&format!("{t},{}\n", 500.0 * ws - 500.0));
            curtail.push_str(&format!("{t},20,10\n"));
            scada.push_str(&format!("{t},T1,4000,{ws}\n"));
        }
        let mut era5 = String::from("time,wind_speed,air_density\n");
        for i in 0..240 {
            let t = format!("{}-{:02}-01", 1996 + i / 12, i % 12 + 1);
            era5.push_str(&format!("{t},{},1.22\n", 6.0 + (i % 7) as f64 * 0.3));
        }

        let mut config = AnalysisConfig::baseline();
        config.analysis.num_simulations = 10;
        Arc::new(AppState {
            config,
            inputs: AnalysisInputs {
                asset: table("asset_id,latitude,longitude\nT1,48.45,5.59\n"),
                meter: table(&meter),
                curtail: table(&curtail),
                scada: table(&scada),
                reanalysis: BTreeMap::from([("era5".to_string(), table(&era5))]),
            },
        })
    }

    async fn post(state: Arc<AppState>, body: &'static str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/calculate")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let resp = router(state).oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn empty_body_runs_configured_analysis() {
        let (status, json) = post(make_test_state(), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["succeeded"], 10);
        assert!(json["aep_mwh"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn overrides_change_the_run() {
        let (status, json) = post(make_test_state(), r#"{"num_simulations": 4}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["succeeded"], 4);
    }

    #[tokio::test]
    async fn zero_simulations_returns_400() {
        let (status, json) = post(make_test_state(), r#"{"num_simulations": 0}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "failure");
        assert!(json["message"].as_str().unwrap().contains("num_simulations"));
    }

    #[tokio::test]
    async fn malformed_body_returns_400() {
        let (status, _) = post(make_test_state(), "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
