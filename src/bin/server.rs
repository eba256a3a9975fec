use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use plan_solver::config::PlanConfig;
use plan_solver::solver::SearchStats;
use plan_solver::types::Solution;
use serde::Serialize;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Serialize)]
struct SolveResponse {
    status: &'static str,
    solutions: Vec<Solution>,
    stats: SearchStats,
}

async fn solve(Json(req): Json<PlanConfig>) -> Result<Json<SolveResponse>, (StatusCode, String)> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /solve"
    );

    let bad_request = |e: plan_solver::error::PlanError| (StatusCode::BAD_REQUEST, e.to_string());
    let plan = req.resolve().map_err(bad_request)?;

    // search is CPU bound
    let result = tokio::task::spawn_blocking(move || {
        plan.solver().map(|solver| solver.solve())
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(bad_request)?;

    let status = result.outcome.status();
    tracing::info!(
        status,
        solutions = result.outcome.solutions().len(),
        steps = result.stats.steps,
        "solve finished"
    );

    Ok(Json(SolveResponse {
        status,
        solutions: result.outcome.solutions().to_vec(),
        stats: result.stats,
    }))
}

#[tokio::main]
async fn main() {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("development.log")
        .expect("failed to open development.log");

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");

    let app = Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/solve", post(solve))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");
    eprintln!("Listening on {addr}");
    axum::serve(listener, app).await.expect("server error");
}
