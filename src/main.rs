use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use enroll_hub::config::AppConfig;
use enroll_hub::error::AppError;
use enroll_hub::telemetry;
use enroll_hub::workflows::enrollment::domain::{
    ChildId, Ownership, ParentId, ProviderId, UserId, Workshop, WorkshopId, WorkshopStatus,
    UNLIMITED_SEATS,
};
use enroll_hub::workflows::enrollment::memory::{
    MemoryApplicationStore, MemoryDirectory, MemoryMailer, MemoryNotifications,
    MemoryWorkshopStore,
};
use enroll_hub::workflows::enrollment::{
    enrollment_router, EnrollmentService, StatusPermissionMatrix, SubmissionLimits,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Workshop Enrollment Hub",
    about = "Run the workshop enrollment service or inspect its status machine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the allowed status transitions per role
    Matrix(MatrixArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct MatrixArgs {
    /// Show the table for workshops with a competitive selection round
    #[arg(long)]
    competitive: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Matrix(args) => {
            render_matrix(args);
            Ok(())
        }
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let service = seeded_service(config.submissions);

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(enrollment_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "enrollment hub ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Dev-server wiring: in-memory stores seeded with a small fixture so the
/// API is explorable out of the box. Production wiring swaps the stores
/// behind the same traits.
fn seeded_service(
    limits: SubmissionLimits,
) -> Arc<EnrollmentService<MemoryApplicationStore, MemoryWorkshopStore>> {
    let applications = Arc::new(MemoryApplicationStore::new());
    let workshops = Arc::new(MemoryWorkshopStore::new());
    let directory = Arc::new(MemoryDirectory::new(Duration::from_secs(60)));
    let notifier = Arc::new(MemoryNotifications::new());
    let mailer = Arc::new(MemoryMailer::new());

    directory.register_parent(
        UserId("user-parent-1".to_string()),
        ParentId("parent-1".to_string()),
        [ChildId("child-1".to_string()), ChildId("child-2".to_string())],
    );
    directory.register_provider(
        ProviderId("provider-1".to_string()),
        UserId("user-provider-1".to_string()),
    );
    directory.register_employee(
        UserId("user-employee-1".to_string()),
        ProviderId("provider-1".to_string()),
        [WorkshopId("workshop-chess".to_string())],
    );

    workshops.put(Workshop {
        id: WorkshopId("workshop-chess".to_string()),
        provider_id: ProviderId("provider-1".to_string()),
        title: "Chess club".to_string(),
        available_seats: 12,
        status: WorkshopStatus::Open,
        competitive_selection: false,
        ownership: Ownership::Common,
        is_blocked: false,
    });
    workshops.put(Workshop {
        id: WorkshopId("workshop-choir".to_string()),
        provider_id: ProviderId("provider-1".to_string()),
        title: "Youth choir".to_string(),
        available_seats: UNLIMITED_SEATS,
        status: WorkshopStatus::Open,
        competitive_selection: true,
        ownership: Ownership::Common,
        is_blocked: false,
    });

    Arc::new(EnrollmentService::new(
        applications,
        workshops,
        directory.clone(),
        directory,
        notifier,
        mailer,
        limits,
    ))
}

fn render_matrix(args: MatrixArgs) {
    let matrix = StatusPermissionMatrix::for_workshop(args.competitive);
    let mode = if args.competitive {
        "competitive selection"
    } else {
        "default"
    };

    println!("Allowed status transitions ({mode})");
    for (role, from, to) in matrix.allowed_transitions() {
        println!("- {role}: {from} -> {to}");
    }
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
