use crate::cli::ServeArgs;
use crate::infra::{build_scoring_service, load_submissions, AppState};
use crate::routes::with_scoring_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use naac_score::config::AppConfig;
use naac_score::error::AppError;
use naac_score::scoring::ingest;
use naac_score::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let scoring_service = build_scoring_service(&config.scoring)?;
    info!(
        metrics = scoring_service.catalog().len(),
        window_years = config.scoring.window_years,
        default_target = %config.scoring.default_target_grade,
        "metric catalog loaded"
    );

    if let Some(path) = args.responses.take() {
        let import = ingest::from_path(&path)?;
        let report = load_submissions(&scoring_service, import);
        info!(
            path = %path.display(),
            accepted = report.accepted,
            rejected = report.rejected.len(),
            "seeded responses"
        );
    }

    let app = with_scoring_routes(Arc::new(scoring_service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "naac scoring service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
