use crate::cli::ServeArgs;
use crate::infra::{roster_resolver, seed_demo_event, AppState, LoggingEnricher, TracingNotifier};
use crate::routes::with_review_routes;
use applicant_review::config::AppConfig;
use applicant_review::error::AppError;
use applicant_review::telemetry;
use applicant_review::workflows::review::applications::ApplicationService;
use applicant_review::workflows::review::evaluations::EvaluationService;
use applicant_review::workflows::review::InMemoryReviewStore;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
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

    let store = Arc::new(InMemoryReviewStore::new());
    let seeded = !args.no_seed;
    if seeded {
        seed_demo_event(&store)?;
    }
    let resolver = Arc::new(roster_resolver(&config.access, seeded));

    let application_service = Arc::new(
        ApplicationService::new(
            store.clone(),
            Arc::new(TracingNotifier),
            resolver.clone(),
            config.review.retry,
        )
        .with_enricher(Arc::new(LoggingEnricher)),
    );
    let evaluation_service = Arc::new(EvaluationService::new(
        store.clone(),
        store,
        resolver,
        config.review.clone(),
    ));

    let app = with_review_routes(application_service, evaluation_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, seeded, "applicant review engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
