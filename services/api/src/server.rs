use crate::cli::ServeArgs;
use crate::infra::{in_memory_registry, AppState, LogMailer};
use crate::routes::with_registry_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use semreg::config::AppConfig;
use semreg::error::AppError;
use semreg::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

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

    let registry = in_memory_registry(config.registry.clone(), Arc::new(LogMailer));
    match &config.bootstrap_admin {
        Some(admin) => {
            if registry.seed_admin(admin)? {
                info!(username = %admin.username, "bootstrap administrator created");
            }
        }
        None => warn!("no bootstrap administrator configured; set APP_ADMIN_USERNAME and APP_ADMIN_PASSWORD"),
    }

    let app = with_registry_routes(registry)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        institution = %config.registry.institution,
        "semester registration service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
