use crate::cli::ServeArgs;
use crate::infra::{seed_accounts, seed_caspian_fleet, AppState, InMemoryDatastore, LoggingMailer};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use ecoports::auth::AuthGate;
use ecoports::config::AppConfig;
use ecoports::error::AppError;
use ecoports::ingest::{PdfTextExtractor, ReportImporter};
use ecoports::ports::{ApiContext, PortService, ReportService};
use ecoports::telemetry;
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

    let store = Arc::new(InMemoryDatastore::default());
    seed_accounts(&store)?;
    if args.seed_demo {
        seed_caspian_fleet(&store)?;
        info!("seeded demo fleet");
    }

    let mailer = Arc::new(LoggingMailer::new(&config.mail));
    let importer = ReportImporter::new(Box::new(PdfTextExtractor::new()));
    let context = ApiContext {
        ports: Arc::new(PortService::new(store.clone(), mailer, importer)),
        reports: Arc::new(ReportService::new(store.clone())),
        auth: Arc::new(AuthGate::new(store, &config.auth)),
    };

    let app = with_service_routes(context)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "ecoports service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
