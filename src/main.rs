use std::{process, sync::Arc, time::Duration};

use content_cache::{
    application::{error::AppError, services::ContentServices},
    config::{self, FetchArgs, Settings},
    domain::Field,
    infra::{error::InfraError, minio::MinioClient, telemetry},
    storage::{CacheConfig, ContentCache, MemoryBackend, Store, StoreConfig, stop_signal},
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const SYNC_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        None | Some(config::Command::Serve(_)) => run_serve(settings).await,
        Some(config::Command::Fetch(args)) => run_fetch(settings, args).await,
    }
}

fn build_cache(settings: &Settings) -> Result<ContentCache<Store, MemoryBackend>, AppError> {
    let client = MinioClient::new(&settings.minio).map_err(InfraError::from)?;
    let store = Store::new(Arc::new(client), StoreConfig::from(&settings.storage));
    let cache_config = CacheConfig::from(&settings.cache);
    let backend = MemoryBackend::new(&cache_config);

    Ok(ContentCache::new(
        Arc::new(store),
        Arc::new(backend),
        cache_config,
    ))
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let cache = build_cache(&settings)?;
    let (stop, signal) = stop_signal();

    info!(
        endpoint = %settings.minio.endpoint,
        bucket = %settings.storage.bucket,
        capacity = settings.cache.capacity.get(),
        "Starting content cache"
    );

    let handle = cache
        .initialize(signal)
        .ok_or_else(|| AppError::unexpected("cache loop already running"))?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut sync_check = tokio::time::interval(SYNC_CHECK_INTERVAL);
    let mut synced = false;
    loop {
        tokio::select! {
            _ = sync_check.tick() => {
                let now = cache.is_synced();
                if now != synced {
                    if now {
                        info!("Cache synchronised with bucket notifications");
                    } else {
                        warn!("Cache lost bucket notifications; serving from the store");
                    }
                    synced = now;
                }
            }
            result = &mut shutdown => {
                result.map_err(InfraError::from)?;
                info!("Shutdown signal received");
                break;
            }
        }
    }

    stop.stop();
    if let Err(err) = handle.await {
        warn!(error = %err, "Cache loop ended abnormally");
    }

    Ok(())
}

async fn run_fetch(settings: Settings, args: FetchArgs) -> Result<(), AppError> {
    let field = Field::from_name(&args.field).ok_or_else(|| {
        AppError::validation(format!(
            "unknown field `{}`; expected one of {}",
            args.field,
            Field::ALL.map(Field::name).join(", ")
        ))
    })?;

    let services = ContentServices::new(build_cache(&settings)?);
    let (kind, id) = (args.kind.as_str(), args.id.as_str());

    let rendered = match field {
        Field::Content => render(services.content.find(kind, id).await?)?,
        Field::ApiSpec => render(services.api_spec.find(kind, id).await?)?,
        Field::OpenApiSpec => render(services.open_api_spec.find(kind, id).await?)?,
        Field::AsyncApiSpec => render(services.async_api_spec.find(kind, id).await?)?,
        Field::ODataSpec => render(services.odata_spec.find(kind, id).await?)?,
    };

    match rendered {
        Some(json) => println!("{json}"),
        None => println!("{field} for {kind}/{id}: not found"),
    }

    Ok(())
}

fn render<T: Serialize>(document: Option<T>) -> Result<Option<String>, AppError> {
    document
        .map(|document| serde_json::to_string_pretty(&document))
        .transpose()
        .map_err(|err| AppError::unexpected(format!("failed to render document: {err}")))
}
