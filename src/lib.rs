use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{
    middleware::{NormalizePath, TrailingSlash},
    web::{Data, JsonConfig},
    App, HttpServer,
};
use config::Config;
use mailer::Mailer;
use tracing::level_filters::LevelFilter;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod mailer;
pub mod message;
pub mod queue;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod template;
pub mod utils;

#[cfg(test)]
mod testing;

/// Returns a builder for the main application.
///
/// Without a `config` the configuration is read from `ONA_*` environment
/// variables.
#[bon::builder(finish_fn = start)]
pub async fn run(config: Option<Config>, mailer: Option<Arc<dyn Mailer>>) -> eyre::Result<()> {
    #[cfg(debug_assertions)]
    FmtSubscriber::builder()
        .pretty()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("ONA_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    #[cfg(not(debug_assertions))]
    FmtSubscriber::builder()
        .json()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("ONA_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    let config = match config {
        Some(config) => config,
        None => Config::load()?,
    };
    let bind = config.bind().to_owned();

    let service = service::Service::connect_with()
        .config(config)
        .maybe_mailer(mailer)
        .call()
        .await?;

    let queue = service.queue().clone();
    let data = Data::new(service);

    tracing::info!(bind, "Listening");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_header()
            .allow_any_method();

        let json_cfg = JsonConfig::default().content_type_required(false);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .wrap(cors)
            .service(api::surveys::service())
            .service(api::dispatch::service())
            .app_data(data.clone())
            .app_data(json_cfg)
    })
    .bind(bind)?
    .run()
    .await?;

    if queue.pending() > 0 || queue.is_draining() {
        tracing::info!(pending = queue.pending(), "Waiting for queued invitations");
    }
    queue.idle().await;

    Ok(())
}
