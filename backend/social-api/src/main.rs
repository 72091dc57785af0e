use actix_cors::Cors;
use actix_web::http::header::{AUTHORIZATION, CONTENT_TYPE};
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use crypto_core::JwtCodec;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use social_api::{
    config::{Config, CorsConfig, JwtConfig, MediaBackend, StoreBackend},
    db::{postgres::MIGRATOR, MemoryStore, PgStore, SocialStore},
    handlers::{self, AppState},
    middleware::MetricsMiddleware,
    services::{CloudinaryStore, DirectoryPolicy, MediaStore, MemoryMediaStore},
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env()
        .map_err(anyhow::Error::msg)
        .context("Failed to load configuration")?;

    init_tracing(config.log.json);

    tracing::info!("Starting social-api v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    let store: Arc<dyn SocialStore> = match config.store.backend {
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.store.max_connections)
                .acquire_timeout(Duration::from_secs(5))
                .connect(&config.store.database_url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            tracing::info!(
                "Database pool created with {} max connections",
                config.store.max_connections
            );

            MIGRATOR
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations completed");

            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let media: Arc<dyn MediaStore> = match config.media.backend {
        MediaBackend::Cloudinary => Arc::new(
            CloudinaryStore::new(
                config.media.cloud_name.clone(),
                config.media.api_key.clone(),
                config.media.api_secret.clone(),
            )
            .context("Failed to initialize media host client")?,
        ),
        MediaBackend::Memory => {
            tracing::warn!("Using in-memory media store; uploads are not persisted");
            Arc::new(MemoryMediaStore::new())
        }
    };

    let codec = build_codec(&config.jwt)?;

    let state = web::Data::new(AppState::new(
        store,
        media,
        codec,
        DirectoryPolicy {
            exclude_viewer: config.users.directory_excludes_viewer,
        },
        config.media.max_upload_bytes,
    ));

    let bind_address = (config.app.host.clone(), config.app.port);
    tracing::info!("Listening on {}:{}", bind_address.0, bind_address.1);

    let cors_config = config.cors.clone();
    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(build_cors(&cors_config))
            .wrap(Logger::default())
            .wrap(TracingLogger::default())
            .wrap(MetricsMiddleware)
            .configure(move |cfg| handlers::configure(cfg, state))
    })
    .bind(bind_address)
    .context("Failed to bind HTTP listener")?
    .run()
    .await
    .context("HTTP server terminated with an error")?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_codec(jwt: &JwtConfig) -> anyhow::Result<JwtCodec> {
    let codec = match (&jwt.public_key_pem, &jwt.secret) {
        (Some(public_key), _) => {
            JwtCodec::from_rsa_pem(jwt.private_key_pem.as_deref(), public_key)
                .context("Failed to load JWT RSA keys")?
        }
        (None, Some(secret)) => {
            JwtCodec::from_secret(secret).context("Failed to load JWT secret")?
        }
        (None, None) => anyhow::bail!("No JWT key material configured"),
    };
    Ok(codec.with_access_ttl(jwt.access_ttl_secs))
}

fn build_cors(config: &CorsConfig) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
        .allowed_headers(vec![AUTHORIZATION, CONTENT_TYPE])
        .max_age(3600);

    if config.allows_any() {
        return cors.allow_any_origin();
    }
    config
        .origins()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}
