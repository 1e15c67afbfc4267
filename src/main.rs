mod backend;
mod config;
mod dedup;
mod embedding;
mod error;
mod jobs;
mod lexical;
mod model;
mod normalize;
mod pipeline;
mod providers;
mod routes;
mod scoring;
mod summarize;
mod vector;

use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use anyhow::Result;
use backend::{HttpSearchBackend, PooledBackend};
use config::Config;
use embedding::HttpEmbedder;
use jobs::JobRegistry;
use routes::AppState;
use summarize::HttpCompleter;
use tracing_subscriber::EnvFilter;

const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;
const SWEEP_INTERVAL_SECS: u64 = 600;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let host = config.host.clone();
    let port = config.port;

    tracing::info!(host = %host, port, "starting retrieval pipeline server");

    let backend = PooledBackend::new(
        HttpSearchBackend::new(
            config.backend_uri.clone(),
            config.database_name.clone(),
            config.collection_name.clone(),
            config.text_index_name.clone(),
            config.vector_index_name.clone(),
            config.auth_token.clone(),
        ),
        config.backend_pool_size,
        config.backend_pool_wait,
    );
    let embedder = HttpEmbedder::new(
        config.embedding_base_url.clone(),
        config.user_id.clone(),
        config.auth_token.clone(),
    );
    let completer = HttpCompleter::new(config.completion_base_url.clone(), config.auth_token.clone());

    let jobs = JobRegistry::new();
    let _sweeper = jobs.spawn_sweeper(config.job_ttl, std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));

    let state = web::Data::new(AppState {
        backend,
        embedder,
        completer,
        jobs,
        dedup_threshold_default: config.dedup_threshold_default,
    });

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(MAX_BODY_BYTES))
            .route("/health", web::get().to(|| async { HttpResponse::Ok().body("ok") }))
            .service(
                web::scope("/api")
                    .route("/search", web::post().to(routes::search))
                    .route("/search/bm25", web::post().to(routes::search_bm25))
                    .route("/search/hybrid", web::post().to(routes::search_hybrid))
                    .route("/search/rerank", web::post().to(routes::search_rerank))
                    .route("/search/preprocess", web::post().to(routes::preprocess))
                    .route("/search/deduplicate", web::post().to(routes::deduplicate))
                    .route("/search/summarize", web::post().to(routes::search_summarize))
                    .route("/metadata/distinct", web::get().to(routes::metadata_distinct))
                    .route("/jobs/active", web::get().to(routes::jobs_active))
                    .route("/jobs/{id}", web::get().to(routes::job_by_id)),
            )
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    Ok(())
}
