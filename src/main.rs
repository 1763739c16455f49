//! ClassDrop server binary.
//!
//! A small classroom file-sharing service: multipart uploads gated by a
//! shared secret land under `category/subcategory` on disk and are served
//! back for inline viewing or download. The main entry point builds the
//! Axum router, configures TLS, and starts HTTP/HTTPS listeners.

mod auth;
mod config;
mod error;
mod etag;
mod files;
mod frontend;
mod http;
mod logging;
mod spool;
mod storage;
mod tls;
mod upload;
mod version;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::auth::UploadGate;
use crate::config::Args;
use crate::http::build_cors_layer;
use crate::storage::Storage;
use crate::upload::UploadConfig;

shadow!(build);

/// Starts the ClassDrop server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage = Arc::new(Storage::new(
        PathBuf::from(args.storage_dir.clone()),
        args.default_category.clone(),
        args.default_subcategory.clone(),
    ));
    storage.ensure_root().await?;
    let gate = Arc::new(UploadGate::new(args.upload_secret.clone()));
    let upload_config = Arc::new(UploadConfig {
        max_size: args.upload_max_size,
    });

    let mut app = Router::new()
        .route(
            "/upload",
            post(upload::upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/file/{category}/{subcategory}/{stored_name}",
            get(files::view_file),
        )
        .route("/files", get(files::list_files))
        .route("/api/version", get(version::get_version_info))
        .fallback(frontend::serve_frontend)
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = http::resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(gate))
        .layer(Extension(upload_config));

    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let http_addr = SocketAddr::new(host, args.http_port);
    let https_addr = SocketAddr::new(host, args.https_port);
    let tls_config =
        tls::build_rustls_config(args.tls_cert.as_deref(), args.tls_key.as_deref(), host).await?;
    let handle = Handle::new();

    info!("starting HTTP server at {}", http_addr);
    info!("starting HTTPS server at {}", https_addr);

    let http_server = axum_server::bind(http_addr)
        .handle(handle.clone())
        .serve(app.clone().into_make_service_with_connect_info::<SocketAddr>());
    let https_server = axum_server::bind_rustls(https_addr, tls_config)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = http_server => result?,
        result = https_server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received termination signal, shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
