//! CLI arguments and server configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const SPOOL_DIR_NAME: &str = ".spool";
pub const DEFAULT_CATEGORY: &str = "General";
pub const DEFAULT_SUBCATEGORY: &str = "Misc";
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 100 * 1024 * 1024;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "classdrop", version = VERSION_INFO, about = "ClassDrop server")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "CLASSDROP_STORAGE_DIR",
        default_value = ".classdrop/uploads",
        help = "Upload root directory"
    )]
    pub storage_dir: String,
    #[arg(
        long,
        env = "CLASSDROP_UPLOAD_SECRET",
        default_value = "",
        hide_env_values = true,
        help = "Shared upload secret (empty rejects all uploads)"
    )]
    pub upload_secret: String,
    #[arg(
        long,
        env = "CLASSDROP_DEFAULT_CATEGORY",
        default_value = DEFAULT_CATEGORY,
        help = "Fallback category for uploads without one"
    )]
    pub default_category: String,
    #[arg(
        long,
        env = "CLASSDROP_DEFAULT_SUBCATEGORY",
        default_value = DEFAULT_SUBCATEGORY,
        help = "Fallback subcategory for uploads without one"
    )]
    pub default_subcategory: String,
    #[arg(
        short = 'b',
        long,
        env = "CLASSDROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address for HTTP/HTTPS"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "CLASSDROP_HTTP_PORT",
        default_value_t = 3000,
        help = "HTTP port"
    )]
    pub http_port: u16,
    #[arg(
        short = 'P',
        long,
        env = "CLASSDROP_HTTPS_PORT",
        default_value_t = 3443,
        help = "HTTPS port"
    )]
    pub https_port: u16,
    #[arg(short = 'c', long, env = "CLASSDROP_TLS_CERT", help = "TLS cert path")]
    pub tls_cert: Option<String>,
    #[arg(short = 'k', long, env = "CLASSDROP_TLS_KEY", help = "TLS key path")]
    pub tls_key: Option<String>,
    #[arg(
        long,
        env = "CLASSDROP_CORS_ORIGINS",
        help = "Comma separated CORS origins"
    )]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "CLASSDROP_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload size in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
}
