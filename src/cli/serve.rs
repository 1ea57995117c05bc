// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use crate::cli::args::ServeArgs;
use crate::error::Result;

/// Start the HTTP server. Flags override the environment.
///
/// # Errors
///
/// Returns bind and runtime errors.
#[cfg(feature = "server")]
pub fn run_server(args: &ServeArgs) -> Result<()> {
    crate::server::run(server_config(args))
}

/// # Errors
///
/// Always returns [`crate::InferenceError::FeatureNotEnabled`].
#[cfg(not(feature = "server"))]
pub fn run_server(_args: &ServeArgs) -> Result<()> {
    Err(crate::InferenceError::FeatureNotEnabled(
        "The 'serve' command requires the 'server' feature".to_string(),
    ))
}

#[cfg(feature = "server")]
fn server_config(args: &ServeArgs) -> crate::server::ServerConfig {
    let mut config = crate::server::ServerConfig::from_env();
    if let Some(model) = &args.model {
        config.model_path.clone_from(model);
    }
    if let Some(host) = &args.host {
        config.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(conf) = args.conf {
        config.confidence = conf;
    }
    if let Some(imgsz) = args.imgsz {
        config.imgsz = imgsz;
    }
    config
}
