use std::env;
use std::sync::Arc;

use tracing::{Level, error, info};
use van_value::core::{ConfigError, ValuationConfig};

fn load_config() -> Result<ValuationConfig, ConfigError> {
    match env::var_os("VAN_VALUE_CONFIG") {
        Some(path) => {
            let config = ValuationConfig::load(&path)?;
            info!(path = %path.to_string_lossy(), "loaded valuation config");
            Ok(config)
        }
        None => Ok(ValuationConfig::default()),
    }
}

#[tokio::main]
async fn main() {
    let level = if env::var_os("VAN_VALUE_DEBUG").is_some() {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let raw_args: Vec<String> = env::args().collect();
    if raw_args.get(1).map(|s| s.as_str()) == Some("serve") {
        let port = raw_args
            .get(2)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        if let Err(e) = van_value::api::run_http_server(port, config).await {
            error!("Server error: {e}");
            std::process::exit(1);
        }
        return;
    }

    match van_value::api::run_cli(raw_args, &config) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
