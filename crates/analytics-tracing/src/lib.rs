use dotenvy::dotenv;
use std::{
    path::PathBuf,
    sync::{Mutex, Once},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,api_server=debug,ai=debug";

static DOTENV: Once = Once::new();

fn load_dotenv() {
    DOTENV.call_once(|| match dotenv() {
        Ok(path) => eprintln!(".env read successfully from {}", path.display()),
        Err(e) => eprintln!("Could not load .env file: {e}"),
    });
}

fn init_env_layer() -> tracing_subscriber::EnvFilter {
    // must run before the filter is built so RUST_LOG in .env is honored
    load_dotenv();

    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

pub fn init_tracing_to_stdout() {
    let env_layer = init_env_layer();

    let stdout_layer = tracing_subscriber::fmt::layer().with_ansi(true);

    tracing_subscriber::registry()
        .with(env_layer)
        .with(stdout_layer)
        .init();
}

pub fn init_tracing_to_file(log_dir: PathBuf) {
    let env_layer = init_env_layer();

    let file_log_layer = {
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            eprintln!("Failed to create log dir: {}", e);
            init_tracing_to_stdout(); // fallback to stdout tracing
            return;
        }
        let file = match std::fs::File::create(log_dir.join("app.log")) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Failed to create log file: {}", e);
                init_tracing_to_stdout(); // fallback to stdout tracing
                return;
            }
        };
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
    };

    tracing_subscriber::registry()
        .with(env_layer)
        .with(file_log_layer)
        .init();
}

/// Log to `$LOCAL_LOG_DIR/app.log` when the variable is set, to stdout otherwise.
pub fn init_tracing() {
    // .env may carry LOCAL_LOG_DIR too
    load_dotenv();
    match std::env::var("LOCAL_LOG_DIR") {
        Ok(log_dir) if !log_dir.is_empty() => init_tracing_to_file(log_dir.into()),
        _ => init_tracing_to_stdout(),
    }
}
