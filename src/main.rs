use tracing::error;
use trace_explorer::{api, config::Settings, logging};

#[tokio::main]
async fn main() {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_logger(&settings.log_level) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = api::start_server(&settings).await {
        error!("Trace explorer stopped: {}", e);
        std::process::exit(1);
    }
}
