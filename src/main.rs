use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("unitwatch=info,unitwatch_lib=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = unitwatch_lib::settings::resolve_config_path(std::env::args().nth(1));
    if let Err(error) = unitwatch_lib::run(&config_path).await {
        tracing::error!("unitwatch stopped: {error}");
        std::process::exit(1);
    }
}
