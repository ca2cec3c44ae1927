use std::env;

use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_env("FITSIM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    std::process::exit(fitsim::cli::run_with_args(&args));
}
