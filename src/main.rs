use main_error::MainResult;
mod club;
mod clock;
mod config;
mod filter;
mod pipeline;
mod point;
mod portal;
mod sink;

#[cfg(test)]
mod test_server;

const DEFAULT_CONFIG: &str = "./config.json";

fn main() -> MainResult {
    tracing_subscriber::fmt::init();

    let config_file = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    pipeline::run(config::read(config_file)?)?;

    Ok(())
}
