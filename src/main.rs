mod cli;
mod config;
mod error;
mod frontend;
mod package_manager;
mod report;
mod resolver;
mod session;

use anyhow::Result;
use clap::Parser;
use package_manager::{CommandRunner, Elevation, RpmBackend};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = cli::Cli::parse();

    // 加载配置
    let config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load_or_default()?,
    };

    let backend = RpmBackend::from_config(&config);
    let runner = CommandRunner::new(Elevation::for_current_user(config.elevation.clone()));
    let (session, events) = session::Session::new(backend, runner);

    let saver = config
        .save_transcripts
        .then(|| report::TranscriptSaver::new(config.transcript_dir.clone()));
    let initial = cli.initial_action(&config);

    frontend::Frontend::new(session, events, cli.json, saver)
        .run(initial)
        .await
}
