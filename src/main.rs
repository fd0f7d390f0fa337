mod app;
mod comments;
mod config;
mod error;
mod event;
mod github;
mod indexer;
mod logger;
mod navigation;
mod parser;
mod render;
mod review;
mod syntax;
mod types;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use crate::app::App;
use crate::config::{Config, DiffSource};
use crate::github::{check_gh_cli, load_with_fetch_retry, parse_pr_url, GhProvider, Provider};
use crate::ui::helpers::{install_panic_hook, restore_terminal, setup_terminal};

const LOGO: &str = r#"
  審査
  shinsa
"#;

#[derive(Parser)]
#[command(name = "shinsa")]
#[command(about = "Review a GitHub PR and its comment threads in the terminal")]
#[command(version)]
struct Args {
    /// GitHub PR URL (e.g., https://github.com/owner/repo/pull/123)
    pr_url: String,

    /// Local clone used to compute the diff (defaults to the current directory)
    #[arg(long)]
    repo_path: Option<PathBuf>,

    /// Fetch the diff from GitHub instead of the local clone
    #[arg(long)]
    remote_diff: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = logger::init() {
        eprintln!("Logging to {}", path.display());
    }
    eprintln!("{}", LOGO);

    let mut config = Config::load();
    if args.remote_diff {
        config.diff.source = DiffSource::Remote;
    }

    check_gh_cli().await?;

    let pr = parse_pr_url(&args.pr_url)?;
    eprintln!(
        "Fetching PR #{} from {}/{}...",
        pr.number, pr.owner, pr.repo
    );
    info!("Session start for {}", pr.repo_full_name());

    let provider: Arc<dyn Provider> =
        Arc::new(GhProvider::new(pr, args.repo_path, config.diff.source));
    let snapshot = load_with_fetch_retry(provider.as_ref())
        .await
        .context("Failed to load pull request")?;

    eprintln!(
        "Found {} files. Starting viewer...",
        snapshot.files.len()
    );

    let (tx, rx) = event::channel();
    let app = App::new(provider, tx.clone(), config, snapshot);

    install_panic_hook();
    let mut terminal = setup_terminal()?;
    event::spawn_input_task(tx);
    let result = app.run(&mut terminal, rx).await;
    restore_terminal(&mut terminal)?;

    info!("Session end");
    result
}
