use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use leetgpt_core::page::extract::extract_context;
use leetgpt_core::render::{render_assistant, to_plain_text};
use leetgpt_core::{
    ChatStore, Config, ExtensionHost, MemoryStore, PageDocument, Popup, RenderFormat, SqliteStore,
};

const DEFAULT_URL: &str = "https://leetcode.com/problems/two-sum/";

#[derive(Parser)]
#[command(name = "leetgpt")]
#[command(about = "Hints for LeetCode problems from a saved problem page", version)]
struct Cli {
    /// Config file (defaults to <config dir>/leetcode-gpt/config.json)
    #[arg(long, global = true, env = "LEETGPT_CONFIG")]
    config: Option<PathBuf>,

    /// Answer format: html or markdown
    #[arg(long, global = true)]
    format: Option<String>,

    /// Keep chat transcripts in memory instead of SQLite
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the problem context found in a saved page
    Extract {
        /// Saved problem page (HTML)
        page: PathBuf,
        /// URL the page was saved from
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
    /// Ask one question the way the popup does
    Ask {
        page: PathBuf,
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
        /// Your question
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Chat through the sidebar (/toggle, /quit)
    Chat {
        page: PathBuf,
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?.with_env_overrides(|name| std::env::var(name).ok()),
        None => Config::load()?,
    };
    if let Some(format) = &cli.format {
        config.format = RenderFormat::from_str(format).ok_or_else(|| {
            let known: Vec<_> = RenderFormat::all().iter().map(|f| f.as_str()).collect();
            anyhow!("unknown format '{}', expected one of: {}", format, known.join(", "))
        })?;
    }
    Ok(config)
}

fn open_store(config: &Config, ephemeral: bool) -> Result<Arc<dyn ChatStore>> {
    if ephemeral {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let path = config.resolved_store_path()?;
    Ok(Arc::new(SqliteStore::open(&path)?))
}

fn read_page(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read page {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(model = %config.model, format = config.format.display_name(), "configuration loaded");

    match &cli.command {
        Commands::Extract { page, url } => extract(page, url),
        Commands::Ask {
            page,
            url,
            question,
        } => {
            let store = open_store(&config, cli.ephemeral)?;
            ask(config, store, page, url, &question.join(" ")).await
        }
        Commands::Chat { page, url } => {
            let store = open_store(&config, cli.ephemeral)?;
            chat(config, store, page, url).await
        }
    }
}

fn extract(page: &Path, url: &str) -> Result<()> {
    let html = read_page(page)?;
    let document = PageDocument::new(url, &html);
    let context = extract_context(&document.parse());
    if context.is_empty() {
        warn!(page = %page.display(), "no problem content found");
    }
    println!("{}", serde_json::to_string_pretty(&context)?);
    Ok(())
}

async fn ask(
    config: Config,
    store: Arc<dyn ChatStore>,
    page: &Path,
    url: &str,
    question: &str,
) -> Result<()> {
    let html = read_page(page)?;
    let host = ExtensionHost::new(config, store);
    host.open_tab(url, &html).await;

    let mut popup = Popup::open(host).await?;
    popup.send(question).await?;
    if let Some(line) = popup.lines().last() {
        println!("{}", to_plain_text(&line.html));
    }
    Ok(())
}

async fn chat(config: Config, store: Arc<dyn ChatStore>, page: &Path, url: &str) -> Result<()> {
    let html = read_page(page)?;
    let format = config.format;
    let host = ExtensionHost::new(config, store);
    let tab = host.open_tab(url, &html).await;
    let agent = host
        .agent(tab)
        .await
        .ok_or_else(|| anyhow!("{} is not a LeetCode problem page", url))?;

    if let Some(welcome) = agent.transcript().first() {
        println!("{}\n", to_plain_text(&welcome.html));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/toggle" => {
                if let Err(e) = host.click_action(tab).await {
                    println!("{}", e.user_message());
                } else {
                    let state = if agent.is_visible() { "shown" } else { "hidden" };
                    println!("(sidebar {})", state);
                }
            }
            message => match agent.send(message).await {
                Ok(answer) => println!("{}\n", to_plain_text(&render_assistant(&answer, format))),
                Err(e) => println!("{}\n", e.user_message()),
            },
        }
    }

    host.close_tab(tab).await;
    Ok(())
}
