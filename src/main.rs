//! 命令行入口
//!
//! `translate` 把 HTML 文件翻译到目标语言并输出带标识和标记的结果；
//! `restore` 依据持久存储中的原文恢复此前翻译过的文件，不访问网络。

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use page_translator::parsers::{html_to_dom, serialize_document};
use page_translator::translation::{
    ConfigManager, HttpTranslationClient, KeyValueStore, MemoryStore, OriginalContentStore,
    RedbStore, TickOutcome, TranslationConfig, TranslationEngine, TranslationError,
};

const DEFAULT_ENCODING: &str = "utf-8";

#[derive(Parser, Debug)]
#[command(name = "page-translator", version, about = "Incremental in-page translation engine")]
struct Cli {
    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the first of page-translator.toml, ~/.config/page-translator/config.toml, ...)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate an HTML document into a target language
    Translate {
        #[command(flatten)]
        common: CommonArgs,

        /// Target language code
        #[arg(short, long)]
        to: String,

        /// Source language code
        #[arg(short, long)]
        from: Option<String>,

        /// API credential
        #[arg(long, env = "PAGE_TRANSLATOR_API_KEY")]
        api_key: Option<String>,

        /// Translation API endpoint
        #[arg(long)]
        api_url: Option<String>,

        /// Maximum reconciliation rounds before giving up
        #[arg(long, default_value_t = 5)]
        max_rounds: usize,
    },

    /// Restore the original text of a previously translated document
    Restore {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Input HTML file
    input: PathBuf,

    /// Tenant identifier
    #[arg(long)]
    site_id: Option<String>,

    /// Durable store file (redb); in-memory when omitted
    #[arg(long)]
    store: Option<PathBuf>,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Input document charset
    #[arg(long, default_value = DEFAULT_ENCODING)]
    encoding: String,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn load_config(path: Option<&str>) -> Result<TranslationConfig, TranslationError> {
    let manager = match path {
        Some(path) => ConfigManager::from_file(path)?,
        None => ConfigManager::new()?,
    };
    Ok(manager.into_config())
}

fn open_store(path: Option<&PathBuf>) -> Result<Arc<dyn KeyValueStore>, TranslationError> {
    Ok(match path {
        Some(path) => Arc::new(RedbStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    })
}

fn write_output(path: Option<&PathBuf>, bytes: &[u8]) -> io::Result<()> {
    match path {
        Some(path) => fs::write(path, bytes),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()
        }
    }
}

async fn translate(
    mut config: TranslationConfig,
    common: CommonArgs,
    to: String,
    max_rounds: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    config.target_language = Some(to);
    config.auto_translate = true;

    let store = open_store(common.store.as_ref())?;
    let client = HttpTranslationClient::new(&config)?;
    let mut engine = TranslationEngine::new(config, store, client)?;

    let data = fs::read(&common.input)?;
    let dom = html_to_dom(&data, &common.encoding);

    let mut outcome = engine.init(&dom.document).await;
    for _ in 0..max_rounds {
        match outcome {
            TickOutcome::Failed(e) => return Err(e.into()),
            TickOutcome::UpToDate | TickOutcome::Skipped(_) | TickOutcome::Restored { .. } => break,
            _ => outcome = engine.tick(&dom.document).await,
        }
    }

    let stats = engine.dispatch_stats();
    tracing::info!(
        "完成: {} 次请求, {} 项译文, {} 项命中缓存",
        stats.requests_sent,
        stats.items_translated,
        stats.cache_hits
    );

    write_output(
        common.output.as_ref(),
        &serialize_document(&dom, &common.encoding)?,
    )?;
    Ok(())
}

fn restore(config: TranslationConfig, common: CommonArgs) -> Result<(), Box<dyn std::error::Error>> {
    if config.site_id.as_deref().map_or(true, |s| s.trim().is_empty()) {
        return Err(TranslationError::ConfigError("site_id 是必需的".to_string()).into());
    }
    if common.store.is_none() {
        return Err(TranslationError::ConfigError("restore 需要 --store".to_string()).into());
    }

    let store = open_store(common.store.as_ref())?;
    let originals = OriginalContentStore::new(store, &config);

    let data = fs::read(&common.input)?;
    let dom = html_to_dom(&data, &common.encoding);
    let restored = originals.restore_all(&dom.document);
    eprintln!("Restored {} element(s)", restored);

    write_output(
        common.output.as_ref(),
        &serialize_document(&dom, &common.encoding)?,
    )?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Translate {
            common,
            to,
            from,
            api_key,
            api_url,
            max_rounds,
        } => {
            if let Some(site_id) = &common.site_id {
                config.site_id = Some(site_id.clone());
            }
            if let Some(from) = from {
                config.source_language = from;
            }
            if let Some(api_key) = api_key {
                config.api_key = Some(api_key);
            }
            if let Some(api_url) = api_url {
                config.api_url = api_url;
            }
            translate(config, common, to, max_rounds).await
        }
        Command::Restore { common } => {
            if let Some(site_id) = &common.site_id {
                config.site_id = Some(site_id.clone());
            }
            restore(config, common)
        }
    }
}
