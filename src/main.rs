//! # Article Weaver CLI (`weave`)
//!
//! Creates and merges articles, keeps them in a local JSON store, and runs
//! the credential-hiding proxy.
//!
//! ## Usage
//!
//! ```bash
//! weave --config ./config/weave.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `weave create <m1> <m2> [m3]` | Write a new article from 2–3 materials |
//! | `weave merge <a1> <a2> [a3]` | Merge 2–3 articles into one |
//! | `weave list` | List saved articles, newest first |
//! | `weave show <id>` | Print one saved article |
//! | `weave delete <id>` | Delete a saved article |
//! | `weave export <id>` | Write an article to `<title>.txt` |
//! | `weave serve proxy` | Start the generation proxy |
//!
//! Material arguments starting with `@` are read from the named file:
//!
//! ```bash
//! weave merge @draft-a.txt @draft-b.txt --segments
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

use article_weaver::article::{export_file_name, export_text, preview, Article};
use article_weaver::config::{self, Config};
use article_weaver::models::{Branch, FallbackReason, MergedArticle, TitleSource};
use article_weaver::pipeline::Creator;
use article_weaver::proxy;
use article_weaver::store::{ArticleStore, JsonFileStore};

const LIST_PREVIEW_CHARS: usize = 100;

/// Article Weaver: combine text fragments into longer articles.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/weave.example.toml` for a full example. Without a
/// config file every setting takes its default.
#[derive(Parser)]
#[command(name = "weave", version, about = "Create and merge articles from text fragments")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/weave.toml")]
    config: PathBuf,

    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new article from two or three reference materials.
    ///
    /// Materials 1 and 2 are required. Prefix an argument with `@` to read
    /// it from a file.
    Create {
        material1: String,
        material2: String,
        material3: Option<String>,
    },

    /// Merge two or three existing articles into one.
    Merge {
        article1: String,
        article2: String,
        article3: Option<String>,

        /// Also print every segment with its type and source.
        #[arg(long)]
        segments: bool,
    },

    /// List saved articles, newest first.
    List,

    /// Print a saved article.
    Show { id: String },

    /// Delete a saved article.
    Delete { id: String },

    /// Write a saved article to `<title>.txt` (UTF-8 with BOM).
    Export {
        id: String,

        /// Output directory.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Start a server.
    Serve {
        #[command(subcommand)]
        target: ServeTarget,
    },
}

#[derive(Subcommand)]
enum ServeTarget {
    /// Credential-hiding proxy for the generation API.
    Proxy,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let pattern = if verbose {
        "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}"
    } else {
        "[{l}] {m}{n}"
    };

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let config = LogConfig::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))?;

    log4rs::init_config(config)?;
    Ok(())
}

fn load(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        log::debug!("no config at {}, using defaults", path.display());
        Ok(Config::minimal())
    }
}

/// `@path` reads the file; anything else is taken literally.
fn read_material(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read material file: {}", path)),
        None => Ok(arg.to_string()),
    }
}

fn read_slots(a: &str, b: &str, c: Option<&str>) -> Result<[String; 3]> {
    Ok([
        read_material(a)?,
        read_material(b)?,
        c.map(read_material).transpose()?.unwrap_or_default(),
    ])
}

fn describe_branch(branch: &Branch) -> String {
    match branch {
        Branch::Ai => "ai".to_string(),
        Branch::Fallback(FallbackReason::AiDisabled) => "fallback (ai disabled)".to_string(),
        Branch::Fallback(FallbackReason::MissingCredential) => {
            "fallback (no credential)".to_string()
        }
        Branch::Fallback(FallbackReason::Failed(e)) => format!("fallback ({}: {})", e.kind(), e),
    }
}

fn describe_title(source: TitleSource) -> &'static str {
    match source {
        TitleSource::Embedded => "embedded",
        TitleSource::Generated => "generated",
        TitleSource::Fallback => "fallback",
    }
}

fn print_segments(merged: &MergedArticle) {
    println!("Segments:");
    for (i, segment) in merged.segments().iter().enumerate() {
        let source = segment
            .source
            .map(|s| format!(" #{}", s))
            .unwrap_or_default();
        println!(
            "  {:>2}. [{}{}] {}",
            i + 1,
            segment.kind.as_str(),
            source,
            preview(&segment.text.replace('\n', "⏎"), 60)
        );
    }
}

fn print_article(article: &Article) {
    println!("Title: {}", article.title);
    println!("Id: {}", article.id);
    println!("Created: {}", article.display_date());
    println!();
    println!("{}", article.body());
}

async fn run_create(cfg: &Config, store: &dyn ArticleStore, slots: [String; 3]) -> Result<()> {
    let creator = Creator::from_config(cfg)?;
    let created = creator
        .create_article([slots[0].as_str(), slots[1].as_str(), slots[2].as_str()])
        .await?;

    let title = creator.fallback().title(&created.content);
    let article = Article::from_created(title, created.content);
    store.save(&article)?;

    print_article(&article);
    eprintln!("Branch: {}", describe_branch(&created.branch));
    Ok(())
}

async fn run_merge(
    cfg: &Config,
    store: &dyn ArticleStore,
    slots: [String; 3],
    show_segments: bool,
) -> Result<()> {
    let creator = Creator::from_config(cfg)?;
    let merged = creator
        .merge_articles([slots[0].as_str(), slots[1].as_str(), slots[2].as_str()])
        .await?;

    if show_segments {
        print_segments(&merged.article);
        println!();
    }

    let inputs = slots.into_iter().filter(|s| !s.trim().is_empty()).collect();
    let article = Article::from_merged(merged.article, inputs);
    store.save(&article)?;

    print_article(&article);
    eprintln!(
        "Branch: {}, title: {}",
        describe_branch(&merged.branch),
        describe_title(merged.title_source)
    );
    Ok(())
}

fn run_list(store: &dyn ArticleStore) -> Result<()> {
    let articles = store.list()?;
    if articles.is_empty() {
        println!("No saved articles.");
        return Ok(());
    }
    for article in articles {
        let kind = if article.merged_content.is_some() {
            "merged"
        } else {
            "created"
        };
        println!(
            "{}  {}  [{}] {}",
            article.id,
            article.display_date(),
            kind,
            article.title
        );
        println!("    {}", preview(article.body(), LIST_PREVIEW_CHARS).replace('\n', " "));
    }
    Ok(())
}

fn find(store: &dyn ArticleStore, id: &str) -> Result<Article> {
    match store.get(id)? {
        Some(article) => Ok(article),
        None => bail!("No article with id '{}'", id),
    }
}

fn run_export(store: &dyn ArticleStore, id: &str, out: &Path) -> Result<()> {
    let article = find(store, id)?;
    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    let path = out.join(export_file_name(&article.title));
    std::fs::write(&path, export_text(&article))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Exported to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let cfg = load(&cli.config)?;
    let store = JsonFileStore::new(&cfg.storage.path);

    match cli.command {
        Commands::Create {
            material1,
            material2,
            material3,
        } => {
            let slots = read_slots(&material1, &material2, material3.as_deref())?;
            run_create(&cfg, &store, slots).await?;
        }
        Commands::Merge {
            article1,
            article2,
            article3,
            segments,
        } => {
            let slots = read_slots(&article1, &article2, article3.as_deref())?;
            run_merge(&cfg, &store, slots, segments).await?;
        }
        Commands::List => {
            run_list(&store)?;
        }
        Commands::Show { id } => {
            let article = find(&store, &id)?;
            print_article(&article);
            if let Some(merged) = &article.merged_content {
                println!();
                print_segments(merged);
            }
        }
        Commands::Delete { id } => {
            if !store.delete(&id)? {
                bail!("No article with id '{}'", id);
            }
            println!("Deleted {}", id);
        }
        Commands::Export { id, out } => {
            run_export(&store, &id, &out)?;
        }
        Commands::Serve { target } => match target {
            ServeTarget::Proxy => {
                proxy::run_proxy(&cfg).await?;
            }
        },
    }

    Ok(())
}
