//! `sprout`: reconcile historical label files into one tag store and query it.
//!
//! # Usage
//!
//! ```
//! sprout reconcile
//! sprout --config ~/garden/sprout.toml search basil
//! sprout print 42 --copies 3
//! ```
//!
//! Settings come from the TOML file named by `--config`, then from
//! `SPROUT_*` environment variables (`SPROUT_SOURCES__PRINT_LOG` for nested
//! keys), then from command-line flags.

mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use sprout_core::{
  store::{TagQuery, TagStore},
  tag::{Copies, TagId},
};
use sprout_reconcile::{ReconcileConfig, fuzzy};
use sprout_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Plant label tag store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "sprout.toml")]
  config: PathBuf,

  /// SQLite database path; overrides the configured one.
  #[arg(long, global = true, value_name = "FILE")]
  database: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Merge every configured source into the store, then match the master
  /// list if one is configured.
  Reconcile {
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
  },
  /// List stored tags, newest first.
  List {
    #[arg(long)]
    confirmed: bool,
    #[arg(long)]
    limit:     Option<usize>,
    #[arg(long)]
    offset:    Option<usize>,
  },
  /// Case-insensitive search over label text.
  Search {
    text:  String,
    #[arg(long)]
    limit: Option<usize>,
  },
  /// One tag with its print history.
  Show { tag_id: i64 },
  /// Store-wide counts.
  Stats,
  /// Tags printed more than once at a time in the last few weeks.
  Recent {
    #[arg(long, default_value_t = 4)]
    weeks: i64,
  },
  /// Record a print of an existing tag.
  Print {
    tag_id: i64,
    #[arg(long, default_value_t = 1)]
    copies: i64,
  },
  /// Match the configured master list against confirmed tags.
  MatchList {
    #[arg(long)]
    json: bool,
  },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let config = load_config(&cli)?;

  let db_path = expand_tilde(&config.database);
  let store = SqliteStore::open(&db_path)
    .await
    .with_context(|| format!("failed to open store at {db_path:?}"))?;

  match cli.command {
    Command::Reconcile { json } => {
      let report = sprout_reconcile::reconcile(&store, &config)
        .await
        .context("reconciliation failed")?;
      let matches = match &config.master_list {
        Some(path) => Some(
          fuzzy::match_master_list(&store, &config, &expand_tilde(path))
            .await
            .context("master list matching failed")?,
        ),
        None => None,
      };
      if json {
        let out = serde_json::json!({ "reconcile": report, "master_list": matches });
        println!("{}", serde_json::to_string_pretty(&out)?);
      } else {
        print!("{report}");
        if let Some(matches) = matches {
          print!("{matches}");
        }
      }
    }
    Command::List { confirmed, limit, offset } => {
      let query = TagQuery { confirmed_only: confirmed, limit, offset };
      let tags = store.list(&query).await.context("listing tags")?;
      let total = store.count(confirmed).await.context("counting tags")?;
      render::tag_table(&tags, &config.label_fields);
      println!("{} of {total} tag(s)", tags.len());
    }
    Command::Search { text, limit } => {
      let tags = store.search(&text, limit).await.context("searching tags")?;
      render::tag_table(&tags, &config.label_fields);
    }
    Command::Show { tag_id } => {
      let Some(tag) = store.get(TagId(tag_id)).await.context("loading tag")? else {
        bail!("no tag {}", TagId(tag_id));
      };
      render::tag_detail(&tag);
    }
    Command::Stats => {
      let stats = store.statistics().await.context("computing statistics")?;
      render::statistics(&stats, &config.label_fields);
    }
    Command::Recent { weeks } => {
      let since = weeks_before(Utc::now(), weeks)?;
      let recent = store
        .recently_printed(since, None)
        .await
        .context("loading recent prints")?;
      let multi: Vec<_> = recent.into_iter().filter(|r| r.multi_copy).collect();
      render::recent(&multi, &config.label_fields);
    }
    Command::Print { tag_id, copies } => {
      let copies = Copies::new(copies)?;
      let id = TagId(tag_id);
      if store.get(id).await.context("loading tag")?.is_none() {
        bail!("no tag {id}");
      }
      let event = store
        .append_print_event(id, copies, Utc::now())
        .await
        .context("recording print")?;
      tracing::info!(tag = %id, copies = %event.copies, "print recorded");
    }
    Command::MatchList { json } => {
      let Some(path) = &config.master_list else {
        bail!("no master_list configured");
      };
      let report = fuzzy::match_master_list(&store, &config, &expand_tilde(path))
        .await
        .context("master list matching failed")?;
      if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
      } else {
        print!("{report}");
      }
    }
  }

  Ok(())
}

/// File, then environment, then flags.
fn load_config(cli: &Cli) -> anyhow::Result<ReconcileConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(expand_tilde(&cli.config)).required(false))
    .add_source(
      config::Environment::with_prefix("SPROUT")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let mut config: ReconcileConfig = settings
    .try_deserialize()
    .context("failed to deserialise ReconcileConfig")?;
  if let Some(database) = &cli.database {
    config.database = database.clone();
  }
  Ok(config)
}

/// `now` minus `weeks`, or an error when that is out of range.
fn weeks_before(now: DateTime<Utc>, weeks: i64) -> anyhow::Result<DateTime<Utc>> {
  TimeDelta::try_weeks(weeks)
    .and_then(|span| now.checked_sub_signed(span))
    .with_context(|| format!("--weeks {weeks} is out of range"))
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
