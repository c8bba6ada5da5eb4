use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lectern::cache::{CacheStore, SqliteStore};
use lectern::config::Config;
use lectern::connectivity::{Connectivity, FixedConnectivity, HttpProbe};
use lectern::reading::{DownloadEvent, NewBookmark, ReadingGateway};
use lectern::remote::HttpRemoteStore;

#[derive(Parser, Debug)]
#[command(name = "lectern")]
#[command(about = "Read books from a document store, cache-first and offline-capable")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/lectern/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Treat the remote store as unreachable
  #[arg(long, global = true)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show a book with its volumes
  Book {
    book_id: String,
    /// Bypass the cache and re-fetch
    #[arg(long)]
    refresh: bool,
  },
  /// List the headings of a book
  Headings { book_id: String },
  /// Show a single heading
  Heading { heading_id: String },
  /// Show the content of a heading
  Content { heading_id: String },
  /// List the bookmarks of a book, newest first
  Bookmarks { book_id: String },
  /// Add or remove a bookmark
  #[command(subcommand)]
  Bookmark(BookmarkCommand),
  /// Report whether a book is fully available offline
  Status { book_id: String },
  /// Cache a book for offline reading, streaming progress as JSON lines
  Download { book_id: String },
  /// List books that are fully available offline
  Offline,
  /// Show reading stats (defaults to the configured user)
  Stats { user_id: Option<String> },
}

#[derive(Subcommand, Debug)]
enum BookmarkCommand {
  Add {
    book_id: String,
    #[arg(long)]
    position: Option<String>,
    #[arg(long)]
    note: Option<String>,
  },
  Remove { bookmark_id: String, book_id: String },
}

#[derive(Serialize)]
struct OfflineStatus<'a> {
  book_id: &'a str,
  fully_cached: bool,
}

#[derive(Serialize)]
struct Removed<'a> {
  bookmark_id: &'a str,
  removed: bool,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  let out =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to encode output: {}", e))?;
  println!("{}", out);
  Ok(())
}

/// Log to a daily rolling file so stdout carries only command output.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("lectern")
    .join("logs");

  let appender = tracing_appender::rolling::daily(log_dir, "lectern.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lectern=info")))
    .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
    .init();

  Ok(guard)
}

fn build_gateway(config: &Config, offline: bool) -> Result<ReadingGateway> {
  let cache: Arc<dyn CacheStore> = match &config.cache.path {
    Some(path) => Arc::new(SqliteStore::open_at(path)?),
    None => Arc::new(SqliteStore::open()?),
  };

  let connectivity: Arc<dyn Connectivity> = if offline {
    Arc::new(FixedConnectivity::new(false))
  } else {
    Arc::new(HttpProbe::new(config)?)
  };

  let remote = Arc::new(HttpRemoteStore::new(config)?);

  Ok(ReadingGateway::new(
    cache,
    connectivity,
    remote,
    config.cache.gateway_settings(),
  ))
}

async fn download(gateway: &ReadingGateway, book_id: &str) -> Result<()> {
  let mut handle = gateway.download_with_progress(book_id);
  let mut interrupted = false;

  loop {
    tokio::select! {
      event = handle.next() => {
        let Some(event) = event else { break };
        let line = serde_json::to_string(&event)
          .map_err(|e| eyre!("Failed to encode event: {}", e))?;
        println!("{}", line);
        if let DownloadEvent::Failed { reason, .. } = &event {
          return Err(eyre!("Download of {} failed: {}", book_id, reason));
        }
      }
      _ = tokio::signal::ctrl_c(), if !interrupted => {
        tracing::info!(book_id, "interrupt received, cancelling download");
        interrupted = true;
        handle.cancel();
      }
    }
  }

  Ok(())
}

async fn run(gateway: &ReadingGateway, config: &Config, command: Command) -> Result<()> {
  match command {
    Command::Book { book_id, refresh } => {
      let loaded = if refresh {
        gateway.refresh_book(&book_id).await
      } else {
        gateway.get_book(&book_id).await
      };
      match loaded {
        Ok(book) => print_json(&book),
        Err(e) if e.is_retryable() => Err(eyre!("{} (retry later or check connectivity)", e)),
        Err(e) => Err(e.into()),
      }
    }
    Command::Headings { book_id } => print_json(&gateway.get_headings(&book_id).await),
    Command::Heading { heading_id } => match gateway.get_heading(&heading_id).await {
      Some(heading) => print_json(&heading),
      None => Err(eyre!("Heading not found: {}", heading_id)),
    },
    Command::Content { heading_id } => print_json(&gateway.get_heading_content(&heading_id).await),
    Command::Bookmarks { book_id } => print_json(&gateway.get_bookmarks(&book_id).await),
    Command::Bookmark(BookmarkCommand::Add {
      book_id,
      position,
      note,
    }) => {
      let mut draft = NewBookmark::new(book_id);
      if let Some(position) = position {
        draft = draft.with_position(position);
      }
      if let Some(note) = note {
        draft = draft.with_note(note);
      }

      match gateway.add_bookmark(draft).await {
        Some(bookmark) => print_json(&bookmark),
        None => Err(eyre!("Failed to create bookmark; see the log for details")),
      }
    }
    Command::Bookmark(BookmarkCommand::Remove {
      bookmark_id,
      book_id,
    }) => {
      let removed = gateway.remove_bookmark(&bookmark_id, &book_id).await;
      print_json(&Removed {
        bookmark_id: &bookmark_id,
        removed,
      })?;
      if removed {
        Ok(())
      } else {
        Err(eyre!("Failed to remove bookmark {}", bookmark_id))
      }
    }
    Command::Status { book_id } => print_json(&OfflineStatus {
      book_id: &book_id,
      fully_cached: gateway.is_fully_cached(&book_id),
    }),
    Command::Download { book_id } => download(gateway, &book_id).await,
    Command::Offline => print_json(&gateway.offline_books()),
    Command::Stats { user_id } => {
      let user_id = user_id
        .or_else(|| config.user_id.clone())
        .ok_or_else(|| eyre!("No user id given and none configured (set user_id in the config)"))?;
      print_json(&gateway.get_reading_stats(&user_id).await)
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging()?;

  let config = Config::load(args.config.as_deref())?;
  let gateway = build_gateway(&config, args.offline)?;

  let result = run(&gateway, &config, args.command).await;

  // Let scheduled background refreshes land in the cache before exiting
  gateway.settle().await;
  result
}
