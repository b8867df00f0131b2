mod cache;
mod config;
mod controllers;
mod db;
mod error;
mod event;
mod filepool;
mod services;
mod session;
mod site;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use controllers::{
  CertificateController, CompetenciesController, CompetencyController, LearningPlansController, ModuleRef,
};
use session::Session;
use sync::{Context, SyncResult, SyncSource};

#[derive(Parser, Debug)]
#[command(name = "lms-sync")]
#[command(about = "Offline-tolerant client for learning platform web services")]
#[command(version)]
struct Args {
  /// Path to config file (default: $LMS_SYNC_CONFIG, ./lms-sync.yaml, then $XDG_CONFIG_HOME/lms-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Drop cached data and reload from the site (pull to refresh)
  #[arg(short, long)]
  refresh: bool,

  /// Drop the view's cached data and downloads without loading it
  #[arg(long, conflicts_with = "refresh")]
  invalidate: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Learning plans of the current user, or of another user
  Plans {
    #[arg(long)]
    user: Option<i64>,
  },
  /// Competencies of a learning plan or a course
  Competencies {
    #[arg(long)]
    plan: Option<i64>,
    #[arg(long)]
    course: Option<i64>,
    #[arg(long)]
    user: Option<i64>,
  },
  /// One competency of a learning plan or a course
  Competency {
    /// Competency id
    id: i64,
    #[arg(long)]
    plan: Option<i64>,
    #[arg(long)]
    course: Option<i64>,
    #[arg(long)]
    user: Option<i64>,
  },
  /// A course's certificate activity
  Certificate {
    #[arg(long)]
    course: i64,
    /// Course module id of the activity
    #[arg(long)]
    module: i64,
    #[arg(long, default_value = "")]
    name: String,
    /// Download (if needed) and print the location of the issued certificate
    #[arg(long)]
    open: bool,
  },
  /// Drop one cached response, or every response under a key prefix
  Invalidate {
    key: String,
    #[arg(long)]
    prefix: bool,
  },
  /// Remove every cached response and downloaded file of the site
  Logout,
}

/// Log to a daily rolling file in the site's log directory.
///
/// RUST_LOG wins over the configured level.
fn init_tracing(config: &Config) -> Result<WorkerGuard> {
  let log_dir = config.log_dir()?;
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;
  let appender = tracing_appender::rolling::daily(&log_dir, "lms-sync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let level = config.log.level.as_deref().unwrap_or("info");
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(level))
    .unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .with(filter)
    .init();
  Ok(guard)
}

/// Run a controller once through the sync protocol.
async fn sync<S: SyncSource>(session: &Session, source: S, refresh: bool) -> (SyncResult<S::Output>, S) {
  let mut op = session.operation(source);
  let result = if refresh {
    op.invalidate_and_refetch().await
  } else {
    op.fetch(false).await
  };
  debug!(entity = %op.source().entity(), state = ?op.state(), outcome = result.label(), "sync finished");
  (result, op.into_source())
}

/// Drop what a controller depends on without loading it.
async fn forget<S: SyncSource>(session: &Session, source: S) -> Result<()> {
  let mut op = session.operation(source);
  let entity = op.source().entity();
  op.invalidate().await?;
  println!("{}", json!({ "invalidated": entity }));
  Ok(())
}

/// Load a view, or only forget it, and print the outcome.
async fn show<S>(session: &mut Session, source: S, args: &Options) -> Result<()>
where
  S: SyncSource,
  S::Output: Serialize,
{
  if args.invalidate {
    return forget(session, source).await;
  }
  let (result, _) = sync(session, source, args.refresh).await;
  report(session, result, serde_json::Value::Null)
}

/// Print the outcome and the events it produced as JSON.
fn report<T: Serialize>(session: &mut Session, result: SyncResult<T>, extra: serde_json::Value) -> Result<()> {
  let events = session.events().drain();
  let outcome = result.label();
  let failed = result.is_failed();
  let error = result.error().map(String::from);
  let output = json!({
    "outcome": outcome,
    "error": error,
    "data": result.into_data(),
    "events": events,
    "extra": extra,
  });
  println!("{}", serde_json::to_string_pretty(&output)?);

  if failed {
    return Err(eyre!("{}", error.unwrap_or_default()));
  }
  Ok(())
}

/// Flags shared by every view command
struct Options {
  refresh: bool,
  invalidate: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _guard = init_tracing(&config)?;
  info!(site = %config.site.url, "lms-sync starting");

  let token = Config::get_token()?;
  let mut session = Session::start(&config, &token).await?;
  let options = Options {
    refresh: args.refresh,
    invalidate: args.invalidate,
  };

  match args.command {
    Command::Plans { user } => {
      let controller = LearningPlansController::new(&session, user);
      show(&mut session, controller, &options).await?;
    }
    Command::Competencies { plan, course, user } => {
      let controller = CompetenciesController::new(&session, Context::from_ids(plan, course), user);
      show(&mut session, controller, &options).await?;
    }
    Command::Competency { id, plan, course, user } => {
      let controller = CompetencyController::new(&session, Context::from_ids(plan, course), id, user);
      show(&mut session, controller, &options).await?;
    }
    Command::Certificate { course, module, name, open } => {
      if !session.certificates().is_plugin_enabled() {
        return Err(eyre!("Certificates are not available on {}", config.site.url));
      }
      let module = ModuleRef {
        id: module,
        name,
        description: String::new(),
      };
      let controller = CertificateController::new(&session, course, module);
      if options.invalidate {
        forget(&session, controller).await?;
      } else {
        let (result, controller) = sync(&session, controller, options.refresh).await;
        let extra = match result.data() {
          Some(view) => {
            let opened = if open {
              match controller.open(view).await {
                Ok(location) => json!({ "opened": location, "url": location.to_string() }),
                Err(message) => json!({ "open_error": message }),
              }
            } else {
              serde_json::Value::Null
            };
            json!({ "download": controller.download_status(view), "open": opened })
          }
          None => serde_json::Value::Null,
        };
        report(&mut session, result, extra)?;
      }
    }
    Command::Invalidate { key, prefix } => {
      if prefix {
        session.site().invalidate_ws_cache_for_key_starting_with(&key)?;
      } else {
        session.site().invalidate_ws_cache_for_key(&key)?;
      }
      println!("{}", json!({ "invalidated": key, "prefix": prefix }));
    }
    Command::Logout => {
      session.logout().await?;
      println!("{}", json!({ "logged_out": config.site_id() }));
      return Ok(());
    }
  }

  session.end();
  Ok(())
}
