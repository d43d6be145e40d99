mod api;
mod cache;
mod config;
mod engagement;
mod logging;
mod pager;
mod pipeline;
mod report;
mod store;

use clap::{Parser, ValueEnum};
use color_eyre::Result;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::client::HttpResourceClient;
use crate::cache::{
  reset_on_version_change, KeyValueStore, MemoryStore, NoopStore, SqliteStore, TtlCache,
};
use crate::engagement::types::{SaveTarget, CLIENT_ID_FIELD, SELECT_CLIENT_VIEW};
use crate::engagement::{LookupResource, ResourceSource};
use crate::pipeline::Pipeline;
use crate::store::ViewModelStore;

#[derive(Parser, Debug)]
#[command(name = "engage")]
#[command(about = "Load the engagement setup wizard's data and report what arrived")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/engage/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Engagement id from the route; without it only lookups are loaded
  #[arg(short, long)]
  id: Option<String>,

  /// Object id of the current user (overrides config)
  #[arg(short, long)]
  user: Option<String>,

  /// Select this client and load its entities
  #[arg(long)]
  client: Option<String>,

  /// Keep the lookup cache in memory for this run instead of on disk
  #[arg(long)]
  no_cache: bool,

  /// Wipe the lookup cache before loading
  #[arg(long)]
  clear_cache: bool,

  /// After loading, write this section's form data back (checks the etag round trip)
  #[arg(long, value_enum)]
  save: Option<SaveSection>,

  /// Mirror logs to stderr
  #[arg(short, long)]
  verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SaveSection {
  Engagement,
  InitialSetup,
  RiskAssessment,
}

impl From<SaveSection> for SaveTarget {
  fn from(section: SaveSection) -> Self {
    match section {
      SaveSection::Engagement => SaveTarget::Engagement,
      SaveSection::InitialSetup => SaveTarget::InitialSetup,
      SaveSection::RiskAssessment => SaveTarget::RiskAssessment,
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.verbose)?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  for name in config.cache.expire_days.keys() {
    if LookupResource::from_resource_name(name).is_none() {
      warn!(lookup = %name, "Expiry override for unknown lookup");
    }
  }

  let storage: Arc<dyn KeyValueStore> = if !config.cache.enabled {
    Arc::new(NoopStore)
  } else if args.no_cache {
    Arc::new(MemoryStore::new())
  } else {
    Arc::new(SqliteStore::open(
      config.cache.path.as_deref(),
      &config.api.base_url,
    )?)
  };
  if args.clear_cache {
    storage.clear()?;
    info!("Cache cleared");
  }
  reset_on_version_change(storage.as_ref(), env!("CARGO_PKG_VERSION"))?;

  let client = Arc::new(HttpResourceClient::new(&config)?);
  let source = ResourceSource::new(client, TtlCache::new(storage), config.api.page_size)
    .with_expire_overrides(config.cache.expire_days.clone());

  // Command line overrides config
  let current_user = args.user.or(config.user_object_id);
  let store = Arc::new(ViewModelStore::new());
  let pipeline =
    Pipeline::new(Arc::new(source), Arc::clone(&store)).with_current_user(current_user);

  let result = pipeline.mount(args.id.as_deref()).await;
  if let Err(e) = &result {
    error!(error = %e, "Load failed");
  }

  if let Some(client_id) = args.client {
    pipeline.set_form_value(SELECT_CLIENT_VIEW, CLIENT_ID_FIELD, Value::String(client_id));
  }

  if let (Ok(()), Some(section)) = (&result, args.save) {
    pipeline.save(section.into()).await?;
  }

  // Background fetches are not joined by the pipeline; wait for them before reporting
  pipeline.detached().idle().await;

  let load = store.load_metadata();
  info!(
    completed = load.loading_tasks_completed,
    total = load.loading_tasks_total,
    progress = store.progress_percent(),
    ready = store.is_ready(),
    has_error = load.has_error,
    "Load finished"
  );

  print!("{}", report::render_summary(&store.snapshot()));
  while let Some(toast) = store.next_toast() {
    println!("[{:?}] {}", toast.kind, toast.message);
  }

  // Screen unmount
  store.clear();

  result
}
