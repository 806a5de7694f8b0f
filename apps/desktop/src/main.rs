use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{
    config::{load_settings, load_settings_from},
    AddressStore, CoordinatorEvent, DetailRenderer, EntityDetailApp, EntityService,
    HttpEntityService, InMemoryEntityService, ListWidget, MemoryAddressStore, Notice, Notifier,
    ViewSinks,
};
use shared::domain::{Entity, EntityFields, EntityId, Source};
use tokio::{sync::broadcast, time::timeout};
use tracing::info;

#[derive(Parser, Debug)]
struct Args {
    /// Entity API base url; the seeded in-memory service is used when absent.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 10)]
    entity_id: i64,
    /// New name saved through the edit flow; defaults to the current name.
    #[arg(long)]
    rename: Option<String>,
    /// Initial address fragment, e.g. `#11`.
    #[arg(long, default_value = "")]
    fragment: String,
}

struct ConsoleDetail;

impl DetailRenderer for ConsoleDetail {
    fn render(&self, entity: &Entity) {
        match serde_json::to_string(entity) {
            Ok(json) => println!("detail: {json}"),
            Err(err) => println!("detail: entity {} ({err})", entity.id),
        }
    }

    fn set_loading(&self, loading: bool) {
        if loading {
            println!("detail: loading...");
        }
    }

    fn clear(&self) {
        println!("detail: hidden");
    }
}

struct ConsoleList;

impl ListWidget for ConsoleList {
    fn reload(&self) {
        println!("list: reloaded");
    }

    fn highlight(&self, id: EntityId) {
        println!("list: row {id} highlighted");
    }
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        println!(
            "notice[{:?}, {}ms]: {}",
            notice.level,
            notice.duration.as_millis(),
            notice.message
        );
    }
}

async fn demo_service() -> Arc<InMemoryEntityService> {
    let service = InMemoryEntityService::new().with_latency(Duration::from_millis(20));
    service.seed(EntityId(10), "Jawa Barat", 5).await;
    service.seed(EntityId(11), "Bali", 2).await;
    service.seed(EntityId(12), "Papua", 7).await;
    Arc::new(service)
}

async fn wait_for_update(
    events: &mut broadcast::Receiver<CoordinatorEvent>,
    id: EntityId,
) -> Result<()> {
    timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await? {
                CoordinatorEvent::Displayed { request, .. }
                    if request.id == id && request.source == Source::Update =>
                {
                    return Ok::<(), anyhow::Error>(());
                }
                CoordinatorEvent::Failed { request, error }
                    if request.id == id && request.source == Source::Update =>
                {
                    bail!("update reload failed: {error}");
                }
                _ => {}
            }
        }
    })
    .await
    .context("timed out waiting for the updated entity")?
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => load_settings_from(path)?,
        None => load_settings()?,
    };
    if args.server_url.is_some() {
        settings.server_url = args.server_url.clone();
    }

    let service: Arc<dyn EntityService> = match &settings.server_url {
        Some(url) => Arc::new(HttpEntityService::new(url)?),
        None => demo_service().await,
    };
    let store = Arc::new(MemoryAddressStore::with_fragment(&args.fragment));
    let app = EntityDetailApp::start(
        service,
        store.clone(),
        ViewSinks {
            detail: Arc::new(ConsoleDetail),
            list: Arc::new(ConsoleList),
        },
        Arc::new(ConsoleNotifier),
        &settings,
    );
    info!(server_url = ?settings.server_url, "desktop: entity detail page started");
    app.coordinator.settled().await;

    let id = EntityId(args.entity_id);
    let callbacks = app.callbacks(|entity| println!("editor: opened for {}", entity.name));
    callbacks.row_activated(id);
    app.coordinator.settled().await;
    println!("address: {:?}", store.fragment());

    let current = app.flows.load_for_edit(id).await?;
    let name = args.rename.clone().unwrap_or(current.name);
    let mut events = app.coordinator.subscribe();
    app.flows.update(id, EntityFields::named(name)).await?;
    wait_for_update(&mut events, id).await?;
    app.coordinator.settled().await;
    println!("address: {:?}", store.fragment());

    app.shutdown();
    Ok(())
}
