//! # murmur-node
//!
//! Demo node for the murmur DM layer.
//!
//! Starts two DM clients on an in-process loopback network and runs a short
//! conversation between them: a text, a reply to it and a reaction to the
//! reply. Every event either client sees is logged.

mod config;
mod event_log;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use murmur_dm::{
    ClientCallbacks, DmClient, DmConfig, NotificationFilter, NotificationState, NotificationUpdate,
};
use murmur_net::LoopbackNet;
use murmur_shared::identity::IdentityExport;
use murmur_shared::types::PublicKey;
use murmur_shared::{DmCipher, Identity};
use murmur_store::{load_json, save_json, Database, KeyValue, MemoryKv};

use crate::config::NodeConfig;
use crate::event_log::LoggingModel;

const IDENTITY_KEY: &str = "node_identity";
const IDENTITY_VERSION: u64 = 0;

fn open_store(config: &NodeConfig, name: &str) -> anyhow::Result<Arc<dyn KeyValue>> {
    match &config.data_dir {
        Some(dir) => Ok(Arc::new(Database::open_in_dir(&dir.join(name))?)),
        None => Ok(Arc::new(MemoryKv::new())),
    }
}

/// Load the identity stored in `kv`, generating and storing one if absent.
fn load_identity(kv: &dyn KeyValue) -> anyhow::Result<Identity> {
    if let Some(export) = load_json::<IdentityExport>(kv, IDENTITY_KEY, IDENTITY_VERSION)? {
        return Ok(Identity::from_export(&export));
    }
    let identity = Identity::generate();
    save_json(kv, IDENTITY_KEY, IDENTITY_VERSION, &identity.to_export())?;
    Ok(identity)
}

fn start_client(
    name: &str,
    nickname: &str,
    net: Arc<LoopbackNet>,
    config: &NodeConfig,
    dm_config: DmConfig,
) -> anyhow::Result<DmClient> {
    let kv = open_store(config, name)?;
    let identity = load_identity(kv.as_ref())?;

    let node = name.to_string();
    let notify: NotificationUpdate = Arc::new(
        move |filter: NotificationFilter, changed: Vec<NotificationState>, deleted: Vec<PublicKey>| {
            info!(
                node = %node,
                tags = filter.tags.len(),
                changed = changed.len(),
                deleted = deleted.len(),
                "notification filter updated"
            );
        },
    );

    let client = DmClient::new(
        identity,
        Arc::new(DmCipher),
        Arc::new(LoggingModel::new(name)),
        net,
        kv,
        dm_config,
        ClientCallbacks {
            notify: Some(notify),
            backup: None,
        },
    )?;
    client.set_nickname(nickname)?;
    Ok(client)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,murmur_dm=debug,murmur_net=debug")),
        )
        .init();

    info!("Starting murmur demo node v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = NodeConfig::from_env();
    let dm_config = DmConfig::from_env();
    info!(?config, ?dm_config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Start both clients on a shared loopback network
    // -----------------------------------------------------------------------
    let net = Arc::new(LoopbackNet::new(config.max_contents));
    let alice = start_client("a", &config.nickname_a, net.clone(), &config, dm_config.clone())?;
    let bob = start_client("b", &config.nickname_b, net.clone(), &config, dm_config)?;

    // -----------------------------------------------------------------------
    // 4. Text, reply, reaction
    // -----------------------------------------------------------------------
    let hello = alice.send_text(&bob.public_key(), bob.token(), "hello there")?;
    net.flush();

    let reply = bob.send_reply(
        &alice.public_key(),
        alice.token(),
        "hi, good to hear from you",
        &hello.message_id,
    )?;
    net.flush();

    alice.send_reaction(&bob.public_key(), bob.token(), "👍", &reply.message_id)?;
    net.flush();

    // Let the status dispatchers drain before exiting.
    tokio::time::sleep(Duration::from_millis(100)).await;

    info!(
        sent = net.sent_frames(),
        alice_pending = alice.send_tracker().pending_count(),
        bob_pending = bob.send_tracker().pending_count(),
        "Scenario complete"
    );
    Ok(())
}
