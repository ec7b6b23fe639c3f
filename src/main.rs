//! Sealed Pacts Server
//!
//! Runs a demo round against an in-process oracle, then serves the
//! WebSocket API when `PACTS_BIND_ADDR` is set.

use std::sync::Arc;
use anyhow::{Context, Result};
use ed25519_dalek::SigningKey;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sealed_pacts::{
    VERSION, AccessUpdate, CoordinatorConfig, PactInput, PactKind, PactState,
    core::{ActorId, ManualClock, SimulatedBackend, SystemClock},
    network::{actor_for_subject, AuthConfig, PactServer, PactService, ServerConfig},
    oracle::{CallbackPayload, PendingDecryption, QueuedOracle, SimulatedRelayer},
    proof::SignerSetVerifier,
};

/// Callback frames in flight between relayer and intake.
const CALLBACK_FRAME_BUFFER: usize = 64;

/// Simulated key-management signer seeds.
const SIGNER_SEEDS: [[u8; 32]; 3] = [[0x11; 32], [0x22; 32], [0x33; 32]];

#[tokio::main]
async fn main() -> Result<()> {
    let default_filter = if cfg!(feature = "debug-tracing") { "sealed_pacts=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = CoordinatorConfig::from_env()?;
    info!("Sealed Pacts v{}", VERSION);
    info!("Instance: {}", config.instance_id);
    info!("Cooldown: {}s, signer threshold: {}", config.cooldown_secs, config.signer_threshold);

    demo_round(&config).await?;

    if std::env::var("PACTS_BIND_ADDR").is_ok() {
        serve(&config).await?;
    }
    Ok(())
}

fn signer_set(threshold: usize) -> Result<(Vec<SigningKey>, SignerSetVerifier)> {
    let keys: Vec<SigningKey> = SIGNER_SEEDS.iter().map(SigningKey::from_bytes).collect();
    let verifier = SignerSetVerifier::new(keys.iter().map(SigningKey::verifying_key).collect(), threshold)?;
    Ok((keys, verifier))
}

/// Demo: one full round with a replay attempt at the end.
async fn demo_round(config: &CoordinatorConfig) -> Result<()> {
    info!("=== Demo Round ===");

    let owner = actor_for_subject("owner");
    let provider = actor_for_subject("provider");
    let relay = actor_for_subject("oracle-relay");

    let backend = Arc::new(SimulatedBackend::new());
    let (keys, verifier) = signer_set(config.signer_threshold)?;
    let (oracle, mut jobs) = QueuedOracle::new();
    let relayer = SimulatedRelayer::new(backend.clone(), keys);

    let state = PactState::new(owner, config, backend.clone(), Arc::new(oracle), Arc::new(verifier))?;
    let clock = Arc::new(ManualClock::new(chrono::Utc::now().timestamp()));
    let service = PactService::new(state, clock.clone());

    service.update_access(owner, AccessUpdate::AddProvider(provider)).await?;
    service.update_access(owner, AccessUpdate::SetRelay(relay)).await?;

    let batch = service.open_batch(owner).await?;
    info!("Opened batch {}", batch);

    let pacts = [
        (101, 202, PactKind::NonAggression),
        (303, 404, PactKind::MutualDefense),
        (505, 606, PactKind::NonAggression),
    ];
    for (a, b, kind) in pacts {
        let input = PactInput {
            subject_a: backend.encrypt(a),
            subject_b: backend.encrypt(b),
            kind: backend.encrypt(kind.as_u32()),
            declared_batch: backend.encrypt(batch.0),
        };
        let record = service.submit(provider, input).await?;
        info!("Submitted record {} ({:?})", record, kind);
        clock.advance(i64::try_from(config.cooldown_secs).unwrap_or(i64::MAX));
    }

    service.close_batch(owner).await?;
    let ticket = service.request_decryption(provider, batch).await?;
    info!(
        "Requested reveal {} with commitment {}",
        ticket.request_id,
        hex::encode(ticket.commitment)
    );

    let job = jobs.recv().await.context("oracle queue closed")?;
    let payload = relayer.fulfil(&job)?;
    let revealed = service
        .on_decryption_callback(relay, payload.request_id, &payload.plaintext, &payload.proof)
        .await?;

    for record in &revealed.records {
        info!(
            "Record {}: {} / {} {:?} (batch {})",
            record.record_id,
            record.subject_a,
            record.subject_b,
            record.pact_kind(),
            record.origin_batch
        );
    }

    match service
        .on_decryption_callback(relay, payload.request_id, &payload.plaintext, &payload.proof)
        .await
    {
        Err(e) => info!("Replay rejected as expected: {} ({:?})", e, e.class()),
        Ok(_) => warn!("Replay was accepted"),
    }

    info!("Backend holds {} live ciphertexts", backend.len());
    Ok(())
}

/// Serve the WebSocket API with an in-process relayer answering jobs.
async fn serve(config: &CoordinatorConfig) -> Result<()> {
    let server_config = ServerConfig::from_env()?;
    let auth = AuthConfig::from_env();

    let owner_sub = std::env::var("PACTS_OWNER_SUB").unwrap_or_else(|_| "owner".into());
    let relay_sub = std::env::var("PACTS_RELAY_SUB").unwrap_or_else(|_| "oracle-relay".into());
    let owner = actor_for_subject(&owner_sub);
    let relay = actor_for_subject(&relay_sub);

    let backend = Arc::new(SimulatedBackend::new());
    let (keys, verifier) = signer_set(config.signer_threshold)?;
    let (oracle, jobs) = QueuedOracle::new();
    let relayer = SimulatedRelayer::new(backend.clone(), keys);

    let state = PactState::new(owner, config, backend, Arc::new(oracle), Arc::new(verifier))?;
    let service = Arc::new(PactService::new(state, Arc::new(SystemClock)));
    service.update_access(owner, AccessUpdate::SetRelay(relay)).await?;
    info!("Owner subject {:?} -> {}, relay subject {:?} -> {}", owner_sub, owner, relay_sub, relay);

    let (frames_tx, frames_rx) = mpsc::channel(CALLBACK_FRAME_BUFFER);
    let relay_task = tokio::spawn(run_relayer(jobs, relayer, frames_tx));
    let intake_task = tokio::spawn(deliver_callbacks(frames_rx, service.clone(), relay));

    let server = PactServer::new(server_config, auth, service);
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            server.shutdown();
        }
    }

    relay_task.abort();
    intake_task.abort();
    Ok(())
}

/// Decrypt queued jobs and ship each answer as a bincode frame.
async fn run_relayer(
    mut jobs: UnboundedReceiver<PendingDecryption>,
    relayer: SimulatedRelayer,
    frames: mpsc::Sender<Vec<u8>>,
) {
    while let Some(job) = jobs.recv().await {
        let frame = match relayer.fulfil_frame(&job) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Relayer could not fulfil request {}: {}", job.request_id, e);
                continue;
            }
        };
        if frames.send(frame).await.is_err() {
            break;
        }
    }
}

/// Decode callback frames and apply them as the trusted relay.
async fn deliver_callbacks(mut frames: mpsc::Receiver<Vec<u8>>, service: Arc<PactService>, relay: ActorId) {
    while let Some(frame) = frames.recv().await {
        let payload = match CallbackPayload::from_bytes(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping malformed callback frame ({} bytes): {}", frame.len(), e);
                continue;
            }
        };
        if let Err(e) = service
            .on_decryption_callback(relay, payload.request_id, &payload.plaintext, &payload.proof)
            .await
        {
            warn!("Callback for request {} rejected: {}", payload.request_id, e);
        }
    }
}
