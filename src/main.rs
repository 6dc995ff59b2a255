//! Ledger Engine demo
//!
//! Wires the in-memory adapters and walks through one transfer lifecycle:
//!
//! ```text
//! open A (100.00), open B (0.00)
//!   → transfer 40.00 A→B            COMPLETED
//!   → replay with the same key      same transfer, no new effects
//!   → transfer 150.00 A→B           FAILED (insufficient funds)
//! ```
//!
//! Usage: `ledger_engine [--env <name>]` (reads `config/<name>.yaml`, default `dev`)

use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use ledger_engine::account::{AccountService, CreateAccountRequest};
use ledger_engine::config::AppConfig;
use ledger_engine::context::RequestContext;
use ledger_engine::events::{EventSink, TracingEventSink, event_channel};
use ledger_engine::idempotency::{IdempotencyGuard, InMemoryIdempotencyStore};
use ledger_engine::money::Amount;
use ledger_engine::store::InMemoryLedgerStore;
use ledger_engine::transfer::{IdempotencyKey, TransferCoordinator, TransferRequest};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let (app_config, load_error) = match AppConfig::load(&env) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    let _log_guard = ledger_engine::logging::init_logging(&app_config);

    info!(
        "Starting ledger engine in {} mode (build {})",
        env,
        env!("GIT_HASH")
    );
    if let Some(e) = load_error {
        warn!("Using default configuration: {:#}", e);
    }

    let ledger = &app_config.ledger;

    // Adapters
    let store = Arc::new(InMemoryLedgerStore::new());
    let guard = IdempotencyGuard::new(
        Arc::new(InMemoryIdempotencyStore::new()),
        ledger.idempotency_ttl(),
    );
    debug!(idempotency_ttl = ?guard.ttl(), "Idempotency guard ready");
    let (sink, mut receiver) = event_channel(ledger.event_buffer);
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    // Drain events to the log
    let event_logger = tokio::spawn(async move {
        let mut delivered = 0usize;
        while let Some(event) = receiver.recv().await {
            if let Err(e) = TracingEventSink.publish(event).await {
                error!("Event logging failed: {}", e);
            }
            delivered += 1;
        }
        delivered
    });

    let accounts = AccountService::new(store.clone(), sink.clone())
        .with_max_number_attempts(ledger.account_number_max_attempts);
    let coordinator = TransferCoordinator::with_store(store.clone(), sink, guard)
        .with_failure_write_timeout(ledger.failure_write_timeout());
    let ctx = || RequestContext::with_timeout(ledger.request_timeout());

    // Accounts
    let a = accounts
        .open_account(
            CreateAccountRequest::new("Ana Souza", "529.982.247-25")
                .with_initial_balance(Decimal::new(10_000, 2)),
            &ctx(),
        )
        .await
        .context("open account A")?;
    let b = accounts
        .open_account(
            CreateAccountRequest::new("Bruno Lima", "111.444.777-35"),
            &ctx(),
        )
        .await
        .context("open account B")?;

    // Transfer + replay
    let key = IdempotencyKey::generate();
    let req = TransferRequest::new(a.id(), b.id(), Amount::parse("40.00")?)
        .with_description("demo transfer")
        .with_idempotency_key(key.clone());

    let transfer = coordinator
        .process(req.clone(), &ctx())
        .await
        .context("transfer A -> B")?;
    info!(transfer_id = %transfer.id(), status = %transfer.status(), "First submission");

    let replayed = coordinator.process(req, &ctx()).await.context("replay")?;
    info!(
        transfer_id = %replayed.id(),
        status = %replayed.status(),
        same = replayed.id() == transfer.id(),
        "Replay with the same idempotency key"
    );

    // Overdraft
    let overdraft = TransferRequest::new(a.id(), b.id(), Amount::parse("150.00")?)
        .with_description("demo overdraft");
    match coordinator.process(overdraft, &ctx()).await {
        Ok(t) => warn!(transfer_id = %t.id(), "Overdraft unexpectedly completed"),
        Err(e) => info!(
            code = e.root_cause().code(),
            retriable = e.is_retriable(),
            "Overdraft rejected: {}", e
        ),
    }

    for id in [a.id(), b.id()] {
        let balance = accounts.get_balance(id, &ctx()).await?;
        info!(
            account_id = %balance.account_id,
            account_number = %balance.account_number,
            balance = %balance.balance,
            "Final balance"
        );
    }

    // Close the event channel and wait for the logger
    drop(coordinator);
    drop(accounts);
    let delivered = event_logger.await.context("event logger task")?;
    info!(events = delivered, "Demo finished");

    Ok(())
}
