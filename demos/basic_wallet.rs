//! Basic wallet usage example

use chrono::{Duration, Utc};
use tracing_subscriber::EnvFilter;
use wallet_ledger::utils::MemoryStorage;
use wallet_ledger::{Caller, Ledger, LedgerConfig, LedgerError, OpFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("Wallet Ledger - Basic Example\n");

    let config = LedgerConfig::from_toml_str(
        r#"
        lock_timeout_ms = 2000
        date_granularity = "instant"
        "#,
    )?;
    let ledger = Ledger::with_config(MemoryStorage::new(), config)?;
    let caller = Caller::default();

    // 1. Open two wallets
    let alice = ledger.create_account(&caller, "alice").await?;
    let bob = ledger.create_account(&caller, "bob").await?;
    println!("Created accounts: alice={} bob={}", alice, bob);

    // 2. Fund alice and pay bob
    ledger.deposit(&caller, alice, 100, "t1").await?;
    ledger.transfer(&caller, alice, bob, 40, "t2").await?;

    // A client retry with the same token changes nothing
    ledger.deposit(&caller, alice, 100, "t1").await?;

    println!(
        "Balances: alice={} bob={}",
        ledger.balance(&caller, alice).await?,
        ledger.balance(&caller, bob).await?
    );

    // 3. An overdraft is refused
    match ledger.transfer(&caller, alice, bob, 1000, "t3").await {
        Err(LedgerError::InsufficientBalance {
            required, available, ..
        }) => println!("Refused transfer of {}: only {} available", required, available),
        other => println!("Unexpected result: {:?}", other),
    }

    // 4. Report alice's activity over the last day
    let now = Utc::now();
    println!("\nAlice's history:");
    for line in ledger
        .report(&caller, alice, now - Duration::days(1), now + Duration::minutes(1), OpFilter::Any)
        .await?
    {
        println!("  {:>6}  {}", line.amount, line.date.to_rfc3339());
    }

    let integrity = ledger.verify_integrity().await?;
    println!(
        "\nIntegrity: valid={} accounts={} entries={} total={}",
        integrity.is_valid, integrity.account_count, integrity.entry_count, integrity.total_balance
    );

    Ok(())
}
