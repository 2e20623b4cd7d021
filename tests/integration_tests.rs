//! Integration tests for wallet-ledger

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use wallet_ledger::{
    utils::MemoryStorage, AccountId, Caller, EntryKind, Ledger, LedgerConfig, LedgerError,
    LedgerStorage, OpFilter, OwnerId, OwnerOnlyPolicy,
};

async fn alice_and_bob() -> (Ledger<MemoryStorage>, MemoryStorage, AccountId, AccountId) {
    let storage = MemoryStorage::new();
    let ledger = Ledger::new(storage.clone());
    let caller = Caller::default();
    let alice = ledger.create_account(&caller, "alice").await.unwrap();
    let bob = ledger.create_account(&caller, "bob").await.unwrap();
    (ledger, storage, alice, bob)
}

#[tokio::test]
async fn test_complete_wallet_workflow() {
    let (ledger, storage, alice, bob) = alice_and_bob().await;
    let caller = Caller::default();
    let day0 = Utc::now() - Duration::days(1);

    assert_eq!(ledger.balance(&caller, alice).await.unwrap(), 0);
    assert_eq!(ledger.balance(&caller, bob).await.unwrap(), 0);

    ledger.deposit(&caller, alice, 100, "t1").await.unwrap();
    assert_eq!(ledger.balance(&caller, alice).await.unwrap(), 100);
    let alice_entries = storage.account_entries(alice, None).await.unwrap();
    assert_eq!(alice_entries.len(), 1);
    assert_eq!(alice_entries[0].amount, 100);
    assert_eq!(alice_entries[0].kind, EntryKind::Deposit);

    ledger.transfer(&caller, alice, bob, 40, "t2").await.unwrap();
    assert_eq!(ledger.balance(&caller, alice).await.unwrap(), 60);
    assert_eq!(ledger.balance(&caller, bob).await.unwrap(), 40);

    let bob_entries = storage.account_entries(bob, None).await.unwrap();
    assert_eq!(bob_entries.len(), 1);
    assert_eq!(bob_entries[0].amount, 40);

    let day2 = day0 + Duration::days(2);
    let report = ledger
        .report(&caller, alice, day0, day2, OpFilter::Any)
        .await
        .unwrap();
    let amounts: Vec<i64> = report.iter().map(|line| line.amount).collect();
    assert_eq!(amounts, vec![100, -40]);
    assert!(report[0].date <= report[1].date);

    let deposits = ledger
        .report(&caller, alice, day0, day2, OpFilter::DepositsOnly)
        .await
        .unwrap();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].amount, 100);

    let integrity = ledger.verify_integrity().await.unwrap();
    assert!(integrity.is_valid, "{:?}", integrity.issues);
}

#[tokio::test]
async fn test_overdraw_is_rejected_without_side_effects() {
    let (ledger, storage, alice, bob) = alice_and_bob().await;
    let caller = Caller::default();
    ledger.deposit(&caller, alice, 100, "t1").await.unwrap();
    ledger.transfer(&caller, alice, bob, 40, "t2").await.unwrap();
    let entries_before = storage.entry_count().await.unwrap();

    let err = ledger
        .transfer(&caller, alice, bob, 1000, "t3")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));

    assert_eq!(ledger.balance(&caller, alice).await.unwrap(), 60);
    assert_eq!(ledger.balance(&caller, bob).await.unwrap(), 40);
    assert_eq!(storage.entry_count().await.unwrap(), entries_before);
}

#[tokio::test]
async fn test_transfer_entries_net_to_zero() {
    let (ledger, _, alice, bob) = alice_and_bob().await;
    let caller = Caller::default();
    ledger.deposit(&caller, alice, 75, "t1").await.unwrap();
    let total_before = ledger.verify_integrity().await.unwrap().total_balance;

    ledger.transfer(&caller, alice, bob, 25, "t2").await.unwrap();

    let out = ledger.history(&caller, alice).await.unwrap();
    let incoming = ledger.history(&caller, bob).await.unwrap();
    let debit = out.iter().find(|t| t.kind == EntryKind::TransferOut).unwrap();
    let credit = incoming.iter().find(|t| t.kind == EntryKind::TransferIn).unwrap();
    assert_eq!(debit.amount + credit.amount, 0);
    assert_eq!(debit.created_at, credit.created_at);
    assert_eq!(
        ledger.verify_integrity().await.unwrap().total_balance,
        total_before
    );
}

#[tokio::test]
async fn test_duplicate_account_name() {
    let (ledger, _, _, _) = alice_and_bob().await;
    let err = ledger
        .create_account(&Caller::new(OwnerId(9)), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_owner_scoped_ledger() {
    let storage = MemoryStorage::new();
    let ledger = Ledger::with_validators(
        storage,
        LedgerConfig::default(),
        Box::new(wallet_ledger::DefaultAccountValidator::default()),
        Arc::new(OwnerOnlyPolicy),
    )
    .unwrap();
    let alice = Caller::new(OwnerId(1));
    let bob = Caller::new(OwnerId(2));
    let alice_wallet = ledger.create_account(&alice, "alice").await.unwrap();
    let bob_wallet = ledger.create_account(&bob, "bob").await.unwrap();

    ledger.deposit(&alice, alice_wallet, 50, "t1").await.unwrap();
    ledger
        .transfer(&alice, alice_wallet, bob_wallet, 20, "t2")
        .await
        .unwrap();

    assert!(matches!(
        ledger.history(&alice, bob_wallet).await,
        Err(LedgerError::Unauthorized { .. })
    ));
    assert_eq!(ledger.balance(&bob, bob_wallet).await.unwrap(), 20);
    assert_eq!(ledger.list_accounts(&alice).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_do_not_lose_updates() {
    let (ledger, storage, alice, _) = alice_and_bob().await;
    let ledger = Arc::new(ledger);
    const N: i64 = 200;

    let mut handles = Vec::new();
    for i in 0..N {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .deposit(&Caller::default(), alice, 1, &format!("dep-{}", i))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ledger.balance(&Caller::default(), alice).await.unwrap(), N);
    assert_eq!(storage.entry_count().await.unwrap(), N as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_tokens_apply_once() {
    let (ledger, storage, alice, _) = alice_and_bob().await;
    let ledger = Arc::new(ledger);

    let mut handles = Vec::new();
    for _ in 0..32 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.deposit(&Caller::default(), alice, 10, "retry-me").await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ledger.balance(&Caller::default(), alice).await.unwrap(), 10);
    assert_eq!(storage.entry_count().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_do_not_deadlock() {
    let (ledger, _, alice, bob) = alice_and_bob().await;
    let caller = Caller::default();
    ledger.deposit(&caller, alice, 500, "seed-a").await.unwrap();
    ledger.deposit(&caller, bob, 500, "seed-b").await.unwrap();
    let ledger = Arc::new(ledger);

    let mut handles = Vec::new();
    for i in 0..100 {
        let ledger = ledger.clone();
        let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
        handles.push(tokio::spawn(async move {
            ledger
                .transfer(&Caller::default(), from, to, 3, &format!("x-{}", i))
                .await
        }));
    }
    for handle in handles {
        // Every transfer either lands or fails cleanly for lack of funds.
        match handle.await.unwrap() {
            Ok(()) | Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    let a = ledger.balance(&caller, alice).await.unwrap();
    let b = ledger.balance(&caller, bob).await.unwrap();
    assert_eq!(a + b, 1000);
    assert!(ledger.verify_integrity().await.unwrap().is_valid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_account_creation_yields_one_account() {
    let ledger = Arc::new(Ledger::new(MemoryStorage::new()));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.create_account(&Caller::default(), "carol").await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(LedgerError::AlreadyExists(name)) => assert_eq!(name, "carol"),
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(ledger.list_accounts(&Caller::default()).await.unwrap().len(), 1);
}

#[derive(Debug, Clone)]
enum Op {
    Deposit { account: usize, amount: i64, token: u8 },
    Transfer { from: usize, to: usize, amount: i64, token: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 1..500i64, 0..8u8).prop_map(|(account, amount, token)| Op::Deposit {
            account,
            amount,
            token
        }),
        (0..3usize, 0..3usize, 1..500i64, 0..8u8).prop_map(|(from, to, amount, token)| {
            Op::Transfer {
                from,
                to,
                amount,
                token,
            }
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_operations_preserve_ledger_invariants(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let ledger = Ledger::new(MemoryStorage::new());
            let caller = Caller::default();
            let mut accounts = Vec::new();
            for name in ["a", "b", "c"] {
                accounts.push(ledger.create_account(&caller, name).await.unwrap());
            }

            let mut seen_deposits = HashSet::new();
            let mut expected_total = 0i128;

            for op in ops {
                match op {
                    Op::Deposit { account, amount, token } => {
                        let token = format!("d{}", token);
                        ledger
                            .deposit(&caller, accounts[account], amount, &token)
                            .await
                            .unwrap();
                        if seen_deposits.insert((account, token)) {
                            expected_total += i128::from(amount);
                        }
                    }
                    Op::Transfer { from, to, amount, token } => {
                        let result = ledger
                            .transfer(&caller, accounts[from], accounts[to], amount, &format!("x{}", token))
                            .await;
                        assert!(matches!(
                            result,
                            Ok(()) | Err(LedgerError::InsufficientBalance { .. })
                        ));
                    }
                }

                let report = ledger.verify_integrity().await.unwrap();
                assert!(report.is_valid, "{:?}", report.issues);
                assert_eq!(report.total_balance, expected_total);
            }
        });
    }
}
