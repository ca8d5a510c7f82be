use std::time::Duration;

use alloy::{
    hex,
    primitives::{B256, U256},
    sol_types::SolCall,
};
use send2bank::{
    bank::{BANK_AMOUNT, IBank},
    stats::{UsageRecord, UsageScope},
    status::{Status, StatusKind},
    storage::FileStore,
    time,
};

use crate::{ACCOUNT, BASE, BASE_SEPOLIA, FailingStore, MockWallet, session, session_with};

const DAY: Duration = Duration::from_secs(86_400);
// 2026-10-16
const D: u32 = 20_742;

fn start_of_day(day: u32) {
    time::pause_at_epoch();
    time::advance(DAY * day);
}

#[tokio::test]
async fn requires_a_connection() {
    let wallet = MockWallet::knowing(&[BASE]);
    let mut session = session(&wallet);

    assert_eq!(
        session.bank().await,
        Status::Error("Please connect your wallet first!".to_owned())
    );
    wallet.with(|s| assert!(s.sent.is_empty()));
}

#[tokio::test]
async fn sends_the_fixed_payment() {
    start_of_day(D);
    let wallet = MockWallet::knowing(&[BASE]);
    let mut session = session(&wallet);
    session.connect().await;

    let status = session.bank().await;
    let hash = B256::with_last_byte(1);
    assert_eq!(
        status,
        Status::Confirmed {
            symbol: "ETH".to_owned(),
            explorer_url: Some(format!("https://basescan.org/tx/{hash}")),
        }
    );
    assert_eq!(status.kind(), StatusKind::Success);
    assert!(!session.transaction().pending);
    assert_eq!(session.transaction().last_tx_hash, Some(hash));

    wallet.with(|s| {
        let tx = &s.sent[0];
        assert_eq!(tx.from, Some(ACCOUNT));
        assert_eq!(
            tx.to.unwrap().to().copied(),
            Some(session.selected_chain().contract_address)
        );
        assert_eq!(tx.value, Some(BANK_AMOUNT));
        assert_eq!(
            hex::encode(tx.input.input().unwrap()),
            hex::encode(IBank::bankCall::SELECTOR)
        );
    });

    let usage = session.usage().unwrap();
    assert_eq!(usage.total_sent, BANK_AMOUNT);
    assert_eq!(usage.streak_days, 1);
    assert_eq!(usage.last_banked_day, Some(i64::from(D)));
}

#[tokio::test]
async fn streak_follows_consecutive_days() {
    start_of_day(D);
    let wallet = MockWallet::knowing(&[BASE]);
    let mut session = session(&wallet);
    session.connect().await;

    let mut totals = vec![];
    let mut streaks = vec![];
    // Two banks on day D, then D+1, D+2, a gap, and D+5.
    for advance in [0, 0, 1, 1, 3] {
        time::advance(DAY * advance);
        assert_eq!(session.bank().await.kind(), StatusKind::Success);
        let usage = session.usage().unwrap();
        totals.push(usage.total_sent);
        streaks.push(usage.streak_days);
    }

    assert_eq!(streaks, vec![1, 1, 2, 3, 1]);
    assert!(totals.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(totals[4], BANK_AMOUNT * U256::from(5));
}

#[tokio::test]
async fn reverted_payments_are_not_counted() {
    let wallet = MockWallet::knowing(&[BASE]);
    wallet.with(|s| s.revert = true);
    let mut session = session(&wallet);
    session.connect().await;

    let status = session.bank().await;
    let hash = B256::with_last_byte(1);
    assert_eq!(
        status,
        Status::Error(format!("Error: transaction {hash} reverted"))
    );
    assert_eq!(session.usage().unwrap(), UsageRecord::default());
    assert!(!session.transaction().pending);
}

#[tokio::test]
async fn rejected_payments_report_the_wallet_message() {
    let wallet = MockWallet::knowing(&[BASE]);
    wallet.with(|s| s.reject_send = true);
    let mut session = session(&wallet);
    session.connect().await;

    assert_eq!(
        session.bank().await,
        Status::Error("Error: User rejected the request.".to_owned())
    );
    assert_eq!(session.transaction().last_tx_hash, None);
    assert_eq!(session.usage().unwrap().total_sent, U256::ZERO);
}

#[tokio::test]
async fn event_amount_is_recorded() {
    let wallet = MockWallet::knowing(&[BASE]);
    let doubled = BANK_AMOUNT * U256::from(2);
    wallet.with(|s| s.event_amount = Some(doubled));
    let mut session = session(&wallet);
    session.connect().await;

    let banked = session.try_bank().await.unwrap();
    assert!(banked.confirmation.success);
    assert_eq!(banked.usage.unwrap().total_sent, doubled);
}

#[tokio::test]
async fn statistics_are_kept_per_chain() {
    let wallet = MockWallet::knowing(&[BASE, BASE_SEPOLIA]);
    let mut session = session(&wallet);
    session.connect().await;
    session.bank().await;

    session.select_chain(BASE_SEPOLIA).await;
    assert_eq!(session.usage().unwrap(), UsageRecord::default());
    let status = session.bank().await;
    assert!(matches!(
        status,
        Status::Confirmed { explorer_url: Some(ref url), .. } if url.starts_with("https://sepolia.basescan.org/tx/")
    ));

    assert_eq!(session.usage_for(BASE, ACCOUNT).total_sent, BANK_AMOUNT);
    assert_eq!(session.usage_for(BASE_SEPOLIA, ACCOUNT).total_sent, BANK_AMOUNT);
    wallet.with(|s| assert_eq!(s.sent[1].chain_id, Some(BASE_SEPOLIA)));
}

#[tokio::test]
async fn statistics_survive_a_restart() {
    start_of_day(D);
    let dir = tempfile::tempdir().unwrap();
    let wallet = MockWallet::knowing(&[BASE]);
    {
        let store = FileStore::open(dir.path(), "send2bank").unwrap();
        let mut session = session_with(&wallet, store);
        session.connect().await;
        session.bank().await;
    }

    time::advance(DAY);
    let store = FileStore::open(dir.path(), "send2bank").unwrap();
    let mut session = session_with(&wallet, store);
    session.connect().await;
    session.bank().await;

    let reopened = FileStore::open(dir.path(), "send2bank").unwrap();
    let record = UsageRecord::load(&reopened, &UsageScope::new(BASE, ACCOUNT, true));
    assert_eq!(record.total_sent, BANK_AMOUNT * U256::from(2));
    assert_eq!(record.streak_days, 2);
    assert_eq!(record.last_banked_day, Some(i64::from(D) + 1));
}

#[tokio::test]
async fn unsaved_statistics_do_not_fail_the_payment() {
    let wallet = MockWallet::knowing(&[BASE]);
    let mut session = session_with(&wallet, FailingStore);
    session.connect().await;

    let hash = B256::with_last_byte(1);
    assert_eq!(
        session.bank().await,
        Status::Confirmed {
            symbol: "ETH".to_owned(),
            explorer_url: Some(format!("https://basescan.org/tx/{hash}")),
        }
    );

    let banked = session.try_bank().await.unwrap();
    assert!(banked.confirmation.success);
    assert_eq!(banked.usage, None);
    assert!(!session.transaction().pending);
}

#[tokio::test]
async fn unconfirmed_payments_are_errors() {
    let wallet = MockWallet::knowing(&[BASE]);
    wallet.with(|s| s.unconfirmed = true);
    let mut session = session(&wallet);
    session.connect().await;

    let hash = B256::with_last_byte(1);
    assert_eq!(
        session.bank().await,
        Status::Error(format!(
            "Error: transaction {hash} not confirmed after 60 attempts"
        ))
    );
    assert!(!session.transaction().pending);
    assert_eq!(session.usage().unwrap(), UsageRecord::default());
}

#[tokio::test]
async fn abandoned_payment_is_not_left_pending() {
    let wallet = MockWallet::knowing(&[BASE]);
    wallet.with(|s| s.hang = true);
    let mut session = session(&wallet);
    session.connect().await;

    let waited = tokio::time::timeout(Duration::from_millis(10), session.bank()).await;
    assert!(waited.is_err());

    let hash = B256::with_last_byte(1);
    assert!(!session.transaction().pending);
    assert_eq!(session.transaction().last_tx_hash, Some(hash));
    assert_eq!(
        session.status(),
        Status::Error(format!("Stopped waiting for transaction {hash}."))
    );

    wallet.with(|s| s.hang = false);
    assert_eq!(session.bank().await.kind(), StatusKind::Success);
    wallet.with(|s| assert_eq!(s.sent.len(), 2));
}

#[tokio::test]
async fn one_payment_at_a_time() {
    let wallet = MockWallet::knowing(&[BASE, BASE_SEPOLIA]);
    wallet.with(|s| s.hang = true);
    let mut session = session(&wallet);
    session.connect().await;

    // Leave the first payment in flight without ever dropping it.
    let mut first = Box::pin(session.bank());
    assert!(
        tokio::time::timeout(Duration::from_millis(10), &mut first)
            .await
            .is_err()
    );
    std::mem::forget(first);

    assert!(session.transaction().pending);
    assert_eq!(
        session.bank().await,
        Status::Error("A transaction is already pending.".to_owned())
    );
    assert_eq!(
        session.select_chain(BASE_SEPOLIA).await,
        Status::Error("A transaction is already pending.".to_owned())
    );
    assert_eq!(session.selected_chain().chain_id, BASE);
    wallet.with(|s| assert_eq!(s.sent.len(), 1));
}
