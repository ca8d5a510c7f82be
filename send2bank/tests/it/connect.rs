use send2bank::{
    chains::ChainRegistry,
    session::{ConnectionState, Session},
    status::{Status, StatusKind},
    storage::MemoryStore,
};

use crate::{ACCOUNT, BASE, BASE_SEPOLIA, MockWallet, session};

#[tokio::test]
async fn connects_on_a_known_chain() {
    let wallet = MockWallet::knowing(&[BASE]);
    let mut session = session(&wallet);
    assert_eq!(session.status(), Status::ConnectPrompt);

    assert_eq!(session.connect().await, Status::Connected);
    assert_eq!(
        session.connection(),
        &ConnectionState {
            connected: true,
            account: Some(ACCOUNT),
        }
    );
    assert_eq!(session.status(), Status::Connected);
    wallet.with(|s| {
        assert_eq!(s.calls, vec!["switch_chain", "request_accounts"]);
        assert_eq!(s.current, Some(BASE));
    });
}

#[tokio::test]
async fn adds_an_unrecognised_chain() {
    let wallet = MockWallet::knowing(&[]);
    let mut session = session(&wallet);

    assert_eq!(session.connect().await, Status::Connected);
    wallet.with(|s| {
        assert_eq!(
            s.calls,
            vec![
                "switch_chain",
                "add_chain",
                "switch_chain",
                "request_accounts"
            ]
        );
        assert_eq!(s.added.len(), 1);
        assert_eq!(s.added[0].chain_id, "0x2105");
        assert_eq!(s.added[0].chain_name, "Base");
        assert_eq!(s.added[0].rpc_urls, vec!["https://mainnet.base.org/"]);
        assert_eq!(s.current, Some(BASE));
    });
}

#[tokio::test]
async fn wallet_errors_are_shown_verbatim() {
    let wallet = MockWallet::knowing(&[BASE]);
    wallet.with(|s| s.reject_accounts = true);
    let mut session = session(&wallet);

    let status = session.connect().await;
    assert_eq!(
        status,
        Status::Error("Failed to connect wallet: User rejected the request.".to_owned())
    );
    assert_eq!(status.kind(), StatusKind::Error);
    assert!(!session.connection().connected);
    assert_eq!(session.connection().account, None);
}

#[tokio::test]
async fn refused_chain_addition_fails_the_connection() {
    let wallet = MockWallet::knowing(&[]);
    wallet.with(|s| s.reject_add = true);
    let mut session = session(&wallet);

    assert_eq!(
        session.connect().await,
        Status::Error("Failed to connect wallet: User rejected the request.".to_owned())
    );
    wallet.with(|s| assert!(!s.calls.contains(&"request_accounts")));
}

#[tokio::test]
async fn missing_wallet() {
    let chains = ChainRegistry::new(&[]).unwrap();
    let mut session: Session<MockWallet, MemoryStore> =
        Session::new(None, MemoryStore::new(), chains, BASE, true).unwrap();
    assert_eq!(
        session.connect().await,
        Status::Error("Please install a compatible wallet!".to_owned())
    );
}

#[test]
fn default_chain_must_be_registered() {
    let chains = ChainRegistry::new(&[]).unwrap();
    let session: Result<Session<MockWallet, MemoryStore>, _> =
        Session::new(None, MemoryStore::new(), chains, BASE_SEPOLIA, true);
    assert!(session.is_err());
}

#[tokio::test]
async fn disconnect_only_forgets_locally() {
    let wallet = MockWallet::knowing(&[BASE]);
    let mut session = session(&wallet);
    session.connect().await;

    assert_eq!(session.disconnect(), Status::ConnectPrompt);
    assert_eq!(session.connection(), &ConnectionState::default());
    assert_eq!(session.transaction().last_tx_hash, None);
    // Nothing was asked of the wallet, and it stays on the same network.
    wallet.with(|s| {
        assert_eq!(s.calls, vec!["switch_chain", "request_accounts"]);
        assert_eq!(s.current, Some(BASE));
    });
}

#[tokio::test]
async fn selecting_a_chain_switches_the_wallet_when_connected() {
    let wallet = MockWallet::knowing(&[BASE]);
    let mut session = session(&wallet);

    // Not connected: only the selection changes.
    assert_eq!(
        session.select_chain(BASE_SEPOLIA).await,
        Status::NetworkSwitched {
            network: "Base Sepolia".to_owned()
        }
    );
    assert_eq!(session.selected_chain().chain_id, BASE_SEPOLIA);
    wallet.with(|s| assert!(s.calls.is_empty()));

    session.select_chain(BASE).await;
    session.connect().await;
    assert_eq!(
        session.select_chain(BASE_SEPOLIA).await.kind(),
        StatusKind::Success
    );
    wallet.with(|s| {
        assert_eq!(s.current, Some(BASE_SEPOLIA));
        assert_eq!(s.added[0].chain_id, "0x14a34");
    });
}

#[tokio::test]
async fn failed_switch_keeps_the_previous_chain() {
    let wallet = MockWallet::knowing(&[BASE]);
    wallet.with(|s| s.reject_add = true);
    let mut session = session(&wallet);
    session.connect().await;

    let status = session.select_chain(BASE_SEPOLIA).await;
    assert_eq!(
        status,
        Status::Error("Failed to switch network: User rejected the request.".to_owned())
    );
    assert_eq!(session.selected_chain().chain_id, BASE);
}

#[tokio::test]
async fn unknown_chains_are_rejected() {
    let wallet = MockWallet::knowing(&[BASE]);
    let mut session = session(&wallet);
    assert_eq!(
        session.select_chain(1).await,
        Status::Error("Unsupported network 1".to_owned())
    );
    assert_eq!(session.selected_chain().chain_id, BASE);
}
