//! End-to-end execution scenarios: transmitters on one side of the hub,
//! an execution layer rebuilding state on the other.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tracing_subscriber::fmt::MakeWriter;

use stratus_core::Instruction;
use stratus_exec::{check_instruction, ExecError, Layer, MemoryStorage, TransactedStorage};
use stratus_exec::Storage as _;
use stratus_transport::{Connection, ConnectionFactory, MemoryHub, Transport};

use crate::support::{
    account, account_oid, cud_bundles, cud_final_state, message, message_oid, transmit_bundles,
    Chat, ChatTransport, ADDR_A, ADDR_B, NS, T0, T1,
};

async fn wait_for_round(storage: &MemoryStorage<Chat>, round: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while storage.get_last_round().await.unwrap() < round {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("layer catches up");
}

fn sorted_state(storage: &MemoryStorage<Chat>) -> Vec<(crate::support::ChatOid, (u64, Chat))> {
    let mut state: Vec<_> = storage.snapshot().into_iter().collect();
    state.sort_by(|a, b| a.0.cmp(&b.0));
    state
}

// ── Log capture ───────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Capture {
        self.clone()
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn storage_drives_rounds_like_the_layer_does() {
    // The layer's round discipline, hand-driven: validate, finalize,
    // commit or rollback, next round.
    let storage = MemoryStorage::<Chat>::new();
    let mut dropped = Vec::new();

    for (n, bundle) in cud_bundles().into_iter().enumerate() {
        let sync_round = n as u64 + 1;
        storage.begin_transaction(sync_round).await.unwrap();
        let mut failed = None;
        for instruction in &bundle {
            if let Err(err) = check_instruction(&storage, sync_round, instruction).await {
                failed = Some(err);
                break;
            }
            storage.finalize_instruction(instruction).await.unwrap();
        }
        match failed {
            None => storage.commit_transaction().await.unwrap(),
            Some(err) => {
                assert!(!err.is_fatal());
                storage.rollback_transaction().await.unwrap();
                dropped.push((sync_round, err.to_string()));
            }
        }
    }

    assert_eq!(dropped, vec![(6, "Instruction was late".to_owned())]);
    assert_eq!(sorted_state(&storage), cud_final_state());
}

#[tokio::test]
async fn layer_converges_on_the_final_state() {
    let hub = MemoryHub::new();
    let sender: ChatTransport = Transport::new(hub.connector());
    transmit_bundles(&sender, cud_bundles()).await.unwrap();

    let storage = MemoryStorage::<Chat>::new();
    let transport = Arc::new(ChatTransport::new(hub.connector()));
    let running = Layer::new(transport, storage.clone()).spawn(vec![NS]);

    wait_for_round(&storage, 7).await;
    running.stop().await.unwrap();

    assert_eq!(sorted_state(&storage), cud_final_state());

    // Round 6 was dropped whole; its neighbours were accepted.
    assert!(storage.round_accepted(5).await.unwrap());
    assert!(!storage.round_accepted(6).await.unwrap());
    assert!(storage.round_accepted(7).await.unwrap());

    // The update of round 5 merged into the stored value.
    assert_eq!(
        storage.get(&message_oid(ADDR_B, T1)),
        Some((5, message(ADDR_B, T1, "Hi Alice!")))
    );
}

#[tokio::test]
async fn late_round_is_dropped_with_a_warning() {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let hub = MemoryHub::new();
    let sender: ChatTransport = Transport::new(hub.connector());
    transmit_bundles(&sender, cud_bundles()).await.unwrap();

    let storage = MemoryStorage::<Chat>::new();
    let transport = Arc::new(ChatTransport::new(hub.connector()));
    let running = Layer::new(transport, storage.clone()).spawn(vec![NS]);
    wait_for_round(&storage, 7).await;
    running.stop().await.unwrap();

    let logs = capture.contents();
    assert!(
        logs.contains("Sync round# 6; dropped by error: Instruction was late"),
        "missing drop warning in:\n{logs}"
    );
    // The state round 5 left behind survived the dropped round.
    assert_eq!(
        storage.get(&message_oid(ADDR_B, T1)),
        Some((5, message(ADDR_B, T1, "Hi Alice!")))
    );
}

#[tokio::test]
async fn stopped_layer_resumes_from_the_last_round() {
    let hub = MemoryHub::new();
    let sender: ChatTransport = Transport::new(hub.connector());
    let mut bundles = cud_bundles();
    let tail = bundles.split_off(2);

    transmit_bundles(&sender, bundles).await.unwrap();
    let storage = MemoryStorage::<Chat>::new();

    let transport = Arc::new(ChatTransport::new(hub.connector()));
    let running = Layer::new(transport, storage.clone()).spawn(vec![NS]);
    wait_for_round(&storage, 2).await;
    running.stop().await.unwrap();

    // Clean shutdown: no transaction left open, both rounds applied.
    assert!(!storage.in_transaction());
    assert_eq!(storage.get_last_round().await.unwrap(), 2);
    assert_eq!(
        storage.get(&account_oid(ADDR_A)),
        Some((1, account(ADDR_A, "Alice")))
    );
    assert_eq!(
        storage.get(&account_oid(ADDR_B)),
        Some((2, account(ADDR_B, "Bob")))
    );

    // A fresh layer over the same storage picks up at round 3.
    transmit_bundles(&sender, tail).await.unwrap();
    let transport = Arc::new(ChatTransport::new(hub.connector()));
    let running = Layer::new(transport, storage.clone()).spawn(vec![NS]);
    wait_for_round(&storage, 7).await;
    running.stop().await.unwrap();

    assert_eq!(sorted_state(&storage), cud_final_state());
}

#[tokio::test]
async fn lost_synchronization_is_fatal() {
    let hub = MemoryHub::new();
    let sender: ChatTransport = Transport::new(hub.connector());

    // An instruction expecting a future revision: monotone order is gone.
    let mut transmitter = sender.transmitter(NS).await.unwrap();
    transmitter.push(Instruction::delete(&message(ADDR_A, T0, "HI!"), 5));
    transmitter.send().await.unwrap();

    let storage = MemoryStorage::<Chat>::new();
    let transport = Arc::new(ChatTransport::new(hub.connector()));
    let layer = Layer::new(transport, storage.clone());
    let result = layer.run(&[NS]).await;

    assert!(matches!(result, Err(ExecError::SynchronizationLost)));
    assert!(!storage.in_transaction());
    assert!(storage.snapshot().is_empty());
}

#[tokio::test]
async fn malformed_package_spoils_only_its_round() {
    let hub = MemoryHub::new();

    // Round 1 is garbage injected straight into the substrate.
    let raw = hub.connector().connect();
    raw.open().await.unwrap();
    raw.send_package(&NS, Bytes::from_static(b"not a package"))
        .await
        .unwrap();

    // Round 2 is a clean creation bundle.
    let sender: ChatTransport = Transport::new(hub.connector());
    let mut transmitter = sender.transmitter(NS).await.unwrap();
    transmitter.push(Instruction::create(account(ADDR_A, "Alice")));
    transmitter.send().await.unwrap();

    let storage = MemoryStorage::<Chat>::new();
    let transport = Arc::new(ChatTransport::new(hub.connector()));
    let running = Layer::new(transport, storage.clone()).spawn(vec![NS]);
    wait_for_round(&storage, 2).await;
    running.stop().await.unwrap();

    assert!(!storage.round_accepted(1).await.unwrap());
    assert_eq!(
        storage.get(&account_oid(ADDR_A)),
        Some((2, account(ADDR_A, "Alice")))
    );
}
