//! Transport scenarios over the loopback substrate.

use std::time::Duration;

use stratus_core::Instruction;
use stratus_transport::{MemoryHub, Namespace, Transport, TransportError};

use crate::support::{account, message, Chat, ChatTransport, ADDR_A, NS, T0};

fn transport(hub: &MemoryHub) -> ChatTransport {
    Transport::new(hub.connector())
}

fn bundle() -> Vec<Instruction<Chat>> {
    vec![
        Instruction::create(account(ADDR_A, "Alice")),
        Instruction::create(message(ADDR_A, T0, "HI!")),
    ]
}

#[tokio::test]
async fn transmitter_scope_sends_one_package() {
    let hub = MemoryHub::new();
    let transport = transport(&hub);

    let mut transmitter = transport.transmitter(NS).await.unwrap();
    assert!(transmitter.is_empty());
    for instruction in bundle() {
        transmitter.push(instruction);
    }
    assert_eq!(transmitter.len(), 2);
    let receipt = transmitter.send().await.unwrap();

    assert_eq!(receipt.sync_round, 1);
    assert_eq!(receipt.sent_count, 2);
    assert_eq!(hub.len(), 1);
    assert_eq!(transport.live_connections(), 0);
}

#[tokio::test]
async fn abandoned_transmitter_sends_nothing() {
    let hub = MemoryHub::new();
    let transport = transport(&hub);

    {
        let mut transmitter = transport.transmitter(NS).await.unwrap();
        transmitter.push(Instruction::create(account(ADDR_A, "Alice")));
        // Dropped without send.
    }
    assert!(hub.is_empty());
    assert_eq!(transport.live_connections(), 0);
}

#[tokio::test]
async fn receiver_yields_rounds_in_order() {
    let hub = MemoryHub::new();
    let sender = transport(&hub);
    for _ in 0..3 {
        let mut transmitter = sender.transmitter(NS).await.unwrap();
        for instruction in bundle() {
            transmitter.push(instruction);
        }
        transmitter.send().await.unwrap();
    }

    let receiver_transport = transport(&hub);
    let mut receiver = receiver_transport.receiver(1, &[NS]).await.unwrap();
    let mut rounds = Vec::new();
    for _ in 0..3 {
        let (sync_round, package) = receiver.next().await.unwrap().unwrap();
        assert_eq!(package.count(), 2);
        rounds.push(sync_round);
    }
    assert_eq!(rounds, vec![1, 2, 3]);
}

#[tokio::test]
async fn receiver_resumes_after_given_round() {
    let hub = MemoryHub::new();
    let sender = transport(&hub);
    for _ in 0..3 {
        let mut transmitter = sender.transmitter(NS).await.unwrap();
        transmitter.push(Instruction::create(account(ADDR_A, "Alice")));
        transmitter.send().await.unwrap();
    }

    let receiver_transport = transport(&hub);
    let mut receiver = receiver_transport.receiver(2, &[NS]).await.unwrap();
    let (first, _) = receiver.next().await.unwrap().unwrap();
    let (second, _) = receiver.next().await.unwrap().unwrap();
    assert_eq!((first, second), (2, 3));
}

#[tokio::test]
async fn receiver_filters_namespaces() {
    let hub = MemoryHub::new();
    let sender = transport(&hub);

    let mut other = sender
        .transmitter(Namespace::from_static(b"elsewhere"))
        .await
        .unwrap();
    other.push(Instruction::create(account(ADDR_A, "Alice")));
    other.send().await.unwrap();

    let mut mine = sender.transmitter(NS).await.unwrap();
    mine.push(Instruction::create(account(ADDR_A, "Alice")));
    mine.send().await.unwrap();

    let receiver_transport = transport(&hub);
    let mut receiver = receiver_transport.receiver(1, &[NS]).await.unwrap();
    let (sync_round, _) = receiver.next().await.unwrap().unwrap();
    assert_eq!(sync_round, 2);
}

#[tokio::test]
async fn close_ends_receiver_without_error() {
    let hub = MemoryHub::new();
    let sender = transport(&hub);
    for _ in 0..2 {
        let mut transmitter = sender.transmitter(NS).await.unwrap();
        for instruction in bundle() {
            transmitter.push(instruction);
        }
        transmitter.send().await.unwrap();
    }

    let receiver_transport = transport(&hub);
    let mut receiver = receiver_transport.receiver(1, &[NS]).await.unwrap();
    let first = receiver.next().await.unwrap().unwrap();
    assert_eq!(first.0, 1);

    receiver_transport.close();

    // Whatever was already buffered may still arrive; the stream must
    // end cleanly with no error item.
    let mut remaining = 0;
    while let Some(item) = tokio::time::timeout(Duration::from_secs(1), receiver.next())
        .await
        .expect("stream ends promptly")
    {
        item.expect("no error on close");
        remaining += 1;
    }
    assert!(remaining <= 1);
}

#[tokio::test]
async fn close_fails_inflight_and_future_scopes() {
    let hub = MemoryHub::new();
    let transport = transport(&hub);

    let mut transmitter = transport.transmitter(NS).await.unwrap();
    transmitter.push(Instruction::create(account(ADDR_A, "Alice")));
    transport.close();
    // Close twice: same effect as once.
    transport.close();

    let err = transmitter.send().await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectionClosed));
    assert!(hub.is_empty());

    assert!(matches!(
        transport.transmitter(NS).await,
        Err(TransportError::ConnectionClosed)
    ));
    assert!(matches!(
        transport.receiver(1, &[NS]).await,
        Err(TransportError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn receiver_requires_a_namespace() {
    let hub = MemoryHub::new();
    let transport = transport(&hub);
    assert!(matches!(
        transport.receiver(1, &[]).await,
        Err(TransportError::NoNamespace)
    ));
    // The failed scope released its connection.
    assert_eq!(transport.live_connections(), 0);
}
