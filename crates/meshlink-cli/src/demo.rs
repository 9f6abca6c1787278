//! Two-node demo over one simulated transport fabric.

use std::time::Duration;

use tokio::time::timeout;
use tracing::info;

use meshlink_ble::{BleDriver, BleDriverConfig};
use meshlink_core::{Event, MeshConfig, MeshError, PeerId, Result, TransportKind};
use meshlink_harness::{BleAirspace, NearbyHub, SessionMesh};
use meshlink_multipeer::{MultipeerDriver, MultipeerDriverConfig};
use meshlink_nearby::{NearbyDriver, NearbyDriverConfig};
use meshlink_runtime::{EventSink, MeshBuilder, MeshHandle};

use crate::cli::Transport;

const EVENT_WAIT: Duration = Duration::from_secs(5);

struct Node {
    name: String,
    handle: MeshHandle,
    sink: EventSink,
}

/// Run the scripted interaction: discover, connect, exchange one message
/// each way, disconnect by shutdown.
pub async fn run(transport: Transport, name_a: &str, name_b: &str, message: &str) -> Result<()> {
    let kind = transport.kind();
    let (mut a, mut b) = spawn_pair(transport, name_a, name_b)?;

    info!(transport = %kind, "{} discovers, {} advertises", a.name, b.name);
    a.handle.start_discovery(kind).await?;
    b.handle.start_advertise(kind, b.name.clone()).await?;

    let peer_b = wait_for_peer(&mut a.sink).await?;
    info!(peer = %peer_b, "{} found a peer", a.name);

    a.handle.connect(peer_b.clone()).await?;
    wait_for_connection(&mut a.sink).await?;
    info!(peer = %peer_b, "{} connected", a.name);

    a.handle.send(peer_b.clone(), message.as_bytes().to_vec()).await?;

    // Connectionless transports drop payloads by design; only wait for the
    // round trip when the fabric actually delivers.
    if kind != TransportKind::Ble {
        wait_for_connection(&mut b.sink).await?;
        let (from, data) = wait_for_message(&mut b.sink).await?;
        info!(
            peer = %from,
            text = %String::from_utf8_lossy(&data),
            "{} received a message", b.name
        );

        b.handle.send(from.clone(), b"ack".to_vec()).await?;
        let (_, data) = wait_for_message(&mut a.sink).await?;
        info!(
            text = %String::from_utf8_lossy(&data),
            "{} received the reply", a.name
        );
    } else {
        info!("broadcast transport: payload delivery is a no-op");
    }

    a.handle.shutdown().await;
    b.handle.shutdown().await;
    info!("demo complete");
    Ok(())
}

fn spawn_pair(transport: Transport, name_a: &str, name_b: &str) -> Result<(Node, Node)> {
    match transport {
        Transport::Ble => {
            let air = BleAirspace::new();
            let a = spawn_ble(&air, name_a, "AA:AA:AA:AA:AA:AA")?;
            let b = spawn_ble(&air, name_b, "BB:BB:BB:BB:BB:BB")?;
            Ok((a, b))
        }
        Transport::Nearby => {
            let hub = NearbyHub::new();
            Ok((spawn_nearby(&hub, name_a)?, spawn_nearby(&hub, name_b)?))
        }
        Transport::Multipeer => {
            let mesh = SessionMesh::new();
            Ok((spawn_multipeer(&mesh, name_a)?, spawn_multipeer(&mesh, name_b)?))
        }
    }
}

fn spawn_ble(air: &BleAirspace, name: &str, address: &str) -> Result<Node> {
    let (radio, callbacks, _controls) = air.spawn_radio(address);
    let builder = MeshBuilder::new(MeshConfig::default());
    let driver = BleDriver::new(
        radio,
        callbacks,
        builder.driver_events(),
        BleDriverConfig {
            default_name: name.to_owned(),
        },
    );
    let (handle, sink) = builder.register(driver)?.spawn()?;
    Ok(Node {
        name: name.to_owned(),
        handle,
        sink,
    })
}

fn spawn_nearby(hub: &NearbyHub, name: &str) -> Result<Node> {
    let (client, callbacks, _id) = hub.join();
    let builder = MeshBuilder::new(MeshConfig::default());
    let driver = NearbyDriver::new(
        client,
        callbacks,
        builder.driver_events(),
        NearbyDriverConfig {
            local_name: name.to_owned(),
            ..NearbyDriverConfig::default()
        },
    );
    let (handle, sink) = builder.register(driver)?.spawn()?;
    Ok(Node {
        name: name.to_owned(),
        handle,
        sink,
    })
}

fn spawn_multipeer(mesh: &SessionMesh, name: &str) -> Result<Node> {
    let (member, callbacks) = mesh.join(name);
    let builder = MeshBuilder::new(MeshConfig::default());
    let driver = MultipeerDriver::new(
        member,
        callbacks,
        builder.driver_events(),
        MultipeerDriverConfig {
            default_name: name.to_owned(),
            ..MultipeerDriverConfig::default()
        },
    );
    let (handle, sink) = builder.register(driver)?.spawn()?;
    Ok(Node {
        name: name.to_owned(),
        handle,
        sink,
    })
}

async fn next_event(sink: &mut EventSink) -> Result<Event> {
    timeout(EVENT_WAIT, sink.recv())
        .await
        .map_err(|_| MeshError::channel("timed out waiting for event"))?
        .ok_or_else(|| MeshError::channel("event sink closed"))
}

async fn wait_for_peer(sink: &mut EventSink) -> Result<PeerId> {
    loop {
        if let Event::PeerFound { peer } = next_event(sink).await? {
            return Ok(peer.id);
        }
    }
}

async fn wait_for_connection(sink: &mut EventSink) -> Result<()> {
    loop {
        match next_event(sink).await? {
            Event::ConnectionResult { success: true, .. } => return Ok(()),
            Event::ConnectionResult {
                success: false,
                peer_id,
                ..
            } => return Err(MeshError::NotConnected(peer_id)),
            _ => {}
        }
    }
}

async fn wait_for_message(sink: &mut EventSink) -> Result<(PeerId, Vec<u8>)> {
    loop {
        if let Event::MessageReceived { peer_id, data, .. } = next_event(sink).await? {
            return Ok((peer_id, data));
        }
    }
}
