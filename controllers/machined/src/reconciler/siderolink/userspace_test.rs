//! Unit tests for userspace module

use super::*;
use crate::test_utils::wait_until;
use resources::State;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;

const TUNNEL_OWNER: &str = "siderolink.ManagerController";

/// Worker counting its starts and stops; fails at once when `fail` is set.
#[derive(Debug, Default)]
struct CountingWorker {
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail: bool,
}

impl CountingWorker {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    async fn work(&self, stop: CancellationToken) -> Result<(), ControllerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ControllerError::Wireguard("connection refused".to_string()));
        }
        stop.cancelled().await;
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TunnelDevice for CountingWorker {
    async fn run(&self, _tunnel: &SiderolinkTunnel, stop: CancellationToken) -> Result<(), ControllerError> {
        self.work(stop).await
    }
}

#[async_trait]
impl Relay for CountingWorker {
    async fn run(&self, _tunnel: &SiderolinkTunnel, stop: CancellationToken) -> Result<(), ControllerError> {
        self.work(stop).await
    }
}

fn tunnel(mtu: u32) -> SiderolinkTunnel {
    SiderolinkTunnel {
        api_endpoint: "grpc://siderolink.api:8090".to_string(),
        link_name: "siderolink".to_string(),
        relay_address: Some("127.0.0.1:50180".parse().unwrap()),
        mtu,
        ..SiderolinkTunnel::default()
    }
}

fn spawn(
    controller: UserspaceWireguardController,
    ctx: &ControllerContext,
) -> tokio::task::JoinHandle<Result<(), ControllerError>> {
    let ctx = ctx.clone();
    let mut controller = controller;
    tokio::spawn(async move { controller.run(&ctx).await })
}

#[tokio::test(start_paused = true)]
async fn test_relay_failure_keeps_device() {
    let device = Arc::new(CountingWorker::default());
    let relay = Arc::new(CountingWorker::failing());
    let ctx = ControllerContext::new(State::new());
    ctx.state.create(TUNNEL_OWNER, ID, tunnel(1280)).unwrap();

    let handle = spawn(
        UserspaceWireguardController::new(Arc::<CountingWorker>::clone(&device), Arc::<CountingWorker>::clone(&relay)),
        &ctx,
    );

    // started at once, then after each restart delay
    tokio::time::sleep(RESTART_DELAY * 2 + Duration::from_secs(1)).await;
    assert_eq!(relay.starts(), 3);
    assert_eq!(device.starts(), 1);
    assert_eq!(device.stops(), 0);

    ctx.cancel.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(device.stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_backoff() {
    let relay = Arc::new(CountingWorker::failing());
    let stop = CancellationToken::new();

    let supervisor = {
        let relay = Arc::clone(&relay);
        let stop = stop.clone();
        tokio::spawn(async move {
            keep_running("relay", stop, |stop| {
                let relay = Arc::clone(&relay);
                async move { relay.work(stop).await }
            })
            .await
        })
    };

    tokio::time::sleep(RESTART_DELAY - Duration::from_millis(1)).await;
    assert_eq!(relay.starts(), 1);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(relay.starts(), 2);

    stop.cancel();
    supervisor.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tunnel_change_and_removal() {
    let device = Arc::new(CountingWorker::default());
    let relay = Arc::new(CountingWorker::default());
    let ctx = ControllerContext::new(State::new());
    let handle = spawn(
        UserspaceWireguardController::new(Arc::<CountingWorker>::clone(&device), Arc::<CountingWorker>::clone(&relay)),
        &ctx,
    );

    ctx.state.create(TUNNEL_OWNER, ID, tunnel(1280)).unwrap();
    wait_until("workers start", || device.starts() == 1 && relay.starts() == 1).await;

    ctx.state.update(TUNNEL_OWNER, ID, tunnel(1420)).unwrap();
    wait_until("workers restart", || device.starts() == 2 && relay.starts() == 2).await;
    assert_eq!(device.stops(), 1);
    assert_eq!(relay.stops(), 1);

    let key = resources::ResourceKey::of::<SiderolinkTunnel>(ID);
    ctx.state.teardown_and_destroy(TUNNEL_OWNER, &key).unwrap();
    wait_until("workers stop", || device.stops() == 2 && relay.stops() == 2).await;

    ctx.cancel.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(device.starts(), 2);
}

#[test]
fn test_relay_target() {
    assert_eq!(relay_target("grpc://siderolink.api:8090").unwrap(), "siderolink.api:8090");
    assert_eq!(relay_target("https://siderolink.api/?user=alice").unwrap(), "siderolink.api:443");
    assert_eq!(relay_target("http://10.5.0.1").unwrap(), "10.5.0.1:80");
    assert!(relay_target("siderolink").is_err());
}

#[tokio::test]
async fn test_tcp_relay_round_trip() {
    let api = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_addr = api.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut stream, _) = api.accept().await.unwrap();
        let len = stream.read_u16().await.unwrap();
        let mut frame = vec![0u8; usize::from(len)];
        stream.read_exact(&mut frame).await.unwrap();
        assert_eq!(frame, b"handshake");
        stream.write_u16(5).await.unwrap();
        stream.write_all(b"reply").await.unwrap();

        // drain retries until the relay goes away
        while let Ok(len) = stream.read_u16().await {
            let mut frame = vec![0u8; usize::from(len)];
            if stream.read_exact(&mut frame).await.is_err() {
                break;
            }
        }
    });

    let relay_addr = UdpSocket::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let tunnel = SiderolinkTunnel {
        api_endpoint: format!("http://{}", api_addr),
        relay_address: Some(relay_addr),
        ..tunnel(1280)
    };
    let stop = CancellationToken::new();
    let relay = {
        let stop = stop.clone();
        tokio::spawn(async move { TcpRelay.run(&tunnel, stop).await })
    };

    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut buf = [0u8; 64];
    let (len, from) = loop {
        device.send_to(b"handshake", relay_addr).await.unwrap();
        let received = tokio::time::timeout(Duration::from_millis(100), device.recv_from(&mut buf)).await;
        if let Ok(Ok(received)) = received {
            break received;
        }
    };
    assert_eq!(&buf[..len], b"reply");
    assert_eq!(from, relay_addr);

    stop.cancel();
    relay.await.unwrap().unwrap();
    server.await.unwrap();
}
