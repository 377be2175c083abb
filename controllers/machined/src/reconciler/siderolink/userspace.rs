//! Userspace WireGuard for tunnel mode.
//!
//! While a `SiderolinkTunnel` exists two workers run side by side: the
//! userspace device and the relay carrying its datagrams over a TCP
//! connection to the management API. Each is restarted on its own after
//! [`RESTART_DELAY`]; a failing relay never takes the device down. A changed
//! or removed tunnel stops both, and both are joined before the controller
//! moves on.

use crate::error::ControllerError;
use crate::runtime::{Controller, ControllerContext, Input, Wake, wait_for_change};
use async_trait::async_trait;
use resources::siderolink::{ID, SiderolinkTunnel};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

/// Name of the controller.
pub const USERSPACE_WIREGUARD_OWNER: &str = "siderolink.UserspaceWireguardController";

/// Delay before a failed worker is restarted.
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Userspace WireGuard device implementation.
pub const WIREGUARD_GO: &str = "wireguard-go";

/// A userspace WireGuard device.
#[async_trait]
pub trait TunnelDevice: Send + Sync {
    /// Run the device for `tunnel` until `stop` fires or it fails.
    async fn run(&self, tunnel: &SiderolinkTunnel, stop: CancellationToken) -> Result<(), ControllerError>;
}

/// Carries device datagrams to the management API.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Relay for `tunnel` until `stop` fires or the connection fails.
    async fn run(&self, tunnel: &SiderolinkTunnel, stop: CancellationToken) -> Result<(), ControllerError>;
}

/// Device backed by a `wireguard-go` process in the foreground.
#[derive(Debug, Clone)]
pub struct ProcessDevice {
    binary: PathBuf,
}

impl Default for ProcessDevice {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(WIREGUARD_GO),
        }
    }
}

#[async_trait]
impl TunnelDevice for ProcessDevice {
    async fn run(&self, tunnel: &SiderolinkTunnel, stop: CancellationToken) -> Result<(), ControllerError> {
        let mut child = Command::new(&self.binary)
            .arg("-f")
            .arg(&tunnel.link_name)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ControllerError::Wireguard(format!("starting {}: {}", self.binary.display(), e)))?;
        info!("Started userspace device {}", tunnel.link_name);

        tokio::select! {
            _ = stop.cancelled() => {
                child.kill().await?;
                Ok(())
            }
            status = child.wait() => {
                let status = status?;
                Err(ControllerError::Wireguard(format!("device {} exited with {}", tunnel.link_name, status)))
            }
        }
    }
}

/// Relay framing datagrams as big-endian `u16` length plus payload over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpRelay;

/// `host:port` of the management API in `api_endpoint`.
pub fn relay_target(api_endpoint: &str) -> Result<String, ControllerError> {
    let url = Url::parse(api_endpoint)
        .map_err(|e| ControllerError::InvalidConfig(format!("tunnel endpoint {:?}: {}", api_endpoint, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ControllerError::InvalidConfig(format!("tunnel endpoint {:?} has no host", api_endpoint)))?;
    let port = url.port_or_known_default().unwrap_or(443);
    Ok(format!("{}:{}", host, port))
}

async fn device_to_api(
    udp: &UdpSocket,
    api: &mut tokio::net::tcp::OwnedWriteHalf,
    device: &watch::Sender<Option<SocketAddr>>,
) -> Result<(), ControllerError> {
    let mut buf = vec![0u8; usize::from(u16::MAX)];
    loop {
        let (len, from) = udp.recv_from(&mut buf).await?;
        device.send_replace(Some(from));
        let frame_len = u16::try_from(len)
            .map_err(|_| ControllerError::Wireguard(format!("datagram of {} bytes is too large", len)))?;
        api.write_u16(frame_len).await?;
        api.write_all(&buf[..len]).await?;
    }
}

async fn api_to_device(
    udp: &UdpSocket,
    api: &mut tokio::net::tcp::OwnedReadHalf,
    device: watch::Receiver<Option<SocketAddr>>,
) -> Result<(), ControllerError> {
    loop {
        let len = api.read_u16().await?;
        let mut frame = vec![0u8; usize::from(len)];
        api.read_exact(&mut frame).await?;

        // Nothing to answer until the device has spoken.
        let target = *device.borrow();
        if let Some(target) = target {
            udp.send_to(&frame, target).await?;
        }
    }
}

#[async_trait]
impl Relay for TcpRelay {
    async fn run(&self, tunnel: &SiderolinkTunnel, stop: CancellationToken) -> Result<(), ControllerError> {
        let local = tunnel
            .relay_address
            .ok_or_else(|| ControllerError::InvalidConfig("tunnel has no relay address".to_string()))?;
        let target = relay_target(&tunnel.api_endpoint)?;

        let udp = UdpSocket::bind(local).await?;
        let stream = TcpStream::connect(&target).await?;
        let (mut reader, mut writer) = stream.into_split();
        info!("Relaying {} over {}", local, target);

        let (device_tx, device_rx) = watch::channel(None);
        tokio::select! {
            _ = stop.cancelled() => Ok(()),
            result = device_to_api(&udp, &mut writer, &device_tx) => result,
            result = api_to_device(&udp, &mut reader, device_rx) => result,
        }
    }
}

/// Runs `worker` until `stop` fires, restarting it after [`RESTART_DELAY`].
pub async fn keep_running<F, Fut>(what: &str, stop: CancellationToken, mut worker: F)
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), ControllerError>>,
{
    loop {
        let result = worker(stop.clone()).await;
        if stop.is_cancelled() {
            return;
        }
        match result {
            Ok(()) => warn!("{} stopped, restarting in {:?}", what, RESTART_DELAY),
            Err(e) => warn!("{} failed, restarting in {:?}: {}", what, RESTART_DELAY, e),
        }

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(RESTART_DELAY) => {}
        }
    }
}

/// Supervises the userspace device and relay of the siderolink tunnel.
pub struct UserspaceWireguardController {
    device: Arc<dyn TunnelDevice>,
    relay: Arc<dyn Relay>,
}

impl std::fmt::Debug for UserspaceWireguardController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserspaceWireguardController").finish_non_exhaustive()
    }
}

impl UserspaceWireguardController {
    /// Controller running `device` and `relay`.
    pub fn new(device: Arc<dyn TunnelDevice>, relay: Arc<dyn Relay>) -> Self {
        Self { device, relay }
    }

    async fn supervise(&self, tunnel: &SiderolinkTunnel, stop: CancellationToken) {
        let device = keep_running("userspace device", stop.clone(), |stop| {
            let device = Arc::clone(&self.device);
            let tunnel = tunnel.clone();
            async move { device.run(&tunnel, stop).await }
        });
        let relay = keep_running("relay", stop.clone(), |stop| {
            let relay = Arc::clone(&self.relay);
            let tunnel = tunnel.clone();
            async move { relay.run(&tunnel, stop).await }
        });
        tokio::join!(device, relay);
    }
}

#[async_trait]
impl Controller for UserspaceWireguardController {
    fn name(&self) -> &'static str {
        USERSPACE_WIREGUARD_OWNER
    }

    async fn run(&mut self, ctx: &ControllerContext) -> Result<(), ControllerError> {
        let inputs = [Input::of::<SiderolinkTunnel>()];
        let mut events = ctx.state.watch();

        loop {
            let tunnel = ctx.state.try_get::<SiderolinkTunnel>(ID)?.map(|r| r.spec);

            if let Some(tunnel) = tunnel {
                info!("Starting userspace WireGuard for {}", tunnel.link_name);
                let stop = ctx.cancel.child_token();
                let workers = self.supervise(&tunnel, stop.clone());
                tokio::pin!(workers);

                loop {
                    tokio::select! {
                        _ = &mut workers => break,
                        wake = wait_for_change(&mut events, &inputs, None, &ctx.cancel) => {
                            let current = ctx.state.try_get::<SiderolinkTunnel>(ID)?.map(|r| r.spec);
                            if wake == Wake::Cancelled || current.as_ref() != Some(&tunnel) {
                                stop.cancel();
                                (&mut workers).await;
                                break;
                            }
                        }
                    }
                }
                info!("Stopped userspace WireGuard for {}", tunnel.link_name);
            }

            if ctx.cancel.is_cancelled() {
                return Ok(());
            }
            if ctx.state.try_get::<SiderolinkTunnel>(ID)?.is_none()
                && wait_for_change(&mut events, &inputs, None, &ctx.cancel).await == Wake::Cancelled
            {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
#[path = "userspace_test.rs"]
mod userspace_test;
