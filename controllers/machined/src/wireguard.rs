//! WireGuard keys and device inspection.
//!
//! Keys travel base64-encoded, the way `wg` prints them. Devices are
//! inspected over the userspace API socket that both the kernel tooling and
//! `wireguard-go` expose under [`UAPI_SOCKET_DIR`].

use crate::error::ControllerError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use x25519_dalek::{PublicKey, StaticSecret};

/// Directory holding the UAPI sockets.
pub const UAPI_SOCKET_DIR: &str = "/var/run/wireguard";

/// Generates a base64-encoded private key.
pub fn generate_private_key() -> String {
    let secret = StaticSecret::random();
    STANDARD.encode(secret.to_bytes())
}

fn decode_key(encoded: &str) -> Result<[u8; 32], ControllerError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ControllerError::Wireguard(format!("invalid key: {}", e)))?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| ControllerError::Wireguard(format!("invalid key length {}", bytes.len())))
}

/// Base64-encoded public key of a base64-encoded private key.
pub fn public_key(private_key: &str) -> Result<String, ControllerError> {
    let secret = StaticSecret::from(decode_key(private_key)?);
    Ok(STANDARD.encode(PublicKey::from(&secret).as_bytes()))
}

/// Checks that `key` is a well-formed base64-encoded key.
pub fn validate_key(key: &str) -> Result<(), ControllerError> {
    decode_key(key).map(|_| ())
}

/// Read access to a WireGuard device.
#[async_trait]
pub trait WireguardDevice: Send + Sync {
    /// Most recent handshake with any peer of `link`; `None` when there was
    /// none or the device does not exist.
    async fn last_handshake(&self, link: &str) -> Result<Option<DateTime<Utc>>, ControllerError>;
}

/// Device inspection over the UAPI socket.
#[derive(Debug, Clone)]
pub struct UapiDevice {
    socket_dir: PathBuf,
}

impl Default for UapiDevice {
    fn default() -> Self {
        Self {
            socket_dir: PathBuf::from(UAPI_SOCKET_DIR),
        }
    }
}

impl UapiDevice {
    /// Inspection through sockets under `socket_dir`.
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
        }
    }
}

/// Latest peer handshake in a UAPI `get` response.
pub fn parse_last_handshake(response: &str) -> Result<Option<DateTime<Utc>>, ControllerError> {
    let mut latest: Option<DateTime<Utc>> = None;
    let mut seconds: Option<i64> = None;

    for line in response.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let parse = |value: &str| {
            value
                .parse::<i64>()
                .map_err(|e| ControllerError::Wireguard(format!("bad {} {:?}: {}", key, value, e)))
        };

        match key {
            "errno" if value != "0" => {
                return Err(ControllerError::Wireguard(format!("device returned errno {}", value)));
            }
            "public_key" => seconds = None,
            "last_handshake_time_sec" => seconds = Some(parse(value)?),
            "last_handshake_time_nsec" => {
                let nanos = parse(value)?;
                // zero seconds means the peer never completed a handshake
                if let Some(secs) = seconds.filter(|s| *s > 0) {
                    let at = DateTime::from_timestamp(secs, u32::try_from(nanos).unwrap_or_default());
                    latest = latest.max(at);
                }
            }
            _ => {}
        }
    }

    Ok(latest)
}

#[async_trait]
impl WireguardDevice for UapiDevice {
    async fn last_handshake(&self, link: &str) -> Result<Option<DateTime<Utc>>, ControllerError> {
        let path = self.socket_dir.join(format!("{}.sock", link));
        let mut stream = match UnixStream::connect(&path).await {
            Ok(stream) => stream,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        stream.write_all(b"get=1\n\n").await?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 || line == "\n" {
                break;
            }
            response.push_str(&line);
        }

        parse_last_handshake(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    #[test]
    fn test_key_pair() {
        let private = generate_private_key();
        assert_eq!(STANDARD.decode(&private).unwrap().len(), 32);

        let public = public_key(&private).unwrap();
        assert_eq!(public, public_key(&private).unwrap());
        assert_ne!(public, private);
        validate_key(&public).unwrap();

        assert!(public_key("AAAA").is_err());
        assert!(validate_key("not base64!").is_err());
    }

    #[test]
    fn test_parse_last_handshake() {
        let response = "private_key=abcd\nlisten_port=51820\n\
            public_key=peer1\nlast_handshake_time_sec=1700000000\nlast_handshake_time_nsec=5\n\
            public_key=peer2\nlast_handshake_time_sec=1700000100\nlast_handshake_time_nsec=0\n\
            public_key=peer3\nlast_handshake_time_sec=0\nlast_handshake_time_nsec=0\n\
            errno=0\n";

        let latest = parse_last_handshake(response).unwrap().unwrap();
        assert_eq!(latest.timestamp(), 1_700_000_100);

        assert_eq!(
            parse_last_handshake("public_key=peer\nlast_handshake_time_sec=0\nlast_handshake_time_nsec=0\nerrno=0\n")
                .unwrap(),
            None
        );
        assert!(parse_last_handshake("errno=19\n").is_err());
    }

    #[tokio::test]
    async fn test_uapi_device() {
        let dir = tempfile::tempdir().unwrap();
        let listener = UnixListener::bind(dir.path().join("siderolink.sock")).unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 7];
            stream.read_exact(&mut request).await.unwrap();
            assert_eq!(&request, b"get=1\n\n");
            stream
                .write_all(b"public_key=peer\nlast_handshake_time_sec=1700000000\nlast_handshake_time_nsec=0\nerrno=0\n\n")
                .await
                .unwrap();
        });

        let device = UapiDevice::new(dir.path());
        let handshake = device.last_handshake("siderolink").await.unwrap();
        assert_eq!(handshake.map(|h| h.timestamp()), Some(1_700_000_000));
        server.await.unwrap();

        assert_eq!(device.last_handshake("missing").await.unwrap(), None);
    }
}
