//! Siderolink Provisioning Client
//!
//! Registers a node with the management API and obtains the parameters of
//! its WireGuard link.
//!
//! # Example
//!
//! ```no_run
//! use siderolink_client::{ProvisionClient, ProvisionRequest, SiderolinkClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SiderolinkClient::new("https://siderolink.api", false)?;
//! let response = client
//!     .provision(ProvisionRequest {
//!         node_uuid: "71233efd-7a07-43f8-b6ba-da90fbe7e3e0".to_string(),
//!         node_public_key: "base64-public-key".to_string(),
//!         join_token: Some("secret".to_string()),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("assigned {}", response.node_address_prefix);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod provision_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::SiderolinkClient;
pub use error::ProvisionError;
pub use models::{ProvisionRequest, ProvisionResponse};
pub use provision_trait::ProvisionClient;
#[cfg(feature = "test-util")]
pub use mock::MockProvisionClient;
