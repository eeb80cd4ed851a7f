//! Synchronous client for a REST provisioning API.
//!
//! # Overview
//! Manages accounts, users, applications, addresses, payments, invitations
//! and features. Every call goes through one adapter, `ResourceClient`,
//! which builds the request (base URI plus resource path, Basic credentials,
//! JSON body with camel-cased keys), executes it over a `Transport` and
//! decodes the JSON answer into dynamic maps.
//!
//! # Design
//! - `ResourceClient` keeps request building and response parsing pure; the
//!   `Transport` trait is the only I/O seam.
//! - `UreqTransport` creates its agent lazily and reuses it for every call,
//!   safely across threads.
//! - Responses are `serde_json` maps (`Resource`), not typed structs: the
//!   API has no fixed schema and callers index the keys they know.
//! - `Provisioning` holds the per-resource operations and derives ids from
//!   `href` values.
//!
//! ```no_run
//! use provisioning_core::{ClientConfig, Provisioning};
//!
//! let config = ClientConfig::new("jdoe", "secret");
//! let provisioning = Provisioning::connect(config)?;
//! for app in provisioning.applications()? {
//!     println!("{} {}", app["application_id"], app["name"]);
//! }
//! # Ok::<(), provisioning_core::ProvisioningError>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod keys;
pub mod provisioning;
pub mod transport;
pub mod types;

pub use client::ResourceClient;
pub use config::{ClientConfig, DEFAULT_BASE_URI};
pub use error::{ProvisioningError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use keys::{camelize_key, camelize_keys, last_path_segment};
pub use provisioning::Provisioning;
pub use transport::{Transport, UreqTransport};
pub use types::{Decoded, Params, Resource};
