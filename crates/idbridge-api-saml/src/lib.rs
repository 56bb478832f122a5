//! SAML 2.0 identity provider for idbridge.
//!
//! Issues signed assertions for SP-initiated logins over the HTTP-POST
//! binding, with email as the NameID. Unknown users can be created on first
//! login (JIT) and pushed to the remote directory through
//! [`idbridge_scim_client::UserSync`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod saml;
pub mod services;

pub use config::{IdpSettings, JitSettings};
pub use error::{SamlError, SamlResult};
pub use handlers::SamlState;
pub use router::saml_router;
pub use saml::SigningCredentials;
pub use services::{AssertionBuilder, RedirectPolicy, SpService, SsoService};
