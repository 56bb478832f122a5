//! Business logic services for SAML operations

pub mod assertion_builder;
pub mod metadata_generator;
pub mod redirect_policy;
pub mod request_parser;
pub mod sp_metadata_parser;
pub mod sp_service;
pub mod sso_service;

pub use assertion_builder::{AssertionBuilder, ResponseTarget};
pub use metadata_generator::MetadataGenerator;
pub use redirect_policy::RedirectPolicy;
pub use request_parser::{ParsedAuthnRequest, RequestParser};
pub use sp_metadata_parser::parse_sp_metadata;
pub use sp_service::SpService;
pub use sso_service::{LoginAttempt, SsoOutcome, SsoService};
