//! SAML-specific utilities

pub mod attributes;
pub mod signing;

pub use attributes::{
    assertion_attributes, ResolvedAttribute, UserAttributes, NAMEID_FORMAT_EMAIL, ROLE_ATTRIBUTE,
};
pub use signing::SigningCredentials;
