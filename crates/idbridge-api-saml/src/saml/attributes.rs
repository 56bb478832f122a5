//! Assertion attributes for a local user.

use idbridge_db::User;

/// The only NameID format this IdP issues.
pub const NAMEID_FORMAT_EMAIL: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress";

/// Attribute carrying one value per mapped role.
pub const ROLE_ATTRIBUTE: &str = "idp_role";

/// User fields available to the assertion.
#[derive(Debug, Clone)]
pub struct UserAttributes {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// External values of the user's active roles.
    pub roles: Vec<String>,
}

impl UserAttributes {
    #[must_use]
    pub fn from_user(user: &User, roles: Vec<String>) -> Self {
        Self {
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            roles,
        }
    }
}

/// A resolved SAML attribute ready for assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttribute {
    pub name: String,
    pub friendly_name: Option<String>,
    pub format: Option<String>,
    pub values: Vec<String>,
}

impl ResolvedAttribute {
    fn single(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            friendly_name: None,
            format: None,
            values: vec![value.to_string()],
        }
    }
}

/// Attributes sent for every login. Empty names are omitted; roles repeat.
#[must_use]
pub fn assertion_attributes(user: &UserAttributes) -> Vec<ResolvedAttribute> {
    let mut attrs = vec![ResolvedAttribute::single("email", &user.email)];

    if let Some(first) = user.first_name.as_deref().filter(|s| !s.is_empty()) {
        attrs.push(ResolvedAttribute::single("givenName", first));
    }
    if let Some(last) = user.last_name.as_deref().filter(|s| !s.is_empty()) {
        attrs.push(ResolvedAttribute::single("sn", last));
    }
    attrs.push(ResolvedAttribute::single(
        "eduPersonPrincipalName",
        &user.email,
    ));

    if !user.roles.is_empty() {
        attrs.push(ResolvedAttribute {
            name: ROLE_ATTRIBUTE.to_string(),
            friendly_name: None,
            format: None,
            values: user.roles.clone(),
        });
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jane(roles: Vec<String>) -> UserAttributes {
        UserAttributes {
            email: "jane@co.com".into(),
            first_name: Some("Jane".into()),
            last_name: None,
            roles,
        }
    }

    #[test]
    fn test_roles_form_one_multi_valued_attribute() {
        let attrs = assertion_attributes(&jane(vec!["admin".into(), "viewer".into()]));
        let roles: Vec<_> = attrs.iter().filter(|a| a.name == ROLE_ATTRIBUTE).collect();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].values, vec!["admin", "viewer"]);
    }

    #[test]
    fn test_missing_names_are_omitted() {
        let attrs = assertion_attributes(&jane(Vec::new()));
        let names: Vec<_> = attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["email", "givenName", "eduPersonPrincipalName"]);
    }
}
