//! Identity records produced by authentication clients.

use crate::{AuthnError, OAuthToken};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub type OrgId = i64;

/// Organization a role lands in when no other organization is configured.
pub const DEFAULT_ORG_ID: OrgId = 1;

/// Basic organization role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleType {
    Viewer,
    Editor,
    Admin,
    #[serde(rename = "None")]
    NoBasicRole,
}

impl RoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::Viewer => "Viewer",
            RoleType::Editor => "Editor",
            RoleType::Admin => "Admin",
            RoleType::NoBasicRole => "None",
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleType {
    type Err = AuthnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Viewer" => Ok(RoleType::Viewer),
            "Editor" => Ok(RoleType::Editor),
            "Admin" => Ok(RoleType::Admin),
            "None" => Ok(RoleType::NoBasicRole),
            other => Err(AuthnError::InvalidRole(other.to_string())),
        }
    }
}

/// Parameters used to find an already existing user.
///
/// Every field left as `None` is ignored by the lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLookupParams {
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub login: Option<String>,
}

impl UserLookupParams {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.email.is_none() && self.login.is_none()
    }
}

/// Directives for the identity framework on what to do with an identity
/// after a client produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientParams {
    pub sync_user: bool,
    pub sync_teams: bool,
    pub sync_org_roles: bool,
    pub allow_sign_up: bool,
    pub fetch_synced_user: bool,
    pub enable_user: bool,
    pub look_up_params: UserLookupParams,
}

/// An authenticated identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Subject identifier assigned by the authenticating party.
    pub auth_id: String,
    /// Module that authenticated the identity, e.g. `oauth_azuread`.
    pub authenticated_by: String,
    pub login: String,
    pub name: String,
    pub email: String,
    pub groups: Vec<String>,
    pub is_server_admin: Option<bool>,
    pub org_roles: HashMap<OrgId, RoleType>,
    #[serde(skip)]
    pub oauth_token: Option<OAuthToken>,
    pub client_params: ClientParams,
}

/// Stored link between a local user and an external authentication module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAuth {
    pub user_id: i64,
    pub auth_module: String,
    pub auth_id: String,
}
