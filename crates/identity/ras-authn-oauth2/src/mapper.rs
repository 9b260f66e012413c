//! Maps provider user info onto an [`Identity`].

use crate::connector::BasicUserInfo;
use crate::settings::{OAuthInfo, OAuthSettings};
use ras_authn_core::{
    ClientParams, DEFAULT_ORG_ID, Identity, OAuthToken, OrgId, RoleType, UserLookupParams,
};
use std::collections::HashMap;
use tracing::debug;

/// Org the role hint applies to.
fn role_org_id(settings: &OAuthSettings) -> OrgId {
    if settings.auto_assign_org && settings.auto_assign_org_id > 0 {
        settings.auto_assign_org_id
    } else {
        DEFAULT_ORG_ID
    }
}

/// Org roles for a role hint. Hints that are not a valid role map to nothing.
pub fn org_roles(role: &str, settings: &OAuthSettings) -> HashMap<OrgId, RoleType> {
    match role.parse::<RoleType>() {
        Ok(role) => HashMap::from([(role_org_id(settings), role)]),
        Err(_) => {
            if !role.is_empty() {
                debug!("Ignoring unknown role hint: {}", role);
            }
            HashMap::new()
        }
    }
}

/// Everything needed to turn user info into an identity.
pub struct IdentityMapper<'a> {
    pub provider: &'a str,
    pub settings: &'a OAuthSettings,
    pub info: &'a OAuthInfo,
    pub allow_sign_up: bool,
}

impl IdentityMapper<'_> {
    pub fn auth_module(&self) -> String {
        format!("oauth_{}", self.provider)
    }

    fn insecure_email_lookup(&self) -> bool {
        self.info.allow_insecure_email_lookup || self.settings.oauth_allow_insecure_email_lookup
    }

    pub fn map(&self, user_info: BasicUserInfo, token: OAuthToken) -> Identity {
        let mut look_up_params = UserLookupParams::default();
        if self.insecure_email_lookup() {
            look_up_params.email = Some(user_info.email.clone());
        }

        Identity {
            org_roles: org_roles(&user_info.role, self.settings),
            auth_id: user_info.id,
            authenticated_by: self.auth_module(),
            login: user_info.login,
            name: user_info.name,
            email: user_info.email,
            groups: user_info.groups,
            is_server_admin: user_info.is_server_admin,
            oauth_token: Some(token),
            client_params: ClientParams {
                sync_user: true,
                sync_teams: true,
                sync_org_roles: true,
                allow_sign_up: self.allow_sign_up,
                fetch_synced_user: true,
                enable_user: false,
                look_up_params,
            },
        }
    }
}
