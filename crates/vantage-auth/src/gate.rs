//! AuthGate — credential verification, subscription gating, token
//! issuance and validation.

use tracing::{info, instrument, warn};

use vantage_core::ids::TenantId;
use vantage_core::scope::TenantScope;
use vantage_store::{StoreError, TenantRepo, TenantRow, UserRepo, UserRow};

use crate::errors::AuthError;
use crate::password;
use crate::token::{self, Claims, TokenConfig};

/// Successful authentication result.
#[derive(Clone, Debug)]
pub struct AuthSuccess {
    /// Signed bearer token.
    pub token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
    pub user: UserRow,
    pub tenant: TenantRow,
}

pub struct AuthGate {
    users: UserRepo,
    tenants: TenantRepo,
    config: TokenConfig,
}

impl AuthGate {
    pub fn new(users: UserRepo, tenants: TenantRepo, config: TokenConfig) -> Self {
        Self {
            users,
            tenants,
            config,
        }
    }

    /// Authenticate with email + password, optionally narrowed to one
    /// tenant.
    ///
    /// Failure modes are deliberately coarse: an unknown email and a
    /// wrong password both return `InvalidCredentials`. The plaintext
    /// password is never logged.
    #[instrument(skip(self, password), fields(email))]
    pub fn authenticate(
        &self,
        email: &str,
        password: &str,
        tenant_hint: Option<&TenantId>,
    ) -> Result<AuthSuccess, AuthError> {
        let candidates = self.candidates(email, tenant_hint)?;

        let mut matched: Option<UserRow> = None;
        for user in candidates {
            if password::verify_password(password, &user.password_hash)? {
                matched = Some(user);
                break;
            }
        }
        let user = matched.ok_or(AuthError::InvalidCredentials)?;

        let tenant = self.tenants.get(&user.tenant_id)?;
        if !tenant.status.is_active() {
            warn!(tenant_id = %tenant.id, status = %tenant.status, "login blocked: inactive tenant");
            return Err(AuthError::TenantInactive {
                status: tenant.status.to_string(),
            });
        }

        let scope = TenantScope::try_new(tenant.id.clone()).map_err(StoreError::from)?;
        self.users.record_login(&scope, &user.id)?;

        let token = token::issue_token(
            &user.id,
            &user.tenant_id,
            &user.email,
            &user.role.to_string(),
            &self.config,
        )?;

        info!(user_id = %user.id, tenant_id = %tenant.id, "login succeeded");

        Ok(AuthSuccess {
            token,
            expires_in: self.config.ttl_secs,
            user,
            tenant,
        })
    }

    /// Validate a bearer token. Stateless and side-effect-free.
    pub fn authorize(&self, token: &str) -> Result<Claims, AuthError> {
        token::decode_token(token, &self.config)
    }

    fn candidates(
        &self,
        email: &str,
        tenant_hint: Option<&TenantId>,
    ) -> Result<Vec<UserRow>, AuthError> {
        match tenant_hint {
            Some(tenant_id) => {
                let scope = TenantScope::try_new(tenant_id.clone()).map_err(StoreError::from)?;
                match self.users.get_by_email(&scope, email) {
                    Ok(user) => Ok(vec![user]),
                    Err(StoreError::NotFound(_)) => Ok(Vec::new()),
                    Err(e) => Err(e.into()),
                }
            }
            None => Ok(self.users.find_all_by_email(email)?),
        }
    }
}
