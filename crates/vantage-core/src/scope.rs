use crate::ids::TenantId;

/// Returned when a data-access path is reached without a tenant filter.
/// This is a programming error surfaced as a value, never a silent
/// "return everything".
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("missing tenant scope")]
pub struct MissingTenantScope;

/// Proof that a caller is operating on behalf of exactly one tenant.
///
/// Every repository method that touches sessions, users, or scores takes
/// a `&TenantScope`. The only ways to obtain one are verified token
/// claims (read paths) or a resolved tenant record (the ingest path), so
/// cross-tenant queries are unrepresentable: no operation accepts two
/// tenant identifiers at once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantScope(TenantId);

impl TenantScope {
    /// Build a scope from a tenant identifier. An empty identifier is
    /// rejected rather than matching every row.
    pub fn try_new(tenant_id: TenantId) -> Result<Self, MissingTenantScope> {
        if tenant_id.as_str().is_empty() {
            return Err(MissingTenantScope);
        }
        Ok(Self(tenant_id))
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_from_valid_tenant() {
        let id = TenantId::new();
        let scope = TenantScope::try_new(id.clone()).unwrap();
        assert_eq!(scope.tenant_id(), &id);
    }

    #[test]
    fn empty_tenant_is_rejected() {
        let result = TenantScope::try_new(TenantId::from_raw(""));
        assert_eq!(result.unwrap_err(), MissingTenantScope);
    }
}
