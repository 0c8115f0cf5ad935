use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vantage_core::ids::{TenantId, UserId};
use vantage_core::scope::TenantScope;
use vantage_core::time::format_ts;

use crate::error::StoreError;
use crate::pool::Store;
use crate::row_helpers;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Member => write!(f, "member"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRow {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    /// Argon2id PHC string. Never serialized into API responses.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub login_count: i64,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone)]
pub struct UserRepo {
    store: Store,
}

const USER_COLUMNS: &str =
    "id, tenant_id, email, password_hash, role, login_count, last_login_at, created_at, updated_at";

impl UserRepo {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create a user inside a tenant. Email is unique per tenant, not
    /// globally.
    #[instrument(skip(self, password_hash), fields(tenant_id = %scope.tenant_id(), email))]
    pub fn create(
        &self,
        scope: &TenantScope,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<UserRow, StoreError> {
        let id = UserId::new();
        let now = format_ts(&Utc::now());

        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, tenant_id, email, password_hash, role, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id.as_str(),
                    scope.tenant_id().as_str(),
                    email,
                    password_hash,
                    role.to_string(),
                    now,
                    now,
                ],
            )?;

            Ok(UserRow {
                id,
                tenant_id: scope.tenant_id().clone(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                role,
                login_count: 0,
                last_login_at: None,
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    /// Get a user by email within a tenant.
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id(), email))]
    pub fn get_by_email(&self, scope: &TenantScope, email: &str) -> Result<UserRow, StoreError> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE tenant_id = ?1 AND email = ?2"
            ))?;
            let mut rows = stmt.query(rusqlite::params![scope.tenant_id().as_str(), email])?;
            match rows.next()? {
                Some(row) => row_to_user(row),
                None => Err(StoreError::NotFound(format!("user {email}"))),
            }
        })
    }

    /// Find every user with this email across tenants.
    ///
    /// Identity resolution for login without a tenant hint happens
    /// before any scope exists; this lookup takes zero tenant ids and
    /// is only reachable from the credential-verification path.
    #[instrument(skip(self), fields(email))]
    pub fn find_all_by_email(&self, email: &str) -> Result<Vec<UserRow>, StoreError> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE email = ?1 ORDER BY created_at"
            ))?;
            let mut rows = stmt.query([email])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_user(row)?);
            }
            Ok(results)
        })
    }

    /// Record a successful login: one atomic increment plus timestamps,
    /// never a read-modify-write.
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id(), user_id = %id))]
    pub fn record_login(&self, scope: &TenantScope, id: &UserId) -> Result<(), StoreError> {
        self.store.with_conn(|conn| {
            let now = format_ts(&Utc::now());
            let changed = conn.execute(
                "UPDATE users SET login_count = login_count + 1, last_login_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND tenant_id = ?3",
                rusqlite::params![now, id.as_str(), scope.tenant_id().as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }
            Ok(())
        })
    }

    /// Count users in a tenant (for max_users enforcement).
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id()))]
    pub fn count(&self, scope: &TenantScope) -> Result<i64, StoreError> {
        self.store.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE tenant_id = ?1",
                [scope.tenant_id().as_str()],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<UserRow, StoreError> {
    let role_str: String = row_helpers::get(row, 4, "users", "role")?;

    Ok(UserRow {
        id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
        tenant_id: TenantId::from_raw(row_helpers::get::<String>(row, 1, "users", "tenant_id")?),
        email: row_helpers::get(row, 2, "users", "email")?,
        password_hash: row_helpers::get(row, 3, "users", "password_hash")?,
        role: row_helpers::parse_enum(&role_str, "users", "role")?,
        login_count: row_helpers::get(row, 5, "users", "login_count")?,
        last_login_at: row_helpers::get_opt(row, 6, "users", "last_login_at")?,
        created_at: row_helpers::get(row, 7, "users", "created_at")?,
        updated_at: row_helpers::get(row, 8, "users", "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenants::TenantRepo;

    fn setup() -> (Store, TenantScope) {
        let store = Store::in_memory().unwrap();
        let tenant = TenantRepo::new(store.clone()).create("Acme", "k", 0, 0).unwrap();
        let scope = TenantScope::try_new(tenant.id).unwrap();
        (store, scope)
    }

    #[test]
    fn create_and_fetch_user() {
        let (store, scope) = setup();
        let repo = UserRepo::new(store);
        let user = repo.create(&scope, "a@x.com", "$argon2id$stub", Role::Admin).unwrap();
        assert!(user.id.as_str().starts_with("usr_"));

        let fetched = repo.get_by_email(&scope, "a@x.com").unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.role, Role::Admin);
        assert_eq!(fetched.login_count, 0);
    }

    #[test]
    fn email_unique_within_tenant() {
        let (store, scope) = setup();
        let repo = UserRepo::new(store);
        repo.create(&scope, "a@x.com", "h", Role::Member).unwrap();
        let result = repo.create(&scope, "a@x.com", "h", Role::Member);
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn same_email_allowed_across_tenants() {
        let store = Store::in_memory().unwrap();
        let tenants = TenantRepo::new(store.clone());
        let t1 = tenants.create("A", "ka", 0, 0).unwrap();
        let t2 = tenants.create("B", "kb", 0, 0).unwrap();
        let s1 = TenantScope::try_new(t1.id).unwrap();
        let s2 = TenantScope::try_new(t2.id).unwrap();

        let repo = UserRepo::new(store);
        repo.create(&s1, "shared@x.com", "h", Role::Member).unwrap();
        repo.create(&s2, "shared@x.com", "h", Role::Member).unwrap();

        let all = repo.find_all_by_email("shared@x.com").unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn get_by_email_is_tenant_scoped() {
        let store = Store::in_memory().unwrap();
        let tenants = TenantRepo::new(store.clone());
        let t1 = tenants.create("A", "ka", 0, 0).unwrap();
        let t2 = tenants.create("B", "kb", 0, 0).unwrap();
        let s1 = TenantScope::try_new(t1.id).unwrap();
        let s2 = TenantScope::try_new(t2.id).unwrap();

        let repo = UserRepo::new(store);
        repo.create(&s1, "only-a@x.com", "h", Role::Member).unwrap();

        assert!(repo.get_by_email(&s1, "only-a@x.com").is_ok());
        assert!(matches!(
            repo.get_by_email(&s2, "only-a@x.com"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn record_login_increments_counter() {
        let (store, scope) = setup();
        let repo = UserRepo::new(store);
        let user = repo.create(&scope, "a@x.com", "h", Role::Member).unwrap();

        repo.record_login(&scope, &user.id).unwrap();
        repo.record_login(&scope, &user.id).unwrap();

        let fetched = repo.get_by_email(&scope, "a@x.com").unwrap();
        assert_eq!(fetched.login_count, 2);
        assert!(fetched.last_login_at.is_some());
    }

    #[test]
    fn record_login_wrong_tenant_fails() {
        let store = Store::in_memory().unwrap();
        let tenants = TenantRepo::new(store.clone());
        let t1 = tenants.create("A", "ka", 0, 0).unwrap();
        let t2 = tenants.create("B", "kb", 0, 0).unwrap();
        let s1 = TenantScope::try_new(t1.id).unwrap();
        let s2 = TenantScope::try_new(t2.id).unwrap();

        let repo = UserRepo::new(store);
        let user = repo.create(&s1, "a@x.com", "h", Role::Member).unwrap();

        assert!(matches!(
            repo.record_login(&s2, &user.id),
            Err(StoreError::NotFound(_))
        ));
        // Counter untouched
        assert_eq!(repo.get_by_email(&s1, "a@x.com").unwrap().login_count, 0);
    }

    #[test]
    fn count_users() {
        let (store, scope) = setup();
        let repo = UserRepo::new(store);
        assert_eq!(repo.count(&scope).unwrap(), 0);
        repo.create(&scope, "a@x.com", "h", Role::Member).unwrap();
        repo.create(&scope, "b@x.com", "h", Role::Member).unwrap();
        assert_eq!(repo.count(&scope).unwrap(), 2);
    }
}
