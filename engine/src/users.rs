//! User provisioning. Users are created by the admin surface and
//! authenticate with an API key/secret pair; there is no self-signup.

use chrono::Utc;
use database::schema::{balances, orders, trades, users};
use database::{DbPool, NewUser, User, UserStatus};
use diesel::prelude::*;
use rand::RngCore;
use serde::Deserialize;
use tracing::info;

use crate::error::EngineError;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub username: Option<String>,
}

pub struct UserService {
    pool: DbPool,
}

impl UserService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a user with freshly generated API credentials. The secret is
    /// returned once, for the creation response.
    pub fn create_user(&self, request: CreateUserRequest) -> Result<(User, String), EngineError> {
        if !is_valid_email(&request.email) {
            return Err(EngineError::InvalidEmail(request.email));
        }

        let mut conn = self.pool.get()?;
        let existing: Option<i64> = users::table
            .filter(users::email.eq(&request.email))
            .select(users::id)
            .first(&mut conn)
            .optional()?;
        if existing.is_some() {
            return Err(EngineError::AlreadyExists("email"));
        }

        let api_key = random_hex(32);
        let api_secret = random_hex(64);

        let user = diesel::insert_into(users::table)
            .values(&NewUser {
                email: request.email,
                username: request.username,
                api_key,
                api_secret: api_secret.clone(),
                role: "user".to_string(),
                status: UserStatus::Active.as_str().to_string(),
            })
            .get_result::<User>(&mut conn)?;

        info!(user_id = user.id, email = %user.email, "user created");
        Ok((user, api_secret))
    }

    pub fn get_user(&self, user_id: i64) -> Result<User, EngineError> {
        let mut conn = self.pool.get()?;
        users::table
            .find(user_id)
            .first::<User>(&mut conn)
            .optional()?
            .ok_or(EngineError::NotFound("user"))
    }

    /// Credential lookup for the auth middleware.
    pub fn get_user_by_api_key(&self, api_key: &str) -> Result<User, EngineError> {
        let mut conn = self.pool.get()?;
        users::table
            .filter(users::api_key.eq(api_key))
            .first::<User>(&mut conn)
            .optional()?
            .ok_or(EngineError::NotFound("user"))
    }

    /// Paginated listing with optional email/api-key search and status
    /// filter, newest first.
    pub fn list_users(
        &self,
        page: i64,
        limit: i64,
        search: Option<&str>,
        status: Option<&str>,
    ) -> Result<(Vec<User>, i64), EngineError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let mut conn = self.pool.get()?;

        let total: i64 = filtered_users(search, status)
            .count()
            .get_result(&mut conn)?;
        let rows = filtered_users(search, status)
            .order(users::created_at.desc())
            .limit(limit)
            .offset((page - 1) * limit)
            .load::<User>(&mut conn)?;

        Ok((rows, total))
    }

    /// Rotate a user's API key and secret; the new secret is returned once.
    pub fn regenerate_credentials(&self, user_id: i64) -> Result<(User, String), EngineError> {
        let api_key = random_hex(32);
        let api_secret = random_hex(64);

        let mut conn = self.pool.get()?;
        let user = diesel::update(users::table.find(user_id))
            .set((
                users::api_key.eq(&api_key),
                users::api_secret.eq(&api_secret),
                users::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result::<User>(&mut conn)
            .optional()?
            .ok_or(EngineError::NotFound("user"))?;

        info!(user_id, "api credentials regenerated");
        Ok((user, api_secret))
    }

    /// The soft delete path: flip the account status.
    pub fn update_status(&self, user_id: i64, status: &str) -> Result<User, EngineError> {
        let status = UserStatus::parse(status)
            .ok_or_else(|| EngineError::InvalidStatus(status.to_string()))?;

        let mut conn = self.pool.get()?;
        let user = diesel::update(users::table.find(user_id))
            .set((
                users::status.eq(status.as_str()),
                users::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result::<User>(&mut conn)
            .optional()?
            .ok_or(EngineError::NotFound("user"))?;

        info!(user_id, status = %status, "user status updated");
        Ok(user)
    }

    /// The hard delete path: remove the user and everything they own, in
    /// one transaction.
    pub fn delete_user(&self, user_id: i64) -> Result<(), EngineError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, EngineError, _>(|conn| {
            let existing: Option<i64> = users::table
                .find(user_id)
                .select(users::id)
                .first(conn)
                .optional()?;
            if existing.is_none() {
                return Err(EngineError::NotFound("user"));
            }

            diesel::delete(trades::table.filter(trades::user_id.eq(user_id))).execute(conn)?;
            diesel::delete(orders::table.filter(orders::user_id.eq(user_id))).execute(conn)?;
            diesel::delete(balances::table.filter(balances::user_id.eq(user_id))).execute(conn)?;
            diesel::delete(users::table.find(user_id)).execute(conn)?;
            Ok(())
        })?;

        info!(user_id, "user and all related data deleted");
        Ok(())
    }

    /// Stamp a successful authentication.
    pub fn touch_last_login(&self, user_id: i64) -> Result<(), EngineError> {
        let mut conn = self.pool.get()?;
        diesel::update(users::table.find(user_id))
            .set(users::last_login.eq(Some(Utc::now().naive_utc())))
            .execute(&mut conn)?;
        Ok(())
    }
}

fn filtered_users(
    search: Option<&str>,
    status: Option<&str>,
) -> users::BoxedQuery<'static, diesel::pg::Pg> {
    let mut query = users::table.into_boxed();
    if let Some(term) = search {
        let pattern = format!("%{term}%");
        query = query.filter(
            users::email
                .ilike(pattern.clone())
                .or(users::api_key.ilike(pattern)),
        );
    }
    if let Some(status) = status {
        query = query.filter(users::status.eq(status.to_string()));
    }
    query
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.contains(char::is_whitespace)
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("trader@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.io"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.com"));
        assert!(!is_valid_email("user name@example.com"));
    }

    #[test]
    fn credentials_have_expected_shape() {
        let key = random_hex(32);
        let secret = random_hex(64);
        assert_eq!(key.len(), 64);
        assert_eq!(secret.len(), 128);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(random_hex(32), random_hex(32));
    }
}
