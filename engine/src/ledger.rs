//! Per-user, per-asset balance custody. Every primitive runs in its own
//! database transaction and takes a `FOR UPDATE` lock on each balance row it
//! mutates before reading the values it decides with. When two rows are
//! locked together they are locked in ascending user-id order (transfer) or
//! ascending asset order (settlement), never in request order.

use chrono::Utc;
use database::schema::balances;
use database::{Balance, DbConnection, DbPool, NewBalance};
use diesel::prelude::*;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::EngineError;

/// Balance custody service.
pub struct Ledger {
    pool: DbPool,
}

impl Ledger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<DbConnection, EngineError> {
        Ok(self.pool.get()?)
    }

    /// Balance for one user-asset pair.
    pub fn get_balance(&self, user_id: i64, asset: &str) -> Result<Balance, EngineError> {
        let mut conn = self.conn()?;
        balances::table
            .filter(balances::user_id.eq(user_id))
            .filter(balances::asset.eq(asset))
            .first::<Balance>(&mut conn)
            .optional()?
            .ok_or(EngineError::NotFound("balance"))
    }

    /// Every balance row a user owns.
    pub fn get_all_balances(&self, user_id: i64) -> Result<Vec<Balance>, EngineError> {
        let mut conn = self.conn()?;
        Ok(balances::table
            .filter(balances::user_id.eq(user_id))
            .order(balances::asset.asc())
            .load::<Balance>(&mut conn)?)
    }

    /// Paginated listing across all users, for the admin surface.
    pub fn list_balances(&self, page: i64, limit: i64) -> Result<(Vec<Balance>, i64), EngineError> {
        let mut conn = self.conn()?;
        let total: i64 = balances::table.count().get_result(&mut conn)?;
        let rows = balances::table
            .order((balances::user_id.asc(), balances::asset.asc()))
            .limit(limit)
            .offset((page - 1) * limit)
            .load::<Balance>(&mut conn)?;
        Ok((rows, total))
    }

    /// Move `amount` from `available` to `locked`.
    pub fn freeze(&self, user_id: i64, asset: &str, amount: Decimal) -> Result<(), EngineError> {
        check_amount(amount)?;
        let mut conn = self.conn()?;
        conn.transaction::<_, EngineError, _>(|conn| freeze_in_tx(conn, user_id, asset, amount))?;
        info!(user_id, asset, %amount, "balance frozen");
        Ok(())
    }

    /// Move `amount` from `locked` back to `available`.
    pub fn unfreeze(&self, user_id: i64, asset: &str, amount: Decimal) -> Result<(), EngineError> {
        check_amount(amount)?;
        let mut conn = self.conn()?;
        conn.transaction::<_, EngineError, _>(|conn| unfreeze_in_tx(conn, user_id, asset, amount))?;
        info!(user_id, asset, %amount, "balance unfrozen");
        Ok(())
    }

    /// Consume `amount` from `locked`, realizing a reservation.
    pub fn deduct(&self, user_id: i64, asset: &str, amount: Decimal) -> Result<(), EngineError> {
        check_amount(amount)?;
        let mut conn = self.conn()?;
        conn.transaction::<_, EngineError, _>(|conn| {
            deduct_locked_in_tx(conn, user_id, asset, amount)
        })?;
        info!(user_id, asset, %amount, "balance deducted");
        Ok(())
    }

    /// Add `amount` to `available`, creating the balance row when absent.
    pub fn credit(&self, user_id: i64, asset: &str, amount: Decimal) -> Result<(), EngineError> {
        check_amount(amount)?;
        let mut conn = self.conn()?;
        conn.transaction::<_, EngineError, _>(|conn| {
            credit_available_in_tx(conn, user_id, asset, amount)
        })?;
        info!(user_id, asset, %amount, "balance credited");
        Ok(())
    }

    /// Remove `amount` from `available`. Used by the admin adjustment path.
    pub fn debit(&self, user_id: i64, asset: &str, amount: Decimal) -> Result<(), EngineError> {
        check_amount(amount)?;
        let mut conn = self.conn()?;
        conn.transaction::<_, EngineError, _>(|conn| {
            let mut balance = lock_balance(conn, user_id, asset)?;
            if balance.available < amount {
                return Err(EngineError::InsufficientFunds {
                    asset: asset.to_string(),
                    available: balance.available,
                    required: amount,
                });
            }
            balance.available -= amount;
            save_amounts(conn, &balance)?;
            Ok(())
        })?;
        info!(user_id, asset, %amount, "balance debited");
        Ok(())
    }

    /// Move `amount` of `asset` between the available balances of two users.
    pub fn transfer(
        &self,
        from_user_id: i64,
        to_user_id: i64,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), EngineError> {
        check_amount(amount)?;
        if from_user_id == to_user_id {
            return Err(EngineError::InvalidRecipient);
        }

        let mut conn = self.conn()?;
        conn.transaction::<_, EngineError, _>(|conn| {
            // The recipient row may not exist yet; create it before locking
            // so both rows can be locked in ascending user-id order.
            ensure_balance_row(conn, to_user_id, asset)?;

            let (first, second) = if from_user_id < to_user_id {
                (from_user_id, to_user_id)
            } else {
                (to_user_id, from_user_id)
            };
            let first_balance = lock_balance(conn, first, asset)?;
            let second_balance = lock_balance(conn, second, asset)?;

            let (mut from_balance, mut to_balance) = if first == from_user_id {
                (first_balance, second_balance)
            } else {
                (second_balance, first_balance)
            };

            apply_transfer(&mut from_balance, &mut to_balance, amount)?;
            save_amounts(conn, &from_balance)?;
            save_amounts(conn, &to_balance)?;
            Ok(())
        })?;

        info!(from_user_id, to_user_id, asset, %amount, "balance transferred");
        Ok(())
    }
}

fn check_amount(amount: Decimal) -> Result<(), EngineError> {
    if amount <= Decimal::ZERO {
        return Err(EngineError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

/// Select one balance row under a `FOR UPDATE` lock.
pub(crate) fn lock_balance(
    conn: &mut PgConnection,
    user_id: i64,
    asset: &str,
) -> Result<Balance, EngineError> {
    balances::table
        .filter(balances::user_id.eq(user_id))
        .filter(balances::asset.eq(asset))
        .for_update()
        .first::<Balance>(conn)
        .optional()?
        .ok_or(EngineError::NotFound("balance"))
}

/// Insert an empty balance row unless one already exists.
pub(crate) fn ensure_balance_row(
    conn: &mut PgConnection,
    user_id: i64,
    asset: &str,
) -> Result<(), EngineError> {
    diesel::insert_into(balances::table)
        .values(&NewBalance {
            user_id,
            asset: asset.to_string(),
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
        })
        .on_conflict((balances::user_id, balances::asset))
        .do_nothing()
        .execute(conn)?;
    Ok(())
}

pub(crate) fn save_amounts(conn: &mut PgConnection, balance: &Balance) -> Result<(), EngineError> {
    diesel::update(balances::table.find(balance.id))
        .set((
            balances::available.eq(balance.available),
            balances::locked.eq(balance.locked),
            balances::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn freeze_in_tx(
    conn: &mut PgConnection,
    user_id: i64,
    asset: &str,
    amount: Decimal,
) -> Result<(), EngineError> {
    let mut balance = lock_balance(conn, user_id, asset)?;
    apply_freeze(&mut balance, amount)?;
    save_amounts(conn, &balance)
}

pub(crate) fn unfreeze_in_tx(
    conn: &mut PgConnection,
    user_id: i64,
    asset: &str,
    amount: Decimal,
) -> Result<(), EngineError> {
    let mut balance = lock_balance(conn, user_id, asset)?;
    apply_unfreeze(&mut balance, amount)?;
    save_amounts(conn, &balance)
}

pub(crate) fn deduct_locked_in_tx(
    conn: &mut PgConnection,
    user_id: i64,
    asset: &str,
    amount: Decimal,
) -> Result<(), EngineError> {
    let mut balance = lock_balance(conn, user_id, asset)?;
    apply_deduct(&mut balance, amount)?;
    save_amounts(conn, &balance)
}

pub(crate) fn credit_available_in_tx(
    conn: &mut PgConnection,
    user_id: i64,
    asset: &str,
    amount: Decimal,
) -> Result<(), EngineError> {
    ensure_balance_row(conn, user_id, asset)?;
    let mut balance = lock_balance(conn, user_id, asset)?;
    balance.available += amount;
    save_amounts(conn, &balance)
}

// The pure mutations below decide every balance movement. They never clamp:
// a reservation that cannot be honored fails and leaves the row untouched.

pub fn apply_freeze(balance: &mut Balance, amount: Decimal) -> Result<(), EngineError> {
    if balance.available < amount {
        return Err(EngineError::InsufficientFunds {
            asset: balance.asset.clone(),
            available: balance.available,
            required: amount,
        });
    }
    balance.available -= amount;
    balance.locked += amount;
    Ok(())
}

pub fn apply_unfreeze(balance: &mut Balance, amount: Decimal) -> Result<(), EngineError> {
    if balance.locked < amount {
        return Err(EngineError::InsufficientLocked {
            asset: balance.asset.clone(),
            locked: balance.locked,
            required: amount,
        });
    }
    balance.locked -= amount;
    balance.available += amount;
    Ok(())
}

pub fn apply_deduct(balance: &mut Balance, amount: Decimal) -> Result<(), EngineError> {
    if balance.locked < amount {
        return Err(EngineError::InsufficientLocked {
            asset: balance.asset.clone(),
            locked: balance.locked,
            required: amount,
        });
    }
    balance.locked -= amount;
    Ok(())
}

pub fn apply_transfer(
    from: &mut Balance,
    to: &mut Balance,
    amount: Decimal,
) -> Result<(), EngineError> {
    if from.available < amount {
        return Err(EngineError::InsufficientFunds {
            asset: from.asset.clone(),
            available: from.available,
            required: amount,
        });
    }
    from.available -= amount;
    to.available += amount;
    Ok(())
}
