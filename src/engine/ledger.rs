//! Wallet ledger.
//!
//! All financial operations go through here. Every read-modify-write on a
//! wallet runs under an async mutex scoped to that user, so two bets by
//! the same user, or a bet racing a payout credit, can never lose an
//! update. Wallets are created lazily on first financial contact.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::store::Repository;
use crate::types::{Bet, NewBet, PaddockError, RaceId, RacerId, Result, UserId, Wallet};

pub struct Ledger {
    repo: Arc<dyn Repository>,
    /// One async mutex per user, handed out on demand and held for the
    /// whole critical section of a financial operation.
    locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Ledger {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn user_lock(&self, user_id: UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Fetch a user's wallet, creating it with `default_balance` on first
    /// contact.
    pub async fn get_or_create_wallet(
        &self,
        user_id: UserId,
        default_balance: i64,
    ) -> Result<Wallet> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.get_or_create_locked(user_id, default_balance).await
    }

    /// Current balance. Fails with `WalletNotFound` for users the ledger
    /// has never seen.
    pub async fn balance(&self, user_id: UserId) -> Result<i64> {
        self.repo
            .wallet(user_id)
            .await?
            .map(|w| w.balance)
            .ok_or(PaddockError::WalletNotFound(user_id))
    }

    /// Credit coins to a wallet, creating an empty one if needed.
    pub async fn credit(&self, user_id: UserId, amount: i64) -> Result<Wallet> {
        if amount <= 0 {
            return Err(PaddockError::InvalidAmount(amount));
        }
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let wallet = self.get_or_create_locked(user_id, 0).await?;
        let updated = self
            .repo
            .upsert_wallet(user_id, wallet.balance + amount)
            .await?;
        debug!(user_id, amount, balance = updated.balance, "Wallet credited");
        Ok(updated)
    }

    /// Debit coins from a wallet. Fails with `InsufficientFunds` rather
    /// than letting the balance go negative.
    pub async fn debit(&self, user_id: UserId, amount: i64) -> Result<Wallet> {
        if amount <= 0 {
            return Err(PaddockError::InvalidAmount(amount));
        }
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let wallet = self
            .repo
            .wallet(user_id)
            .await?
            .ok_or(PaddockError::WalletNotFound(user_id))?;
        if amount > wallet.balance {
            return Err(PaddockError::InsufficientFunds {
                needed: amount,
                available: wallet.balance,
            });
        }
        let updated = self
            .repo
            .upsert_wallet(user_id, wallet.balance - amount)
            .await?;
        debug!(user_id, amount, balance = updated.balance, "Wallet debited");
        Ok(updated)
    }

    /// Place a bet with refund-and-replace semantics.
    ///
    /// A user holds at most one bet per race: any existing bet is fully
    /// refunded before the new amount is checked against the balance, and
    /// the whole sequence runs inside one per-wallet critical section. On
    /// rejection nothing has been written — the prior bet and balance are
    /// untouched.
    pub async fn place_bet(
        &self,
        user_id: UserId,
        race_id: RaceId,
        racer_id: RacerId,
        amount: i64,
        default_balance: i64,
    ) -> Result<Bet> {
        if amount <= 0 {
            return Err(PaddockError::InvalidAmount(amount));
        }
        let race = self
            .repo
            .race(race_id)
            .await?
            .ok_or(PaddockError::RaceNotFound(race_id))?;
        // A settled race is no longer biddable; from the bettor's side it
        // is the same as there being no such race.
        if race.finished {
            return Err(PaddockError::RaceNotFound(race_id));
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let wallet = self.get_or_create_locked(user_id, default_balance).await?;
        let existing = self
            .repo
            .bets_by_race(race_id)
            .await?
            .into_iter()
            .find(|b| b.user_id == user_id);

        let refunded_balance = wallet.balance + existing.as_ref().map_or(0, |b| b.amount);
        if amount > refunded_balance {
            return Err(PaddockError::InsufficientFunds {
                needed: amount,
                available: refunded_balance,
            });
        }

        // Checks passed; commit the swap.
        if let Some(old) = &existing {
            self.repo.delete_bet(old.id).await?;
        }
        self.repo
            .upsert_wallet(user_id, refunded_balance - amount)
            .await?;
        let bet = self
            .repo
            .create_bet(NewBet {
                race_id,
                user_id,
                racer_id,
                amount,
            })
            .await?;

        info!(
            user_id,
            race_id,
            racer_id,
            amount,
            replaced = existing.is_some(),
            balance = refunded_balance - amount,
            "Bet placed"
        );
        Ok(bet)
    }

    /// Wallet read-or-create for callers already holding the user's lock.
    async fn get_or_create_locked(&self, user_id: UserId, default_balance: i64) -> Result<Wallet> {
        match self.repo.wallet(user_id).await? {
            Some(wallet) => Ok(wallet),
            None => {
                info!(user_id, default_balance, "Creating wallet");
                self.repo.upsert_wallet(user_id, default_balance).await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
