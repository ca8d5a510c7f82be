//! Per-account usage records: total amount banked and the daily streak.
//!
//! Records are kept only in the local [KeyValueStore] and are never reconciled with the chain, so they can drift from
//! on-chain truth if the same account banks from elsewhere.

use std::fmt;

use alloy::primitives::{Address, U256, utils::format_ether};

use crate::{
    storage::{KeyValueStore, StorageError},
    streak,
};

const KEY_PREFIX: &str = "send2bank";
const TOTAL_SENT: &str = "totalSent";
const STREAK: &str = "streak";
const LAST_DAY: &str = "lastDay";

/// What a usage record is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageScope {
    Account(Address),
    ChainAccount { chain_id: u64, account: Address },
}

impl UsageScope {
    pub fn new(chain_id: u64, account: Address, per_chain: bool) -> Self {
        if per_chain {
            UsageScope::ChainAccount { chain_id, account }
        } else {
            UsageScope::Account(account)
        }
    }

    fn key(&self, field: &str) -> String {
        // Addresses are lowercased so checksummed and plain spellings share a record.
        match self {
            UsageScope::Account(account) => {
                format!("{KEY_PREFIX}:{}:{field}", lower_hex(account))
            }
            UsageScope::ChainAccount { chain_id, account } => {
                format!("{KEY_PREFIX}:{chain_id}:{}:{field}", lower_hex(account))
            }
        }
    }
}

fn lower_hex(account: &Address) -> String {
    format!("{account:#x}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageRecord {
    /// Total banked, in wei.
    pub total_sent: U256,
    /// Streak as of `last_banked_day`.
    pub streak_days: u32,
    pub last_banked_day: Option<i64>,
}

impl UsageRecord {
    /// Read the record for `scope`. Missing or unparsable values read as empty.
    pub fn load(store: &impl KeyValueStore, scope: &UsageScope) -> Self {
        let total_sent = store
            .get(&scope.key(TOTAL_SENT))
            .and_then(|v| U256::from_str_radix(v.trim(), 10).ok())
            .unwrap_or_default();
        let streak_days = store
            .get(&scope.key(STREAK))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default();
        let last_banked_day = store
            .get(&scope.key(LAST_DAY))
            .and_then(|v| v.trim().parse().ok());
        UsageRecord {
            total_sent,
            streak_days,
            last_banked_day,
        }
    }

    pub fn save(
        &self,
        store: &mut impl KeyValueStore,
        scope: &UsageScope,
    ) -> Result<(), StorageError> {
        let (total_key, streak_key, day_key) = (
            scope.key(TOTAL_SENT),
            scope.key(STREAK),
            scope.key(LAST_DAY),
        );
        let total_sent = self.total_sent.to_string();
        let streak_days = self.streak_days.to_string();
        let last_day = self.last_banked_day.map(|day| day.to_string());
        store.write(&[
            (total_key.as_str(), Some(total_sent.as_str())),
            (streak_key.as_str(), Some(streak_days.as_str())),
            (day_key.as_str(), last_day.as_deref()),
        ])
    }

    /// The record after banking `amount` on `today`.
    pub fn banked(&self, amount: U256, today: i64) -> Self {
        UsageRecord {
            total_sent: self.total_sent.saturating_add(amount),
            streak_days: streak::next_streak(today, self.last_banked_day, self.streak_days),
            last_banked_day: Some(today),
        }
    }

    /// The streak to show on `today`; zero once it has lapsed.
    pub fn current_streak(&self, today: i64) -> u32 {
        streak::current_streak(today, self.last_banked_day, self.streak_days)
    }

    pub fn display(&self, today: i64, symbol: &str) -> UsageDisplay<'_> {
        UsageDisplay {
            record: self,
            today,
            symbol: symbol.to_owned(),
        }
    }
}

/// Load, update and store the record for `scope` after a confirmed bank of `amount`.
pub fn record_bank(
    store: &mut impl KeyValueStore,
    scope: &UsageScope,
    amount: U256,
    today: i64,
) -> Result<UsageRecord, StorageError> {
    let updated = UsageRecord::load(store, scope).banked(amount, today);
    updated.save(store, scope)?;
    Ok(updated)
}

pub struct UsageDisplay<'a> {
    record: &'a UsageRecord,
    today: i64,
    symbol: String,
}

impl fmt::Display for UsageDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let streak = self.record.current_streak(self.today);
        write!(
            f,
            "Total sent: {} {} | Streak: {streak} day{}",
            format_ether(self.record.total_sent),
            self.symbol,
            if streak == 1 { "" } else { "s" }
        )?;
        if let Some(date) = self
            .record
            .last_banked_day
            .and_then(crate::time::date_of_day)
        {
            write!(f, " | Last banked: {date}")?;
        }
        Ok(())
    }
}
