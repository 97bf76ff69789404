//! Daily task quota for users translating on the platform key.
//!
//! Users with their own provider key are never limited. Everyone else may
//! create `daily_tasks` tasks per UTC day.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::config::FreeTierLimits;
use crate::error::StoreError;
use crate::store::TaskStore;

/// A user's usage for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub date: NaiveDate,
    pub count: u32,
    /// `None` means unlimited.
    pub limit: Option<u32>,
    pub has_api_key: bool,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn TaskStore>,
    limits: Option<FreeTierLimits>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn TaskStore>, limits: Option<FreeTierLimits>) -> Self {
        Self { store, limits }
    }

    /// Count one new task against the user. Returns false when the user is
    /// over today's quota, in which case nothing is counted.
    pub async fn try_acquire(&self, user_id: &str) -> Result<bool, StoreError> {
        self.try_acquire_on(user_id, today()).await
    }

    pub async fn usage(&self, user_id: &str) -> Result<UsageReport, StoreError> {
        self.usage_on(user_id, today()).await
    }

    async fn try_acquire_on(&self, user_id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let Some(limits) = self.limits else {
            return Ok(true);
        };
        if self.store.api_key_for_user(user_id).await?.is_some() {
            return Ok(true);
        }
        let count = self
            .store
            .try_increment_usage(user_id, date, limits.daily_tasks)
            .await?;
        Ok(count.is_some())
    }

    async fn usage_on(&self, user_id: &str, date: NaiveDate) -> Result<UsageReport, StoreError> {
        let has_api_key = self.store.api_key_for_user(user_id).await?.is_some();
        let limit = match self.limits {
            Some(limits) if !has_api_key => Some(limits.daily_tasks),
            _ => None,
        };
        Ok(UsageReport {
            date,
            count: self.store.daily_usage(user_id, date).await?,
            limit,
            has_api_key,
        })
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
