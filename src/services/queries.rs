//! Read-only borrow listings, each view computing its live fine

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{
    clock::Clock,
    fines::{FinePolicy, FinePolicyInfo},
};
use crate::{
    config::BorrowingConfig,
    error::{AppError, AppResult},
    models::{
        borrow::{BorrowFilter, BorrowPage, BorrowQuery, BorrowRecord, BorrowStatus, BorrowView},
        UserRole,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct QueryService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    policy: FinePolicy,
    default_page_size: i64,
    max_page_size: i64,
}

impl QueryService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, config: &BorrowingConfig) -> Self {
        Self {
            repository,
            clock,
            policy: FinePolicy::from(config),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Staff listing over all records
    pub async fn list(&self, query: &BorrowQuery) -> AppResult<BorrowPage> {
        let filter = BorrowFilter {
            search: query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            status: query.status,
            user_type: query.user_type,
            user_id: None,
            sort: query.sort.unwrap_or_default(),
        };
        self.page(&filter, query.page, query.limit).await
    }

    /// The user's current pending or borrowed record
    pub async fn my_borrow(&self, user_id: i32) -> AppResult<Option<BorrowView>> {
        let now = self.clock.now();
        Ok(self
            .repository
            .records
            .find_active_for_user(user_id)
            .await?
            .map(|record| self.view(record, now)))
    }

    /// The user's full history, most recent first
    pub async fn my_requests(
        &self,
        user_id: i32,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> AppResult<BorrowPage> {
        let filter = BorrowFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        self.page(&filter, page, limit).await
    }

    pub fn fine_policy(&self, role: UserRole) -> FinePolicyInfo {
        self.policy.describe(role)
    }

    /// Decorate a record with the fine owed as of `now`
    pub fn view(&self, record: BorrowRecord, now: DateTime<Utc>) -> BorrowView {
        match record.status {
            BorrowStatus::Borrowed => {
                let assessment = self.policy.assess(record.due_date, now, record.user_type);
                BorrowView {
                    live_fine: assessment.fine,
                    days_late: assessment.days_late,
                    is_overdue: assessment.days_late > 0,
                    record,
                }
            }
            BorrowStatus::Returned => {
                let days_late = record
                    .returned_at
                    .map(|at| FinePolicy::days_late(record.due_date, at))
                    .unwrap_or(0);
                BorrowView {
                    live_fine: record.fine,
                    days_late,
                    is_overdue: false,
                    record,
                }
            }
            BorrowStatus::Pending | BorrowStatus::Rejected => BorrowView {
                live_fine: 0,
                days_late: 0,
                is_overdue: false,
                record,
            },
        }
    }

    async fn page(
        &self,
        filter: &BorrowFilter,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> AppResult<BorrowPage> {
        let (page, limit) = self.pagination(page, limit)?;
        let (records, total) = self
            .repository
            .records
            .list_filtered(filter, page, limit)
            .await?;

        let now = self.clock.now();
        Ok(BorrowPage {
            items: records.into_iter().map(|r| self.view(r, now)).collect(),
            total,
            page,
            limit,
        })
    }

    fn pagination(&self, page: Option<i64>, limit: Option<i64>) -> AppResult<(i64, i64)> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(self.default_page_size);
        if page < 1 || limit < 1 {
            return Err(AppError::Validation(
                "page and limit must be at least 1".to_string(),
            ));
        }
        let limit = limit.min(self.max_page_size);
        if (page - 1).checked_mul(limit).is_none() {
            return Err(AppError::Validation("page is out of range".to_string()));
        }
        Ok((page, limit))
    }
}
