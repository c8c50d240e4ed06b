//! Overdue fine calculation

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{config::BorrowingConfig, models::UserRole};

const MS_PER_DAY: i64 = 86_400_000;

/// Role-dependent grace periods and the daily rate charged after them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinePolicy {
    pub fine_per_day: i64,
    pub student_grace_days: i64,
    pub teacher_grace_days: i64,
    /// Applies to librarians and admins
    pub staff_grace_days: i64,
}

impl Default for FinePolicy {
    fn default() -> Self {
        Self {
            fine_per_day: 10,
            student_grace_days: 1,
            teacher_grace_days: 2,
            staff_grace_days: 0,
        }
    }
}

impl From<&BorrowingConfig> for FinePolicy {
    fn from(config: &BorrowingConfig) -> Self {
        Self {
            fine_per_day: config.fine_per_day,
            student_grace_days: config.student_grace_days,
            teacher_grace_days: config.teacher_grace_days,
            staff_grace_days: config.staff_grace_days,
        }
    }
}

/// Outcome of a fine computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FineAssessment {
    pub fine: i64,
    pub days_late: i64,
    pub grace_period: i64,
}

/// Fine policy as shown to a borrower
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinePolicyInfo {
    pub user_type: UserRole,
    pub grace_period_days: i64,
    pub fine_per_day: i64,
    pub description: String,
}

impl FinePolicy {
    pub fn grace_days(&self, role: UserRole) -> i64 {
        match role {
            UserRole::Teacher => self.teacher_grace_days,
            UserRole::Student => self.student_grace_days,
            UserRole::Librarian | UserRole::Admin => self.staff_grace_days,
        }
    }

    /// Whole days late, rounding any started day up
    pub fn days_late(due_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let ms_late = (now - due_date).num_milliseconds();
        if ms_late <= 0 {
            0
        } else {
            (ms_late + MS_PER_DAY - 1) / MS_PER_DAY
        }
    }

    pub fn assess(&self, due_date: DateTime<Utc>, now: DateTime<Utc>, role: UserRole) -> FineAssessment {
        let days_late = Self::days_late(due_date, now);
        let grace_period = self.grace_days(role);
        let chargeable = (days_late - grace_period).max(0);

        FineAssessment {
            fine: chargeable * self.fine_per_day,
            days_late,
            grace_period,
        }
    }

    pub fn describe(&self, role: UserRole) -> FinePolicyInfo {
        let grace = self.grace_days(role);
        let description = if grace > 0 {
            format!(
                "{}s have a {}-day grace period after the due date, then pay {} per day late.",
                capitalize(role.as_str()),
                grace,
                self.fine_per_day
            )
        } else {
            format!(
                "No grace period: {} per day from the first day after the due date.",
                self.fine_per_day
            )
        };

        FinePolicyInfo {
            user_type: role,
            grace_period_days: grace,
            fine_per_day: self.fine_per_day,
            description,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
