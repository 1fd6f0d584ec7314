//! Dashboard aggregation: pure functions over already-fetched collections.

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{Lead, LeadStatus, Student, StudentStatus};

/// Widget preview lists show at most this many records.
const PREVIEW_LIMIT: usize = 5;

/// The four headline counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_leads: usize,
    pub hot_leads: usize,
    pub today_followups: usize,
    pub active_students: usize,
}

/// Stats plus the two preview lists served to the dashboard page.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub stats: Stats,
    pub today_followups: Vec<Lead>,
    pub hot_leads: Vec<Lead>,
}

/// A lead is due today when its follow-up date parses to `today` and the
/// lead has not been closed.
fn is_due_today(lead: &Lead, today: NaiveDate) -> bool {
    if lead.status == LeadStatus::Closed {
        return false;
    }
    match &lead.next_followup {
        Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(|parsed| parsed == today)
            .unwrap_or(false),
        None => false,
    }
}

pub fn stats(leads: &[Lead], students: &[Student], today: NaiveDate) -> Stats {
    Stats {
        total_leads: leads.len(),
        hot_leads: leads
            .iter()
            .filter(|lead| lead.status == LeadStatus::Hot)
            .count(),
        today_followups: leads.iter().filter(|lead| is_due_today(lead, today)).count(),
        active_students: students
            .iter()
            .filter(|student| student.status == StudentStatus::Active)
            .count(),
    }
}

/// First five due-today leads in storage order. Deliberately unsorted: the
/// widgets show a prefix of the filtered collection, not a recency ranking.
pub fn today_followup_preview(leads: &[Lead], today: NaiveDate) -> Vec<Lead> {
    leads
        .iter()
        .filter(|lead| is_due_today(lead, today))
        .take(PREVIEW_LIMIT)
        .cloned()
        .collect()
}

/// First five hot leads in storage order.
pub fn hot_lead_preview(leads: &[Lead]) -> Vec<Lead> {
    leads
        .iter()
        .filter(|lead| lead.status == LeadStatus::Hot)
        .take(PREVIEW_LIMIT)
        .cloned()
        .collect()
}

pub fn build(leads: &[Lead], students: &[Student], today: NaiveDate) -> Dashboard {
    Dashboard {
        stats: stats(leads, students, today),
        today_followups: today_followup_preview(leads, today),
        hot_leads: hot_lead_preview(leads),
    }
}
