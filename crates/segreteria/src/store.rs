//! Record services over the sheets adapter: ID generation, CRUD and the
//! interaction log append.
//!
//! Every mutation is a read-modify-write against the full row set with no
//! locking or version tokens; two concurrent creates can mint the same id
//! and concurrent updates can overwrite each other from a stale snapshot.
//! Known defect, inherited from the system this replaces.

use std::sync::Arc;
use tracing::info;

use crate::error::{Error, Result};
use crate::sheets::RowStore;
use crate::types::{
    InteractionType, Lead, LeadPatch, LeadSource, LeadStatus, LogEntry, Student, StudentPatch,
    StudentStatus,
};

/// Derive the next sequential identifier from the existing set: strip the
/// prefix, parse the remainder as base 10 (ignoring anything unparsable),
/// take the maximum (empty set counts as 0), add one, zero-pad to three
/// digits. An empty set therefore always yields `{prefix}001`.
pub fn next_id(existing: &[String], prefix: &str) -> String {
    let max = existing
        .iter()
        .filter_map(|id| id.strip_prefix(prefix))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .unwrap_or(0);

    format!("{prefix}{:03}", max + 1)
}

/// Today's date in the server's local calendar, `YYYY-MM-DD`.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Client-supplied fields for a new lead; everything else is assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub child_name: String,
    pub parent_name: String,
    pub child_age: u32,
    pub phone: String,
    pub location: String,
    pub lead_source: LeadSource,
}

/// Client-supplied fields for a new student.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub child_name: String,
    pub parent_name: String,
    pub child_age: u32,
    pub phone: String,
    pub location: String,
    /// Defaults to today when omitted.
    pub joined_date: Option<String>,
    /// Back-reference to the originating lead, if any.
    pub lead_id: Option<String>,
}

/// Lead operations on top of an injected [`RowStore`].
pub struct LeadStore {
    sheet: Arc<dyn RowStore>,
}

impl LeadStore {
    pub fn new(sheet: Arc<dyn RowStore>) -> Self {
        Self { sheet }
    }

    /// Every lead in storage order, no filtering.
    pub async fn all(&self) -> Result<Vec<Lead>> {
        let rows = self.sheet.rows().await?;
        rows.iter()
            .map(|row| Lead::from_row(row).map_err(Error::from))
            .collect()
    }

    /// Linear scan by identifier.
    pub async fn get(&self, id: &str) -> Result<Lead> {
        self.all()
            .await?
            .into_iter()
            .find(|lead| lead.lead_id == id)
            .ok_or(Error::NotFound("Lead"))
    }

    pub async fn create(&self, new: NewLead) -> Result<Lead> {
        let existing: Vec<String> = self
            .all()
            .await?
            .into_iter()
            .map(|lead| lead.lead_id)
            .collect();
        let today = today();

        let lead = Lead {
            lead_id: next_id(&existing, "L"),
            child_name: new.child_name,
            parent_name: new.parent_name,
            child_age: new.child_age,
            phone: new.phone,
            location: new.location,
            lead_source: new.lead_source,
            logs: Vec::new(),
            status: LeadStatus::Cold,
            free_session: false,
            next_followup: None,
            created_date: today.clone(),
            updated_date: today,
        };

        self.sheet.append(lead.to_row()?).await?;
        info!(id = %lead.lead_id, "Created lead");
        Ok(lead)
    }

    /// Shallow-merge `patch` over the stored record and rewrite its row in
    /// place, stamping `updated_date` with today.
    pub async fn update(&self, id: &str, patch: LeadPatch) -> Result<Lead> {
        let leads = self.all().await?;
        let index = leads
            .iter()
            .position(|lead| lead.lead_id == id)
            .ok_or(Error::NotFound("Lead"))?;

        let mut lead = leads[index].clone();
        patch.apply(&mut lead);
        lead.updated_date = today();

        self.sheet.update(index, lead.to_row()?).await?;
        info!(id = %lead.lead_id, "Updated lead");
        Ok(lead)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let leads = self.all().await?;
        let index = leads
            .iter()
            .position(|lead| lead.lead_id == id)
            .ok_or(Error::NotFound("Lead"))?;

        self.sheet.delete(index).await?;
        info!(id, "Deleted lead");
        Ok(())
    }

    /// Append one interaction dated today. The outer option on
    /// `next_followup` separates "not supplied, keep the prior value"
    /// (`None`) from an explicit set or clear (`Some(..)`).
    pub async fn add_log(
        &self,
        id: &str,
        kind: InteractionType,
        note: String,
        next_followup: Option<Option<String>>,
    ) -> Result<Lead> {
        let lead = self.get(id).await?;

        let mut logs = lead.logs;
        logs.push(LogEntry {
            date: today(),
            kind,
            note,
        });

        let patch = LeadPatch {
            logs: Some(logs),
            next_followup,
            ..LeadPatch::default()
        };

        self.update(id, patch).await
    }
}

/// Student operations, same shape as [`LeadStore`].
pub struct StudentStore {
    sheet: Arc<dyn RowStore>,
}

impl StudentStore {
    pub fn new(sheet: Arc<dyn RowStore>) -> Self {
        Self { sheet }
    }

    pub async fn all(&self) -> Result<Vec<Student>> {
        let rows = self.sheet.rows().await?;
        Ok(rows.iter().map(|row| Student::from_row(row)).collect())
    }

    pub async fn get(&self, id: &str) -> Result<Student> {
        self.all()
            .await?
            .into_iter()
            .find(|student| student.student_id == id)
            .ok_or(Error::NotFound("Student"))
    }

    pub async fn create(&self, new: NewStudent) -> Result<Student> {
        let existing: Vec<String> = self
            .all()
            .await?
            .into_iter()
            .map(|student| student.student_id)
            .collect();

        let student = Student {
            student_id: next_id(&existing, "S"),
            child_name: new.child_name,
            parent_name: new.parent_name,
            child_age: new.child_age,
            phone: new.phone,
            location: new.location,
            joined_date: new.joined_date.unwrap_or_else(today),
            lead_id: new.lead_id,
            status: StudentStatus::Active,
            subscription_type: None,
            subscription_end: None,
        };

        self.sheet.append(student.to_row()).await?;
        info!(id = %student.student_id, "Created student");
        Ok(student)
    }

    pub async fn update(&self, id: &str, patch: StudentPatch) -> Result<Student> {
        let students = self.all().await?;
        let index = students
            .iter()
            .position(|student| student.student_id == id)
            .ok_or(Error::NotFound("Student"))?;

        let mut student = students[index].clone();
        patch.apply(&mut student);

        self.sheet.update(index, student.to_row()).await?;
        info!(id = %student.student_id, "Updated student");
        Ok(student)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let students = self.all().await?;
        let index = students
            .iter()
            .position(|student| student.student_id == id)
            .ok_or(Error::NotFound("Student"))?;

        self.sheet.delete(index).await?;
        info!(id, "Deleted student");
        Ok(())
    }
}
