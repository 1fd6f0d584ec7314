//! Record types, closed enums and the positional row mapping.
//!
//! Every record persists as one spreadsheet row with a fixed column order;
//! `to_row`/`from_row` are exact inverses of each other apart from
//! default-filling of blank cells. Interaction logs live inside a single
//! cell as a JSON array string.

use serde::{Deserialize, Deserializer, Serialize};

/// Pipeline position of a lead. No transition order is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    Cold,
    Warm,
    Hot,
    Closed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Cold => "cold",
            LeadStatus::Warm => "warm",
            LeadStatus::Hot => "hot",
            LeadStatus::Closed => "closed",
        }
    }

    /// Lenient parse for sheet cells: unknown or blank text falls back to
    /// the default. Request bodies go through serde instead and reject
    /// unknown variants.
    pub fn from_cell(cell: &str) -> Self {
        match cell {
            "warm" => LeadStatus::Warm,
            "hot" => LeadStatus::Hot,
            "closed" => LeadStatus::Closed,
            _ => LeadStatus::Cold,
        }
    }
}

/// Where the lead came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LeadSource {
    Instagram,
    Facebook,
    Friends,
    #[default]
    Direct,
    Park,
    Beach,
    Mall,
    Referral,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::Instagram => "Instagram",
            LeadSource::Facebook => "Facebook",
            LeadSource::Friends => "Friends",
            LeadSource::Direct => "Direct",
            LeadSource::Park => "Park",
            LeadSource::Beach => "Beach",
            LeadSource::Mall => "Mall",
            LeadSource::Referral => "Referral",
        }
    }

    pub fn from_cell(cell: &str) -> Self {
        match cell {
            "Instagram" => LeadSource::Instagram,
            "Facebook" => LeadSource::Facebook,
            "Friends" => LeadSource::Friends,
            "Park" => LeadSource::Park,
            "Beach" => LeadSource::Beach,
            "Mall" => LeadSource::Mall,
            "Referral" => LeadSource::Referral,
            _ => LeadSource::Direct,
        }
    }
}

/// Kind of interaction recorded in a lead's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    FirstContact,
    Call,
    Whatsapp,
    Visit,
    FreeSession,
    FollowUp,
}

/// Enrollment state of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    #[default]
    Active,
    Inactive,
    Expired,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Inactive => "inactive",
            StudentStatus::Expired => "expired",
        }
    }

    pub fn from_cell(cell: &str) -> Self {
        match cell {
            "inactive" => StudentStatus::Inactive,
            "expired" => StudentStatus::Expired,
            _ => StudentStatus::Active,
        }
    }
}

/// A single interaction with a lead. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Date of the interaction in YYYY-MM-DD format
    pub date: String,

    /// Kind of interaction (call, visit, ...)
    #[serde(rename = "type")]
    pub kind: InteractionType,

    /// Free-text note
    pub note: String,
}

/// Column positions in the Leads sheet (zero-based, range `A..M`).
pub mod lead_col {
    pub const ID: usize = 0;
    pub const CHILD_NAME: usize = 1;
    pub const PARENT_NAME: usize = 2;
    pub const CHILD_AGE: usize = 3;
    pub const PHONE: usize = 4;
    pub const LOCATION: usize = 5;
    pub const SOURCE: usize = 6;
    pub const LOGS: usize = 7;
    pub const STATUS: usize = 8;
    pub const FREE_SESSION: usize = 9;
    pub const NEXT_FOLLOWUP: usize = 10;
    pub const CREATED: usize = 11;
    pub const UPDATED: usize = 12;

    pub const COUNT: usize = 13;
    /// Letter of the last data column, for range strings like `A2:M`.
    pub const LAST: char = 'M';
}

/// Column positions in the Students sheet (zero-based, range `A..K`).
pub mod student_col {
    pub const ID: usize = 0;
    pub const CHILD_NAME: usize = 1;
    pub const PARENT_NAME: usize = 2;
    pub const CHILD_AGE: usize = 3;
    pub const PHONE: usize = 4;
    pub const LOCATION: usize = 5;
    pub const JOINED: usize = 6;
    pub const LEAD_ID: usize = 7;
    pub const STATUS: usize = 8;
    pub const SUBSCRIPTION_TYPE: usize = 9;
    pub const SUBSCRIPTION_END: usize = 10;

    pub const COUNT: usize = 11;
    pub const LAST: char = 'K';
}

/// A prospective enrollment moving through the status pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub lead_id: String,
    pub child_name: String,
    pub parent_name: String,
    pub child_age: u32,
    pub phone: String,
    pub location: String,
    pub lead_source: LeadSource,
    /// Append-only, insertion order significant.
    pub logs: Vec<LogEntry>,
    pub status: LeadStatus,
    #[serde(with = "yes_no")]
    pub free_session: bool,
    /// Next follow-up date (YYYY-MM-DD), if one is scheduled.
    pub next_followup: Option<String>,
    pub created_date: String,
    pub updated_date: String,
}

impl Lead {
    /// Map a sheet row to a lead, filling defaults for blank or absent
    /// cells. Fails only if the logs cell holds malformed JSON.
    pub fn from_row(row: &[String]) -> Result<Self, serde_json::Error> {
        let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");

        let logs = match cell(lead_col::LOGS) {
            "" => Vec::new(),
            raw => serde_json::from_str(raw)?,
        };

        Ok(Self {
            lead_id: cell(lead_col::ID).to_string(),
            child_name: cell(lead_col::CHILD_NAME).to_string(),
            parent_name: cell(lead_col::PARENT_NAME).to_string(),
            child_age: cell(lead_col::CHILD_AGE).parse().unwrap_or(0),
            phone: cell(lead_col::PHONE).to_string(),
            location: cell(lead_col::LOCATION).to_string(),
            lead_source: LeadSource::from_cell(cell(lead_col::SOURCE)),
            logs,
            status: LeadStatus::from_cell(cell(lead_col::STATUS)),
            free_session: cell(lead_col::FREE_SESSION) == "yes",
            next_followup: match cell(lead_col::NEXT_FOLLOWUP) {
                "" => None,
                s => Some(s.to_string()),
            },
            created_date: cell(lead_col::CREATED).to_string(),
            updated_date: cell(lead_col::UPDATED).to_string(),
        })
    }

    /// Map a lead to its sheet row in fixed column order.
    pub fn to_row(&self) -> Result<Vec<String>, serde_json::Error> {
        Ok(vec![
            self.lead_id.clone(),
            self.child_name.clone(),
            self.parent_name.clone(),
            self.child_age.to_string(),
            self.phone.clone(),
            self.location.clone(),
            self.lead_source.as_str().to_string(),
            serde_json::to_string(&self.logs)?,
            self.status.as_str().to_string(),
            if self.free_session { "yes" } else { "no" }.to_string(),
            self.next_followup.clone().unwrap_or_default(),
            self.created_date.clone(),
            self.updated_date.clone(),
        ])
    }
}

/// An enrolled client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    pub child_name: String,
    pub parent_name: String,
    pub child_age: u32,
    pub phone: String,
    pub location: String,
    pub joined_date: String,
    /// Originating lead, if the student converted from one. Lookup only.
    pub lead_id: Option<String>,
    pub status: StudentStatus,
    pub subscription_type: Option<String>,
    pub subscription_end: Option<String>,
}

impl Student {
    pub fn from_row(row: &[String]) -> Self {
        let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");
        let optional = |i: usize| match cell(i) {
            "" => None,
            s => Some(s.to_string()),
        };

        Self {
            student_id: cell(student_col::ID).to_string(),
            child_name: cell(student_col::CHILD_NAME).to_string(),
            parent_name: cell(student_col::PARENT_NAME).to_string(),
            child_age: cell(student_col::CHILD_AGE).parse().unwrap_or(0),
            phone: cell(student_col::PHONE).to_string(),
            location: cell(student_col::LOCATION).to_string(),
            joined_date: cell(student_col::JOINED).to_string(),
            lead_id: optional(student_col::LEAD_ID),
            status: StudentStatus::from_cell(cell(student_col::STATUS)),
            subscription_type: optional(student_col::SUBSCRIPTION_TYPE),
            subscription_end: optional(student_col::SUBSCRIPTION_END),
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.student_id.clone(),
            self.child_name.clone(),
            self.parent_name.clone(),
            self.child_age.to_string(),
            self.phone.clone(),
            self.location.clone(),
            self.joined_date.clone(),
            self.lead_id.clone().unwrap_or_default(),
            self.status.as_str().to_string(),
            self.subscription_type.clone().unwrap_or_default(),
            self.subscription_end.clone().unwrap_or_default(),
        ]
    }
}

/// Partial update for a lead. Every field is optional; present fields
/// overwrite the stored value wholesale (`logs` is replaced, not merged).
/// `next_followup` distinguishes "absent" (keep) from explicit `null`
/// (clear) via the double option.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LeadPatch {
    pub child_name: Option<String>,
    pub parent_name: Option<String>,
    pub child_age: Option<u32>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub lead_source: Option<LeadSource>,
    pub logs: Option<Vec<LogEntry>>,
    pub status: Option<LeadStatus>,
    #[serde(deserialize_with = "yes_no::option")]
    pub free_session: Option<bool>,
    #[serde(deserialize_with = "double_option")]
    pub next_followup: Option<Option<String>>,
}

impl LeadPatch {
    /// Shallow merge over an existing record. The caller stamps
    /// `updated_date`.
    pub fn apply(self, lead: &mut Lead) {
        if let Some(v) = self.child_name {
            lead.child_name = v;
        }
        if let Some(v) = self.parent_name {
            lead.parent_name = v;
        }
        if let Some(v) = self.child_age {
            lead.child_age = v;
        }
        if let Some(v) = self.phone {
            lead.phone = v;
        }
        if let Some(v) = self.location {
            lead.location = v;
        }
        if let Some(v) = self.lead_source {
            lead.lead_source = v;
        }
        if let Some(v) = self.logs {
            lead.logs = v;
        }
        if let Some(v) = self.status {
            lead.status = v;
        }
        if let Some(v) = self.free_session {
            lead.free_session = v;
        }
        if let Some(v) = self.next_followup {
            lead.next_followup = v;
        }
    }
}

/// Partial update for a student, same merge semantics as [`LeadPatch`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StudentPatch {
    pub child_name: Option<String>,
    pub parent_name: Option<String>,
    pub child_age: Option<u32>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub joined_date: Option<String>,
    #[serde(deserialize_with = "double_option")]
    pub lead_id: Option<Option<String>>,
    pub status: Option<StudentStatus>,
    #[serde(deserialize_with = "double_option")]
    pub subscription_type: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub subscription_end: Option<Option<String>>,
}

impl StudentPatch {
    pub fn apply(self, student: &mut Student) {
        if let Some(v) = self.child_name {
            student.child_name = v;
        }
        if let Some(v) = self.parent_name {
            student.parent_name = v;
        }
        if let Some(v) = self.child_age {
            student.child_age = v;
        }
        if let Some(v) = self.phone {
            student.phone = v;
        }
        if let Some(v) = self.location {
            student.location = v;
        }
        if let Some(v) = self.joined_date {
            student.joined_date = v;
        }
        if let Some(v) = self.lead_id {
            student.lead_id = v;
        }
        if let Some(v) = self.status {
            student.status = v;
        }
        if let Some(v) = self.subscription_type {
            student.subscription_type = v;
        }
        if let Some(v) = self.subscription_end {
            student.subscription_end = v;
        }
    }
}

/// Deserialize a field so that an absent key stays `None` while a present
/// key (including explicit `null`) becomes `Some(..)`. Must be combined
/// with `#[serde(default)]`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// The free-session flag travels as `"yes"`/`"no"` on the wire and in the
/// sheet, but is a plain bool in memory.
mod yes_no {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "yes" } else { "no" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match String::deserialize(deserializer)?.as_str() {
            "yes" => Ok(true),
            "no" => Ok(false),
            other => Err(de::Error::invalid_value(
                de::Unexpected::Str(other),
                &"\"yes\" or \"no\"",
            )),
        }
    }

    pub fn option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
        deserialize(deserializer).map(Some)
    }
}
