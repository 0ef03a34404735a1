//! Typed views of source platform records.
//!
//! The platform keys fields by their display labels ("Created Date",
//! "Father Sheet", ...). Every field is optional at this boundary: blank
//! strings and empty lists decode to `None` / `vec![]` through the helpers
//! in [`super::fields`], and the transformers decide which absences are
//! legal.

use super::fields::{id_list, opt_bool, opt_datetime, opt_f64, opt_i64, opt_string};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssociationRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
    #[serde(rename = "Modified Date", default, deserialize_with = "opt_datetime")]
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StackRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(rename = "Association", default, deserialize_with = "opt_string")]
    pub association: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
    #[serde(rename = "Modified Date", default, deserialize_with = "opt_datetime")]
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(rename = "VAT", default, deserialize_with = "opt_string")]
    pub vat: Option<String>,
    #[serde(rename = "Association", default, deserialize_with = "opt_string")]
    pub association: Option<String>,
    #[serde(rename = "Stack", default, deserialize_with = "opt_string")]
    pub stack: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
    #[serde(rename = "Modified Date", default, deserialize_with = "opt_datetime")]
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Email", default, deserialize_with = "opt_string")]
    pub email: Option<String>,
    #[serde(rename = "First Name", default, deserialize_with = "opt_string")]
    pub first_name: Option<String>,
    #[serde(rename = "Last Name", default, deserialize_with = "opt_string")]
    pub last_name: Option<String>,
    #[serde(rename = "Role", default, deserialize_with = "opt_string")]
    pub role: Option<String>,
    #[serde(rename = "Company", default, deserialize_with = "opt_string")]
    pub company: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
    #[serde(rename = "Modified Date", default, deserialize_with = "opt_datetime")]
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(rename = "Company", default, deserialize_with = "opt_string")]
    pub company: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(rename = "Order", default, deserialize_with = "opt_i64")]
    pub order: Option<i64>,
    #[serde(rename = "Company", default, deserialize_with = "opt_string")]
    pub company: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubsectionRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(rename = "Order", default, deserialize_with = "opt_i64")]
    pub order: Option<i64>,
    #[serde(rename = "Section", default, deserialize_with = "opt_string")]
    pub section: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Label", default, deserialize_with = "opt_string")]
    pub label: Option<String>,
    #[serde(rename = "Type", default, deserialize_with = "opt_string")]
    pub kind: Option<String>,
    #[serde(rename = "Order", default, deserialize_with = "opt_i64")]
    pub order: Option<i64>,
    #[serde(rename = "Required", default, deserialize_with = "opt_bool")]
    pub required: Option<bool>,
    #[serde(rename = "Subsection", default, deserialize_with = "opt_string")]
    pub subsection: Option<String>,
    #[serde(rename = "Tags", default, deserialize_with = "id_list")]
    pub tags: Vec<String>,
    #[serde(rename = "Companies", default, deserialize_with = "id_list")]
    pub companies: Vec<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Label", default, deserialize_with = "opt_string")]
    pub label: Option<String>,
    #[serde(rename = "Order", default, deserialize_with = "opt_i64")]
    pub order: Option<i64>,
    #[serde(rename = "Question", default, deserialize_with = "opt_string")]
    pub question: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTableRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(rename = "Question", default, deserialize_with = "opt_string")]
    pub question: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTableColumnRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(rename = "Type", default, deserialize_with = "opt_string")]
    pub kind: Option<String>,
    #[serde(rename = "Order", default, deserialize_with = "opt_i64")]
    pub order: Option<i64>,
    #[serde(rename = "List Table", default, deserialize_with = "opt_string")]
    pub list_table: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTableRowRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Label", default, deserialize_with = "opt_string")]
    pub label: Option<String>,
    #[serde(rename = "Order", default, deserialize_with = "opt_i64")]
    pub order: Option<i64>,
    #[serde(rename = "List Table", default, deserialize_with = "opt_string")]
    pub list_table: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SheetRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(rename = "Status", default, deserialize_with = "opt_string")]
    pub status: Option<String>,
    #[serde(rename = "Version", default, deserialize_with = "opt_i64")]
    pub version: Option<i64>,
    #[serde(rename = "Company", default, deserialize_with = "opt_string")]
    pub company: Option<String>,
    #[serde(rename = "Assigned Company", default, deserialize_with = "opt_string")]
    pub assigned_company: Option<String>,
    #[serde(rename = "Father Sheet", default, deserialize_with = "opt_string")]
    pub father_sheet: Option<String>,
    #[serde(rename = "Previous Sheet", default, deserialize_with = "opt_string")]
    pub previous_sheet: Option<String>,
    #[serde(rename = "Tags", default, deserialize_with = "id_list")]
    pub tags: Vec<String>,
    #[serde(rename = "Shareable With", default, deserialize_with = "id_list")]
    pub shareable_with: Vec<String>,
    #[serde(rename = "Assigned Users", default, deserialize_with = "id_list")]
    pub assigned_users: Vec<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
    #[serde(rename = "Modified Date", default, deserialize_with = "opt_datetime")]
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChemicalRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(rename = "CAS Number", default, deserialize_with = "opt_string")]
    pub cas_number: Option<String>,
    #[serde(rename = "Concentration", default, deserialize_with = "opt_f64")]
    pub concentration: Option<f64>,
    #[serde(rename = "Sheet", default, deserialize_with = "opt_string")]
    pub sheet: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerRecord {
    #[serde(rename = "_id", default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    /// Free-form answer value; split into typed columns by the transformer.
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
    #[serde(rename = "Sheet", default, deserialize_with = "opt_string")]
    pub sheet: Option<String>,
    #[serde(rename = "Question", default, deserialize_with = "opt_string")]
    pub question: Option<String>,
    #[serde(rename = "Choice", default, deserialize_with = "opt_string")]
    pub choice: Option<String>,
    #[serde(rename = "List Table Row", default, deserialize_with = "opt_string")]
    pub list_table_row: Option<String>,
    #[serde(rename = "List Table Column", default, deserialize_with = "opt_string")]
    pub list_table_column: Option<String>,
    #[serde(rename = "Created Date", default, deserialize_with = "opt_datetime")]
    pub created: Option<DateTime<Utc>>,
    #[serde(rename = "Modified Date", default, deserialize_with = "opt_datetime")]
    pub modified: Option<DateTime<Utc>>,
}
