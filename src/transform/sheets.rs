//! Sheets and the data hanging off them: chemicals and answers.
//!
//! Father/previous sheet links are deliberately absent from the sheet row;
//! they point at sheets that may not exist yet and are written by the
//! lineage pass once every sheet has an id.

use super::{
    Reference, Resolved, SHEET_ASSIGNED_USERS, SHEET_SHAREABLE_COMPANIES, SHEET_TAGS,
    Transformed, Transformer, required_field,
};
use crate::error::RecordError;
use crate::source::fields::{parse_number, value_to_bool};
use crate::source::records::{AnswerRecord, ChemicalRecord, SheetRecord};
use crate::types::{EntityType, Row};
use serde_json::Value;

pub struct SheetTransformer;

impl Transformer for SheetTransformer {
    type Record = SheetRecord;

    fn entity(&self) -> EntityType {
        EntityType::Sheet
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::Company, EntityType::User, EntityType::Tag]
    }

    fn source_id<'a>(&self, record: &'a SheetRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a SheetRecord) -> Option<&'a str> {
        record.company.as_deref()
    }

    fn references(&self, record: &SheetRecord) -> Vec<Reference> {
        vec![
            Reference::required("company_id", EntityType::Company, record.company.as_deref()),
            Reference::optional(
                "assigned_company_id",
                EntityType::Company,
                record.assigned_company.as_deref(),
            ),
            Reference::many(SHEET_TAGS, EntityType::Tag, &record.tags),
            Reference::many(
                SHEET_SHAREABLE_COMPANIES,
                EntityType::Company,
                &record.shareable_with,
            ),
            Reference::many(SHEET_ASSIGNED_USERS, EntityType::User, &record.assigned_users),
        ]
    }

    fn build(&self, record: &SheetRecord, resolved: &Resolved) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let name = required_field(&record.name, source_id, "name")?;
        let status = record
            .status
            .as_deref()
            .map(|s| s.trim().to_lowercase().replace([' ', '-'], "_"));
        let row = Row::new(source_id)
            .set("name", name)
            .set("status", status)
            .set("version", record.version)
            .set("company_id", resolved.require("company_id")?)
            .set("assigned_company_id", resolved.id("assigned_company_id"))
            .set("created_at", record.created)
            .set("modified_at", record.modified.or(record.created));
        Ok(Transformed::new(row)
            .link(SHEET_TAGS, resolved.ids(SHEET_TAGS.table))
            .link(
                SHEET_SHAREABLE_COMPANIES,
                resolved.ids(SHEET_SHAREABLE_COMPANIES.table),
            )
            .link(SHEET_ASSIGNED_USERS, resolved.ids(SHEET_ASSIGNED_USERS.table)))
    }
}

pub struct ChemicalTransformer;

impl Transformer for ChemicalTransformer {
    type Record = ChemicalRecord;

    fn entity(&self) -> EntityType {
        EntityType::Chemical
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::Sheet]
    }

    fn source_id<'a>(&self, record: &'a ChemicalRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a ChemicalRecord) -> Option<&'a str> {
        record.sheet.as_deref()
    }

    fn references(&self, record: &ChemicalRecord) -> Vec<Reference> {
        vec![Reference::required(
            "sheet_id",
            EntityType::Sheet,
            record.sheet.as_deref(),
        )]
    }

    fn build(&self, record: &ChemicalRecord, resolved: &Resolved) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let name = required_field(&record.name, source_id, "name")?;
        Ok(Transformed::new(
            Row::new(source_id)
                .set("name", name)
                .set("cas_number", record.cas_number.as_deref())
                .set("concentration", record.concentration)
                .set("sheet_id", resolved.require("sheet_id")?)
                .set("created_at", record.created),
        ))
    }
}

/// Typed columns of a free-form answer value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerValue {
    pub text: Option<String>,
    pub number: Option<f64>,
    pub boolean: Option<bool>,
}

/// Split a raw answer value into text, number and boolean columns.
///
/// Strings keep their trimmed text and additionally fill the number or
/// boolean column when they parse as one. Lists are joined with `"; "`.
pub fn split_answer_value(value: Option<&Value>) -> AnswerValue {
    match value {
        None | Some(Value::Null) => AnswerValue::default(),
        Some(Value::Bool(b)) => AnswerValue {
            boolean: Some(*b),
            ..Default::default()
        },
        Some(Value::Number(n)) => AnswerValue {
            number: n.as_f64(),
            ..Default::default()
        },
        Some(Value::String(s)) => {
            let text = s.trim();
            if text.is_empty() {
                return AnswerValue::default();
            }
            let number = parse_number(text);
            let boolean = if number.is_none() {
                value_to_bool(&Value::String(text.to_string()))
            } else {
                None
            };
            AnswerValue {
                text: Some(text.to_string()),
                number,
                boolean,
            }
        }
        Some(Value::Array(items)) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(crate::source::fields::value_to_string)
                .collect();
            AnswerValue {
                text: (!parts.is_empty()).then(|| parts.join("; ")),
                ..Default::default()
            }
        }
        Some(other @ Value::Object(_)) => AnswerValue {
            text: Some(other.to_string()),
            ..Default::default()
        },
    }
}

pub struct AnswerTransformer;

impl Transformer for AnswerTransformer {
    type Record = AnswerRecord;

    fn entity(&self) -> EntityType {
        EntityType::Answer
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[
            EntityType::Question,
            EntityType::Choice,
            EntityType::ListTableColumn,
            EntityType::ListTableRow,
            EntityType::Sheet,
        ]
    }

    fn source_id<'a>(&self, record: &'a AnswerRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a AnswerRecord) -> Option<&'a str> {
        record.sheet.as_deref()
    }

    fn references(&self, record: &AnswerRecord) -> Vec<Reference> {
        vec![
            Reference::required("sheet_id", EntityType::Sheet, record.sheet.as_deref()),
            Reference::required("question_id", EntityType::Question, record.question.as_deref()),
            Reference::optional("choice_id", EntityType::Choice, record.choice.as_deref()),
            Reference::optional(
                "list_table_row_id",
                EntityType::ListTableRow,
                record.list_table_row.as_deref(),
            ),
            Reference::optional(
                "list_table_column_id",
                EntityType::ListTableColumn,
                record.list_table_column.as_deref(),
            ),
        ]
    }

    fn build(&self, record: &AnswerRecord, resolved: &Resolved) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let value = split_answer_value(record.value.as_ref());
        Ok(Transformed::new(
            Row::new(source_id)
                .set("value_text", value.text)
                .set("value_number", value.number)
                .set("value_bool", value.boolean)
                .set("sheet_id", resolved.require("sheet_id")?)
                .set("question_id", resolved.require("question_id")?)
                .set("choice_id", resolved.id("choice_id"))
                .set("list_table_row_id", resolved.id("list_table_row_id"))
                .set("list_table_column_id", resolved.id("list_table_column_id"))
                .set("created_at", record.created)
                .set("modified_at", record.modified),
        ))
    }
}
