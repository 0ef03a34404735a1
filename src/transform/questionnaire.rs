//! Questionnaire structure: sections down to list table rows and columns.

use super::{
    QUESTION_COMPANIES, QUESTION_TAGS, Reference, Resolved, Transformed, Transformer,
    required_field,
};
use crate::error::RecordError;
use crate::source::records::{
    ChoiceRecord, ListTableColumnRecord, ListTableRecord, ListTableRowRecord, QuestionRecord,
    SectionRecord, SubsectionRecord,
};
use crate::types::{EntityType, Row};

/// Question and column types are stored as lowercase snake case.
fn normalize_kind(kind: Option<&str>) -> Option<String> {
    kind.map(|k| k.trim().to_lowercase().replace([' ', '-'], "_"))
}

pub struct SectionTransformer;

impl Transformer for SectionTransformer {
    type Record = SectionRecord;

    fn entity(&self) -> EntityType {
        EntityType::Section
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::Company]
    }

    fn source_id<'a>(&self, record: &'a SectionRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a SectionRecord) -> Option<&'a str> {
        record.company.as_deref()
    }

    fn references(&self, record: &SectionRecord) -> Vec<Reference> {
        vec![Reference::optional(
            "company_id",
            EntityType::Company,
            record.company.as_deref(),
        )]
    }

    fn build(&self, record: &SectionRecord, resolved: &Resolved) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let name = required_field(&record.name, source_id, "name")?;
        Ok(Transformed::new(
            Row::new(source_id)
                .set("name", name)
                .set("position", record.order)
                .set("company_id", resolved.id("company_id"))
                .set("created_at", record.created),
        ))
    }
}

pub struct SubsectionTransformer;

impl Transformer for SubsectionTransformer {
    type Record = SubsectionRecord;

    fn entity(&self) -> EntityType {
        EntityType::Subsection
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::Section]
    }

    fn source_id<'a>(&self, record: &'a SubsectionRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a SubsectionRecord) -> Option<&'a str> {
        record.section.as_deref()
    }

    fn references(&self, record: &SubsectionRecord) -> Vec<Reference> {
        vec![Reference::required(
            "section_id",
            EntityType::Section,
            record.section.as_deref(),
        )]
    }

    fn build(
        &self,
        record: &SubsectionRecord,
        resolved: &Resolved,
    ) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let name = required_field(&record.name, source_id, "name")?;
        Ok(Transformed::new(
            Row::new(source_id)
                .set("name", name)
                .set("position", record.order)
                .set("section_id", resolved.require("section_id")?)
                .set("created_at", record.created),
        ))
    }
}

pub struct QuestionTransformer;

impl Transformer for QuestionTransformer {
    type Record = QuestionRecord;

    fn entity(&self) -> EntityType {
        EntityType::Question
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::Company, EntityType::Tag, EntityType::Subsection]
    }

    fn source_id<'a>(&self, record: &'a QuestionRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a QuestionRecord) -> Option<&'a str> {
        record.subsection.as_deref()
    }

    fn references(&self, record: &QuestionRecord) -> Vec<Reference> {
        vec![
            Reference::required(
                "subsection_id",
                EntityType::Subsection,
                record.subsection.as_deref(),
            ),
            Reference::many(QUESTION_TAGS, EntityType::Tag, &record.tags),
            Reference::many(QUESTION_COMPANIES, EntityType::Company, &record.companies),
        ]
    }

    fn build(&self, record: &QuestionRecord, resolved: &Resolved) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let label = required_field(&record.label, source_id, "label")?;
        let row = Row::new(source_id)
            .set("label", label)
            .set("kind", normalize_kind(record.kind.as_deref()))
            .set("position", record.order)
            .set("required", record.required)
            .set("subsection_id", resolved.require("subsection_id")?)
            .set("created_at", record.created);
        Ok(Transformed::new(row)
            .link(QUESTION_TAGS, resolved.ids(QUESTION_TAGS.table))
            .link(QUESTION_COMPANIES, resolved.ids(QUESTION_COMPANIES.table)))
    }
}

pub struct ChoiceTransformer;

impl Transformer for ChoiceTransformer {
    type Record = ChoiceRecord;

    fn entity(&self) -> EntityType {
        EntityType::Choice
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::Question]
    }

    fn source_id<'a>(&self, record: &'a ChoiceRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a ChoiceRecord) -> Option<&'a str> {
        record.question.as_deref()
    }

    fn references(&self, record: &ChoiceRecord) -> Vec<Reference> {
        vec![Reference::required(
            "question_id",
            EntityType::Question,
            record.question.as_deref(),
        )]
    }

    fn build(&self, record: &ChoiceRecord, resolved: &Resolved) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let label = required_field(&record.label, source_id, "label")?;
        Ok(Transformed::new(
            Row::new(source_id)
                .set("label", label)
                .set("position", record.order)
                .set("question_id", resolved.require("question_id")?)
                .set("created_at", record.created),
        ))
    }
}

pub struct ListTableTransformer;

impl Transformer for ListTableTransformer {
    type Record = ListTableRecord;

    fn entity(&self) -> EntityType {
        EntityType::ListTable
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::Question]
    }

    fn source_id<'a>(&self, record: &'a ListTableRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a ListTableRecord) -> Option<&'a str> {
        record.question.as_deref()
    }

    fn references(&self, record: &ListTableRecord) -> Vec<Reference> {
        vec![Reference::required(
            "question_id",
            EntityType::Question,
            record.question.as_deref(),
        )]
    }

    fn build(
        &self,
        record: &ListTableRecord,
        resolved: &Resolved,
    ) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        Ok(Transformed::new(
            Row::new(source_id)
                .set("name", record.name.as_deref())
                .set("question_id", resolved.require("question_id")?)
                .set("created_at", record.created),
        ))
    }
}

pub struct ListTableColumnTransformer;

impl Transformer for ListTableColumnTransformer {
    type Record = ListTableColumnRecord;

    fn entity(&self) -> EntityType {
        EntityType::ListTableColumn
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::ListTable]
    }

    fn source_id<'a>(&self, record: &'a ListTableColumnRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a ListTableColumnRecord) -> Option<&'a str> {
        record.list_table.as_deref()
    }

    fn references(&self, record: &ListTableColumnRecord) -> Vec<Reference> {
        vec![Reference::required(
            "list_table_id",
            EntityType::ListTable,
            record.list_table.as_deref(),
        )]
    }

    fn build(
        &self,
        record: &ListTableColumnRecord,
        resolved: &Resolved,
    ) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let name = required_field(&record.name, source_id, "name")?;
        Ok(Transformed::new(
            Row::new(source_id)
                .set("name", name)
                .set("kind", normalize_kind(record.kind.as_deref()))
                .set("position", record.order)
                .set("list_table_id", resolved.require("list_table_id")?)
                .set("created_at", record.created),
        ))
    }
}

pub struct ListTableRowTransformer;

impl Transformer for ListTableRowTransformer {
    type Record = ListTableRowRecord;

    fn entity(&self) -> EntityType {
        EntityType::ListTableRow
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::ListTable]
    }

    fn source_id<'a>(&self, record: &'a ListTableRowRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a ListTableRowRecord) -> Option<&'a str> {
        record.list_table.as_deref()
    }

    fn references(&self, record: &ListTableRowRecord) -> Vec<Reference> {
        vec![Reference::required(
            "list_table_id",
            EntityType::ListTable,
            record.list_table.as_deref(),
        )]
    }

    fn build(
        &self,
        record: &ListTableRowRecord,
        resolved: &Resolved,
    ) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        Ok(Transformed::new(
            Row::new(source_id)
                .set("label", record.label.as_deref())
                .set("position", record.order)
                .set("list_table_id", resolved.require("list_table_id")?)
                .set("created_at", record.created),
        ))
    }
}
