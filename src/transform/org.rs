//! Organization entities: associations, stacks, companies, users, tags.

use super::{Reference, Resolved, Transformed, Transformer, required_field};
use crate::error::RecordError;
use crate::source::records::{
    AssociationRecord, CompanyRecord, StackRecord, TagRecord, UserRecord,
};
use crate::types::{EntityType, Row};

pub struct AssociationTransformer;

impl Transformer for AssociationTransformer {
    type Record = AssociationRecord;

    fn entity(&self) -> EntityType {
        EntityType::Association
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[]
    }

    fn source_id<'a>(&self, record: &'a AssociationRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn references(&self, _record: &AssociationRecord) -> Vec<Reference> {
        Vec::new()
    }

    fn build(&self, record: &AssociationRecord, _: &Resolved) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let name = required_field(&record.name, source_id, "name")?;
        Ok(Transformed::new(
            Row::new(source_id)
                .set("name", name)
                .set("created_at", record.created)
                .set("modified_at", record.modified),
        ))
    }
}

pub struct StackTransformer;

impl Transformer for StackTransformer {
    type Record = StackRecord;

    fn entity(&self) -> EntityType {
        EntityType::Stack
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::Association]
    }

    fn source_id<'a>(&self, record: &'a StackRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a StackRecord) -> Option<&'a str> {
        record.association.as_deref()
    }

    fn references(&self, record: &StackRecord) -> Vec<Reference> {
        vec![Reference::optional(
            "association_id",
            EntityType::Association,
            record.association.as_deref(),
        )]
    }

    fn build(&self, record: &StackRecord, resolved: &Resolved) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let name = required_field(&record.name, source_id, "name")?;
        Ok(Transformed::new(
            Row::new(source_id)
                .set("name", name)
                .set("association_id", resolved.id("association_id"))
                .set("created_at", record.created)
                .set("modified_at", record.modified),
        ))
    }
}

pub struct CompanyTransformer;

impl Transformer for CompanyTransformer {
    type Record = CompanyRecord;

    fn entity(&self) -> EntityType {
        EntityType::Company
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::Association, EntityType::Stack]
    }

    fn source_id<'a>(&self, record: &'a CompanyRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a CompanyRecord) -> Option<&'a str> {
        record.association.as_deref()
    }

    fn references(&self, record: &CompanyRecord) -> Vec<Reference> {
        vec![
            Reference::optional(
                "association_id",
                EntityType::Association,
                record.association.as_deref(),
            ),
            Reference::optional("stack_id", EntityType::Stack, record.stack.as_deref()),
        ]
    }

    fn build(&self, record: &CompanyRecord, resolved: &Resolved) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let name = required_field(&record.name, source_id, "name")?;
        Ok(Transformed::new(
            Row::new(source_id)
                .set("name", name)
                .set("vat_number", record.vat.as_deref())
                .set("association_id", resolved.id("association_id"))
                .set("stack_id", resolved.id("stack_id"))
                .set("created_at", record.created)
                .set("modified_at", record.modified),
        ))
    }
}

pub struct UserTransformer;

impl Transformer for UserTransformer {
    type Record = UserRecord;

    fn entity(&self) -> EntityType {
        EntityType::User
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::Company]
    }

    fn source_id<'a>(&self, record: &'a UserRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a UserRecord) -> Option<&'a str> {
        record.company.as_deref()
    }

    fn references(&self, record: &UserRecord) -> Vec<Reference> {
        vec![Reference::optional(
            "company_id",
            EntityType::Company,
            record.company.as_deref(),
        )]
    }

    fn build(&self, record: &UserRecord, resolved: &Resolved) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let email = required_field(&record.email, source_id, "email")?.to_lowercase();
        let role = record.role.as_deref().map(str::to_lowercase);
        Ok(Transformed::new(
            Row::new(source_id)
                .set("email", email)
                .set("first_name", record.first_name.as_deref())
                .set("last_name", record.last_name.as_deref())
                .set("role", role)
                .set("company_id", resolved.id("company_id"))
                .set("created_at", record.created)
                .set("modified_at", record.modified),
        ))
    }
}

pub struct TagTransformer;

impl Transformer for TagTransformer {
    type Record = TagRecord;

    fn entity(&self) -> EntityType {
        EntityType::Tag
    }

    fn depends_on(&self) -> &'static [EntityType] {
        &[EntityType::Company]
    }

    fn source_id<'a>(&self, record: &'a TagRecord) -> Option<&'a str> {
        record.id.as_deref()
    }

    fn parent_source_id<'a>(&self, record: &'a TagRecord) -> Option<&'a str> {
        record.company.as_deref()
    }

    fn references(&self, record: &TagRecord) -> Vec<Reference> {
        vec![Reference::optional(
            "company_id",
            EntityType::Company,
            record.company.as_deref(),
        )]
    }

    fn build(&self, record: &TagRecord, resolved: &Resolved) -> Result<Transformed, RecordError> {
        let source_id = record.id.as_deref().unwrap_or_default();
        let name = required_field(&record.name, source_id, "name")?;
        Ok(Transformed::new(
            Row::new(source_id)
                .set("name", name)
                .set("company_id", resolved.id("company_id"))
                .set("created_at", record.created),
        ))
    }
}
