//! Entity transformers.
//!
//! A transformer turns one typed source record into one target [`Row`]
//! plus any junction links. It never touches the store: it declares the
//! foreign keys it needs as [`Reference`]s, the pipeline resolves them
//! through the identity cache, and [`Transformer::build`] assembles the row
//! from whatever resolved.

mod org;
mod questionnaire;
mod sheets;

pub use org::{
    AssociationTransformer, CompanyTransformer, StackTransformer, TagTransformer,
    UserTransformer,
};
pub use questionnaire::{
    ChoiceTransformer, ListTableColumnTransformer, ListTableRowTransformer,
    ListTableTransformer, QuestionTransformer, SectionTransformer, SubsectionTransformer,
};
pub use sheets::{
    AnswerTransformer, AnswerValue, ChemicalTransformer, SheetTransformer, split_answer_value,
};

use crate::error::RecordError;
use crate::types::{EntityType, Row};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// A many-to-many table keyed on `(owner_column, target_column)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Junction {
    pub table: &'static str,
    pub owner_column: &'static str,
    pub target_column: &'static str,
}

pub const QUESTION_TAGS: Junction = Junction {
    table: "question_tags",
    owner_column: "question_id",
    target_column: "tag_id",
};

pub const QUESTION_COMPANIES: Junction = Junction {
    table: "question_companies",
    owner_column: "question_id",
    target_column: "company_id",
};

pub const SHEET_TAGS: Junction = Junction {
    table: "sheet_tags",
    owner_column: "sheet_id",
    target_column: "tag_id",
};

pub const SHEET_SHAREABLE_COMPANIES: Junction = Junction {
    table: "sheet_shareable_companies",
    owner_column: "sheet_id",
    target_column: "company_id",
};

pub const SHEET_ASSIGNED_USERS: Junction = Junction {
    table: "sheet_assigned_users",
    owner_column: "sheet_id",
    target_column: "user_id",
};

/// A foreign key a record needs resolved before it can be built.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Target column, or junction table name for many-to-many references.
    pub field: &'static str,
    pub entity: EntityType,
    pub source_ids: Vec<String>,
    /// A required reference that does not resolve drops the record.
    pub required: bool,
}

impl Reference {
    /// Optional single-valued foreign key.
    pub fn optional(field: &'static str, entity: EntityType, source_id: Option<&str>) -> Self {
        Self {
            field,
            entity,
            source_ids: source_id.map(|s| vec![s.to_string()]).unwrap_or_default(),
            required: false,
        }
    }

    /// Required single-valued foreign key.
    pub fn required(field: &'static str, entity: EntityType, source_id: Option<&str>) -> Self {
        Self {
            required: true,
            ..Self::optional(field, entity, source_id)
        }
    }

    /// Many-to-many reference through a junction table.
    pub fn many(junction: Junction, entity: EntityType, source_ids: &[String]) -> Self {
        Self {
            field: junction.table,
            entity,
            source_ids: source_ids.to_vec(),
            required: false,
        }
    }
}

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRef {
    pub entity: EntityType,
    pub source_ids: Vec<String>,
    /// One slot per source id; `None` when unresolved or not confirmed in
    /// the target table.
    pub target_ids: Vec<Option<i64>>,
}

/// Resolved references of one record, keyed by field.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    source_id: String,
    refs: HashMap<&'static str, ResolvedRef>,
}

impl Resolved {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            refs: HashMap::new(),
        }
    }

    pub fn insert(&mut self, field: &'static str, resolved: ResolvedRef) {
        self.refs.insert(field, resolved);
    }

    pub fn get(&self, field: &str) -> Option<&ResolvedRef> {
        self.refs.get(field)
    }

    /// Target id of a single-valued reference, if it resolved.
    pub fn id(&self, field: &str) -> Option<i64> {
        self.refs
            .get(field)
            .and_then(|r| r.target_ids.first().copied().flatten())
    }

    /// Target id of a reference the row cannot exist without.
    pub fn require(&self, field: &'static str) -> Result<i64, RecordError> {
        if let Some(id) = self.id(field) {
            return Ok(id);
        }
        match self.refs.get(field) {
            Some(r) if !r.source_ids.is_empty() => Err(RecordError::MissingReference {
                source_id: self.source_id.clone(),
                field,
                entity: r.entity,
                reference: r.source_ids[0].clone(),
            }),
            _ => Err(RecordError::MissingField {
                source_id: self.source_id.clone(),
                field,
            }),
        }
    }

    /// Every resolved target id of a many-valued reference. Unresolved
    /// entries are dropped.
    pub fn ids(&self, field: &str) -> Vec<i64> {
        self.refs
            .get(field)
            .map(|r| r.target_ids.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Check every required reference before building.
    pub fn check_required(&self, references: &[Reference]) -> Result<(), RecordError> {
        for reference in references.iter().filter(|r| r.required) {
            self.require(reference.field)?;
        }
        Ok(())
    }
}

/// Junction rows to write once the owning row has its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Links {
    pub junction: Junction,
    pub target_ids: Vec<i64>,
}

/// Output of a transformer for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub row: Row,
    pub links: Vec<Links>,
}

impl Transformed {
    pub fn new(row: Row) -> Self {
        Self {
            row,
            links: Vec::new(),
        }
    }

    /// Attach junction rows. Empty lists are dropped.
    pub fn link(mut self, junction: Junction, target_ids: Vec<i64>) -> Self {
        if !target_ids.is_empty() {
            self.links.push(Links {
                junction,
                target_ids,
            });
        }
        self
    }
}

/// Converts one entity type's source records into target rows.
pub trait Transformer: Send + Sync {
    type Record: DeserializeOwned + Send + Sync;

    fn entity(&self) -> EntityType;

    fn table(&self) -> &'static str {
        self.entity().table()
    }

    /// Entity types this transformer resolves references against.
    fn depends_on(&self) -> &'static [EntityType];

    fn source_id<'a>(&self, record: &'a Self::Record) -> Option<&'a str>;

    /// Owning record used to scope a re-run (`--parent`).
    fn parent_source_id<'a>(&self, _record: &'a Self::Record) -> Option<&'a str> {
        None
    }

    fn references(&self, record: &Self::Record) -> Vec<Reference>;

    fn build(&self, record: &Self::Record, resolved: &Resolved) -> Result<Transformed, RecordError>;
}

/// Require a non-empty source field.
pub(crate) fn required_field<'a>(
    value: &'a Option<String>,
    source_id: &str,
    field: &'static str,
) -> Result<&'a str, RecordError> {
    value.as_deref().ok_or_else(|| RecordError::MissingField {
        source_id: source_id.to_string(),
        field,
    })
}
