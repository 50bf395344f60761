//! Field metadata for every entity.
//!
//! This is the schema as data: the generic delete collector and the admin
//! record browser both walk these tables instead of knowing entities by name.

use serde::{Deserialize, Serialize};

use super::encounter::STATUS_CHOICES;

/// Every entity stored by the clinic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Specialty,
    InsurancePlan,
    Doctor,
    Patient,
    Encounter,
    Prescription,
    Exam,
    ExamRequest,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Specialty,
        EntityKind::InsurancePlan,
        EntityKind::Doctor,
        EntityKind::Patient,
        EntityKind::Encounter,
        EntityKind::Prescription,
        EntityKind::Exam,
        EntityKind::ExamRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Specialty => "specialty",
            EntityKind::InsurancePlan => "insurance_plan",
            EntityKind::Doctor => "doctor",
            EntityKind::Patient => "patient",
            EntityKind::Encounter => "encounter",
            EntityKind::Prescription => "prescription",
            EntityKind::Exam => "exam",
            EntityKind::ExamRequest => "exam_request",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Field metadata for this entity.
    pub fn meta(&self) -> &'static EntityMeta {
        match self {
            EntityKind::Specialty => &SPECIALTY,
            EntityKind::InsurancePlan => &INSURANCE_PLAN,
            EntityKind::Doctor => &DOCTOR,
            EntityKind::Patient => &PATIENT,
            EntityKind::Encounter => &ENCOUNTER,
            EntityKind::Prescription => &PRESCRIPTION,
            EntityKind::Exam => &EXAM,
            EntityKind::ExamRequest => &EXAM_REQUEST,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.meta().verbose_name)
    }
}

/// What happens to a referencing row when its target is deleted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    Protect,
    SetNull,
}

impl OnDelete {
    /// The `ON DELETE` action the schema declares for this rule.
    pub fn sql_action(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::Protect => "RESTRICT",
            OnDelete::SetNull => "SET NULL",
        }
    }
}

/// Storage and presentation kind of a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Id,
    Text,
    LongText,
    Email,
    Bool,
    Date,
    DateTime,
    /// Decimal with two places, stored as integer cents.
    Money,
    Choice(&'static [(&'static str, &'static str)]),
    ForeignKey {
        to: EntityKind,
        on_delete: OnDelete,
    },
    ManyToMany {
        to: EntityKind,
        through: &'static str,
        source_column: &'static str,
        target_column: &'static str,
    },
}

impl FieldKind {
    pub fn is_relation(&self) -> bool {
        matches!(self, FieldKind::ForeignKey { .. } | FieldKind::ManyToMany { .. })
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldKind::Date | FieldKind::DateTime)
    }
}

/// A single declared field.
#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    /// Column in the entity's table. Unused for many-to-many fields.
    pub column: &'static str,
    pub kind: FieldKind,
    pub verbose_name: &'static str,
    pub required: bool,
    pub unique: bool,
    pub max_length: Option<usize>,
    /// System-managed fields are not editable through forms.
    pub editable: bool,
}

impl FieldMeta {
    const fn new(name: &'static str, kind: FieldKind, verbose_name: &'static str) -> Self {
        Self {
            name,
            column: name,
            kind,
            verbose_name,
            required: false,
            unique: false,
            max_length: None,
            editable: true,
        }
    }

    const fn column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    const fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    const fn system(mut self) -> Self {
        self.editable = false;
        self
    }
}

/// Metadata for one entity: its table and fields.
#[derive(Debug)]
pub struct EntityMeta {
    pub kind: EntityKind,
    pub table: &'static str,
    pub verbose_name: &'static str,
    pub verbose_name_plural: &'static str,
    pub fields: &'static [FieldMeta],
}

impl EntityMeta {
    pub fn field(&self, name: &str) -> Option<&'static FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field whose column matches, used to name constraint failures.
    pub fn field_by_column(&self, column: &str) -> Option<&'static FieldMeta> {
        self.fields
            .iter()
            .find(|f| f.column == column && !matches!(f.kind, FieldKind::ManyToMany { .. }))
    }
}

/// Look an entity up by table name.
pub fn entity_for_table(table: &str) -> Option<&'static EntityMeta> {
    EntityKind::ALL
        .iter()
        .map(|kind| kind.meta())
        .find(|meta| meta.table == table)
}

/// A foreign key somewhere that points at `target`.
#[derive(Debug, Clone, Copy)]
pub struct IncomingRelation {
    pub from: EntityKind,
    pub field: &'static FieldMeta,
    pub on_delete: OnDelete,
}

/// All foreign keys that reference `target`.
pub fn incoming_relations(target: EntityKind) -> Vec<IncomingRelation> {
    EntityKind::ALL
        .iter()
        .flat_map(|from| {
            from.meta().fields.iter().filter_map(move |field| match field.kind {
                FieldKind::ForeignKey { to, on_delete } if to == target => Some(IncomingRelation {
                    from: *from,
                    field,
                    on_delete,
                }),
                _ => None,
            })
        })
        .collect()
}

const ID: FieldMeta = FieldMeta::new("id", FieldKind::Id, "ID").system();

static SPECIALTY: EntityMeta = EntityMeta {
    kind: EntityKind::Specialty,
    table: "specialties",
    verbose_name: "specialty",
    verbose_name_plural: "specialties",
    fields: &[
        ID,
        FieldMeta::new("name", FieldKind::Text, "name")
            .required()
            .unique()
            .max_length(100),
        FieldMeta::new("description", FieldKind::LongText, "description"),
    ],
};

static INSURANCE_PLAN: EntityMeta = EntityMeta {
    kind: EntityKind::InsurancePlan,
    table: "insurance_plans",
    verbose_name: "insurance plan",
    verbose_name_plural: "insurance plans",
    fields: &[
        ID,
        FieldMeta::new("name", FieldKind::Text, "name")
            .required()
            .unique()
            .max_length(120),
        FieldMeta::new("tax_id", FieldKind::Text, "tax id")
            .required()
            .unique()
            .max_length(18),
        FieldMeta::new("phone", FieldKind::Text, "phone").max_length(20),
        FieldMeta::new("email", FieldKind::Email, "email").max_length(254),
        FieldMeta::new("active", FieldKind::Bool, "active"),
    ],
};

static DOCTOR: EntityMeta = EntityMeta {
    kind: EntityKind::Doctor,
    table: "doctors",
    verbose_name: "doctor",
    verbose_name_plural: "doctors",
    fields: &[
        ID,
        FieldMeta::new("name", FieldKind::Text, "name")
            .required()
            .max_length(120),
        FieldMeta::new("license_number", FieldKind::Text, "license number")
            .required()
            .unique()
            .max_length(20),
        FieldMeta::new("email", FieldKind::Email, "email").max_length(254),
        FieldMeta::new(
            "specialties",
            FieldKind::ManyToMany {
                to: EntityKind::Specialty,
                through: "doctor_specialties",
                source_column: "doctor_id",
                target_column: "specialty_id",
            },
            "specialties",
        ),
    ],
};

static PATIENT: EntityMeta = EntityMeta {
    kind: EntityKind::Patient,
    table: "patients",
    verbose_name: "patient",
    verbose_name_plural: "patients",
    fields: &[
        ID,
        FieldMeta::new("name", FieldKind::Text, "name")
            .required()
            .max_length(120),
        FieldMeta::new("national_id", FieldKind::Text, "national id")
            .required()
            .unique()
            .max_length(14),
        FieldMeta::new("email", FieldKind::Email, "email").max_length(254),
        FieldMeta::new("birth_date", FieldKind::Date, "birth date").required(),
        FieldMeta::new("phone", FieldKind::Text, "phone").max_length(20),
        FieldMeta::new(
            "insurance_plan",
            FieldKind::ForeignKey {
                to: EntityKind::InsurancePlan,
                on_delete: OnDelete::SetNull,
            },
            "insurance plan",
        )
        .column("insurance_plan_id"),
    ],
};

static ENCOUNTER: EntityMeta = EntityMeta {
    kind: EntityKind::Encounter,
    table: "encounters",
    verbose_name: "encounter",
    verbose_name_plural: "encounters",
    fields: &[
        ID,
        FieldMeta::new(
            "patient",
            FieldKind::ForeignKey {
                to: EntityKind::Patient,
                on_delete: OnDelete::Cascade,
            },
            "patient",
        )
        .column("patient_id")
        .required(),
        FieldMeta::new(
            "doctor",
            FieldKind::ForeignKey {
                to: EntityKind::Doctor,
                on_delete: OnDelete::Protect,
            },
            "doctor",
        )
        .column("doctor_id")
        .required(),
        FieldMeta::new("scheduled_at", FieldKind::DateTime, "scheduled at").required(),
        FieldMeta::new("reason", FieldKind::Text, "reason").max_length(200),
        FieldMeta::new("description", FieldKind::LongText, "description"),
        FieldMeta::new("status", FieldKind::Choice(STATUS_CHOICES), "status").max_length(16),
        FieldMeta::new("value", FieldKind::Money, "value").column("value_cents"),
        FieldMeta::new("created_at", FieldKind::DateTime, "created at").system(),
        FieldMeta::new("updated_at", FieldKind::DateTime, "updated at").system(),
    ],
};

static PRESCRIPTION: EntityMeta = EntityMeta {
    kind: EntityKind::Prescription,
    table: "prescriptions",
    verbose_name: "prescription",
    verbose_name_plural: "prescriptions",
    fields: &[
        ID,
        FieldMeta::new(
            "encounter",
            FieldKind::ForeignKey {
                to: EntityKind::Encounter,
                on_delete: OnDelete::Cascade,
            },
            "encounter",
        )
        .column("encounter_id")
        .required(),
        FieldMeta::new("body", FieldKind::LongText, "body").required(),
        FieldMeta::new("issued_on", FieldKind::Date, "issued on").system(),
    ],
};

static EXAM: EntityMeta = EntityMeta {
    kind: EntityKind::Exam,
    table: "exams",
    verbose_name: "exam",
    verbose_name_plural: "exams",
    fields: &[
        ID,
        FieldMeta::new("name", FieldKind::Text, "name")
            .required()
            .max_length(100),
        FieldMeta::new("description", FieldKind::LongText, "description"),
    ],
};

static EXAM_REQUEST: EntityMeta = EntityMeta {
    kind: EntityKind::ExamRequest,
    table: "exam_requests",
    verbose_name: "exam request",
    verbose_name_plural: "exam requests",
    fields: &[
        ID,
        FieldMeta::new(
            "encounter",
            FieldKind::ForeignKey {
                to: EntityKind::Encounter,
                on_delete: OnDelete::Cascade,
            },
            "encounter",
        )
        .column("encounter_id")
        .required(),
        FieldMeta::new(
            "exam",
            FieldKind::ForeignKey {
                to: EntityKind::Exam,
                on_delete: OnDelete::Protect,
            },
            "exam",
        )
        .column("exam_id")
        .required(),
        FieldMeta::new("completed", FieldKind::Bool, "completed"),
        FieldMeta::new("result", FieldKind::LongText, "result"),
        FieldMeta::new("requested_at", FieldKind::Date, "requested at").system(),
    ],
};
