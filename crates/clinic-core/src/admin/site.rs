//! The clinic's admin registrations.

use serde::Serialize;

use super::{InlineAdmin, ModelAdmin};
use crate::models::{EntityKind, EntityMeta, FieldKind, FieldMeta};

/// A set of registered entities.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AdminSite {
    admins: &'static [ModelAdmin],
}

impl AdminSite {
    pub const fn new(admins: &'static [ModelAdmin]) -> Self {
        Self { admins }
    }

    pub fn get(&self, kind: EntityKind) -> Option<&ModelAdmin> {
        self.admins.iter().find(|admin| admin.entity == kind)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self.admins)
    }

    /// Problems with the declarations: names that match no field, filters
    /// or hierarchies on fields of the wrong kind.
    pub fn check(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for admin in self.admins {
            check_admin(admin, &mut problems);
        }
        problems
    }
}

fn check_admin(admin: &ModelAdmin, problems: &mut Vec<String>) {
    let meta = admin.entity.meta();
    let mut require = |names: &[&str], what: &str| {
        for name in names {
            if meta.field(name).is_none() {
                problems.push(format!("{}.{}: unknown field {:?}", admin.entity.as_str(), what, name));
            }
        }
    };

    require(admin.list_display, "list_display");
    require(admin.list_filter, "list_filter");
    require(admin.fields, "fields");
    require(admin.readonly_fields, "readonly_fields");
    require(admin.filter_horizontal, "filter_horizontal");
    let ordering: Vec<&str> = admin
        .ordering
        .iter()
        .map(|o| o.trim_start_matches('-'))
        .collect();
    require(&ordering, "ordering");

    for path in admin.search_fields {
        if lookup_target(meta, path).is_none() {
            problems.push(format!("{}.search_fields: cannot resolve {:?}", admin.entity.as_str(), path));
        }
    }

    if let Some(name) = admin.date_hierarchy {
        if !meta.field(name).map_or(false, |f| f.kind.is_temporal()) {
            problems.push(format!("{}.date_hierarchy: {:?} is not a date field", admin.entity.as_str(), name));
        }
    }

    for name in admin.filter_horizontal {
        if !matches!(meta.field(name).map(|f| f.kind), Some(FieldKind::ManyToMany { .. })) {
            problems.push(format!("{}.filter_horizontal: {:?} is not many-to-many", admin.entity.as_str(), name));
        }
    }

    for inline in admin.inlines {
        check_inline(admin.entity, inline, problems);
    }
}

fn check_inline(parent: EntityKind, inline: &InlineAdmin, problems: &mut Vec<String>) {
    let meta = inline.entity.meta();
    match meta.field(inline.parent_field).map(|f| f.kind) {
        Some(FieldKind::ForeignKey { to, .. }) if to == parent => {}
        _ => problems.push(format!(
            "{} inline: {:?} is not a foreign key to {}",
            inline.entity.as_str(),
            inline.parent_field,
            parent.as_str()
        )),
    }
    for name in inline.fields.iter().chain(inline.readonly_fields) {
        if meta.field(name).is_none() {
            problems.push(format!("{} inline: unknown field {:?}", inline.entity.as_str(), name));
        }
    }
}

/// Final field of a `__` lookup path, if every hop is a foreign key.
pub(crate) fn lookup_target(meta: &'static EntityMeta, path: &str) -> Option<&'static FieldMeta> {
    let mut meta = meta;
    let mut segments = path.split("__").peekable();
    while let Some(name) = segments.next() {
        let field = meta.field(name)?;
        if segments.peek().is_none() {
            return (!field.kind.is_relation()).then_some(field);
        }
        match field.kind {
            FieldKind::ForeignKey { to, .. } => meta = to.meta(),
            _ => return None,
        }
    }
    None
}

static ENCOUNTER_INLINES: [InlineAdmin; 2] = [
    InlineAdmin {
        entity: EntityKind::Prescription,
        parent_field: "encounter",
        fields: &["body", "issued_on"],
        readonly_fields: &["issued_on"],
        extra: 1,
    },
    InlineAdmin {
        entity: EntityKind::ExamRequest,
        parent_field: "encounter",
        fields: &["exam", "completed", "result", "requested_at"],
        readonly_fields: &["requested_at"],
        extra: 1,
    },
];

static CLINIC_ADMINS: [ModelAdmin; 8] = [
    ModelAdmin {
        list_display: &["id", "scheduled_at", "patient", "doctor", "status", "value"],
        list_filter: &["status", "doctor", "scheduled_at"],
        search_fields: &["patient__name", "doctor__name"],
        ordering: &["-scheduled_at"],
        date_hierarchy: Some("scheduled_at"),
        fields: &[
            "patient",
            "doctor",
            "scheduled_at",
            "reason",
            "description",
            "status",
            "value",
        ],
        inlines: &ENCOUNTER_INLINES,
        ..ModelAdmin::new(EntityKind::Encounter)
    },
    ModelAdmin {
        list_display: &["name", "license_number", "email"],
        list_filter: &["specialties"],
        search_fields: &["name", "license_number", "email"],
        filter_horizontal: &["specialties"],
        ..ModelAdmin::new(EntityKind::Doctor)
    },
    ModelAdmin {
        list_display: &["name", "national_id", "insurance_plan", "birth_date", "phone"],
        list_filter: &["insurance_plan"],
        search_fields: &["name", "national_id", "email", "phone"],
        ..ModelAdmin::new(EntityKind::Patient)
    },
    ModelAdmin {
        list_display: &["name", "tax_id", "active", "phone", "email"],
        list_filter: &["active"],
        search_fields: &["name", "tax_id"],
        ..ModelAdmin::new(EntityKind::InsurancePlan)
    },
    ModelAdmin {
        list_display: &["name"],
        search_fields: &["name"],
        ..ModelAdmin::new(EntityKind::Specialty)
    },
    ModelAdmin {
        list_display: &["encounter", "issued_on"],
        list_filter: &["issued_on"],
        search_fields: &["encounter__patient__name", "encounter__doctor__name", "body"],
        ..ModelAdmin::new(EntityKind::Prescription)
    },
    ModelAdmin {
        list_display: &["name"],
        search_fields: &["name"],
        ..ModelAdmin::new(EntityKind::Exam)
    },
    ModelAdmin {
        list_display: &["encounter", "exam", "completed", "requested_at"],
        list_filter: &["completed", "exam", "requested_at"],
        search_fields: &["encounter__patient__name", "exam__name"],
        ..ModelAdmin::new(EntityKind::ExamRequest)
    },
];

/// Every clinic entity, registered.
pub static CLINIC_SITE: AdminSite = AdminSite::new(&CLINIC_ADMINS);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_entity_registered() {
        for kind in EntityKind::ALL {
            assert!(CLINIC_SITE.get(kind).is_some(), "{}", kind.as_str());
        }
    }

    #[test]
    fn test_declarations_resolve() {
        assert_eq!(CLINIC_SITE.check(), Vec::<String>::new());
    }

    #[test]
    fn test_check_reports_bad_names() {
        static BROKEN: [ModelAdmin; 1] = [ModelAdmin {
            list_display: &["nickname"],
            search_fields: &["doctor__specialties"],
            date_hierarchy: Some("reason"),
            ..ModelAdmin::new(EntityKind::Encounter)
        }];
        let problems = AdminSite::new(&BROKEN).check();
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn test_lookup_target_follows_foreign_keys() {
        let meta = EntityKind::Prescription.meta();
        let field = lookup_target(meta, "encounter__patient__name").unwrap();
        assert_eq!(field.column, "name");
        assert!(lookup_target(meta, "encounter__patient").is_none());
        assert!(lookup_target(meta, "body__name").is_none());
    }

    #[test]
    fn test_encounter_inlines() {
        let admin = CLINIC_SITE.get(EntityKind::Encounter).unwrap();
        assert_eq!(admin.inlines.len(), 2);
        assert!(admin.inlines.iter().all(|inline| inline.extra == 1));
        assert_eq!(admin.inlines[1].readonly_fields, &["requested_at"]);
    }
}
