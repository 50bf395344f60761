//! Insurance plan models.

use serde::{Deserialize, Serialize};

use crate::validation::{strip, ValidationErrors};

/// A health-coverage provider a patient may be enrolled under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsurancePlan {
    pub id: i64,
    /// Unique plan name
    pub name: String,
    /// Company tax registration number, unique
    pub tax_id: String,
    pub phone: String,
    pub email: String,
    /// Whether the clinic currently accepts this plan
    pub active: bool,
}

impl InsurancePlan {
    pub fn label(&self) -> String {
        self.name.clone()
    }
}

/// Editable fields of an insurance plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsurancePlanForm {
    pub name: String,
    pub tax_id: String,
    pub phone: String,
    pub email: String,
    pub active: bool,
}

impl Default for InsurancePlanForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            tax_id: String::new(),
            phone: String::new(),
            email: String::new(),
            active: true,
        }
    }
}

impl InsurancePlanForm {
    /// Copy with surrounding whitespace stripped from text fields.
    pub fn cleaned(&self) -> Self {
        Self {
            name: strip(&self.name),
            tax_id: strip(&self.tax_id),
            phone: strip(&self.phone),
            email: strip(&self.email),
            ..self.clone()
        }
    }

    pub fn new(name: impl Into<String>, tax_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tax_id: tax_id.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_text("name", &self.name);
        errors.max_length("name", &self.name, 120);
        errors.require_text("tax_id", &self.tax_id);
        errors.max_length("tax_id", &self.tax_id, 18);
        errors.max_length("phone", &self.phone, 20);
        errors.max_length("email", &self.email, 254);
        errors.email("email", &self.email);
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_plan_is_active() {
        let form = InsurancePlanForm::new("Vida Plena", "12.345.678/0001-90");
        assert!(form.active);
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_tax_id_length() {
        let form = InsurancePlanForm::new("Vida Plena", "12.345.678/0001-90-00");
        let errors = form.validate().unwrap_err();
        assert!(errors.get("tax_id").is_some());
    }
}
