//! Human-readable labels for records, as shown in lists and pickers.

use super::{Database, DbError, DbResult};
use crate::models::{EntityKind, Patient};

impl Database {
    /// Display label of a record of any entity.
    pub fn display_label(&self, kind: EntityKind, id: i64) -> DbResult<String> {
        let missing = || DbError::not_found(kind, id);
        match kind {
            EntityKind::Specialty => Ok(self.get_specialty(id)?.ok_or_else(missing)?.label()),
            EntityKind::InsurancePlan => Ok(self.get_insurance_plan(id)?.ok_or_else(missing)?.label()),
            EntityKind::Doctor => Ok(self.get_doctor(id)?.ok_or_else(missing)?.label()),
            EntityKind::Patient => Ok(self.get_patient(id)?.ok_or_else(missing)?.label()),
            EntityKind::Encounter => {
                let encounter = self.get_encounter(id)?.ok_or_else(missing)?;
                let patient = self.patient_of(encounter.patient_id)?;
                Ok(encounter.label(&patient))
            }
            EntityKind::Prescription => {
                let prescription = self.get_prescription(id)?.ok_or_else(missing)?;
                let patient = self.patient_of_encounter(prescription.encounter_id)?;
                Ok(prescription.label(&patient.name))
            }
            EntityKind::Exam => Ok(self.get_exam(id)?.ok_or_else(missing)?.label()),
            EntityKind::ExamRequest => {
                let request = self.get_exam_request(id)?.ok_or_else(missing)?;
                let exam = self
                    .get_exam(request.exam_id)?
                    .ok_or_else(|| DbError::not_found(EntityKind::Exam, request.exam_id))?;
                let patient = self.patient_of_encounter(request.encounter_id)?;
                Ok(crate::models::ExamRequest::label(&exam.name, &patient.name))
            }
        }
    }

    fn patient_of(&self, patient_id: i64) -> DbResult<Patient> {
        self.get_patient(patient_id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Patient, patient_id))
    }

    fn patient_of_encounter(&self, encounter_id: i64) -> DbResult<Patient> {
        let encounter = self
            .get_encounter(encounter_id)?
            .ok_or_else(|| DbError::not_found(EntityKind::Encounter, encounter_id))?;
        self.patient_of(encounter.patient_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DoctorForm, EncounterForm, ExamForm, ExamRequestForm, PatientForm, PrescriptionForm,
    };
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn test_labels_follow_relations() {
        let db = Database::open_in_memory().unwrap();
        let patient = db
            .insert_patient(&PatientForm::new(
                "Maria Lima",
                "123.456.789-00",
                NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
            ))
            .unwrap();
        let doctor = db.insert_doctor(&DoctorForm::new("Ana Souza", "CRM-1")).unwrap();
        let scheduled_at = Utc.with_ymd_and_hms(2025, 3, 2, 14, 30, 0).unwrap();
        let encounter = db
            .insert_encounter(&EncounterForm::new(patient.id, doctor.id, scheduled_at))
            .unwrap();
        let prescription = db
            .insert_prescription(encounter.id, &PrescriptionForm::new("Rest"))
            .unwrap();
        let exam = db.insert_exam(&ExamForm::new("Blood count")).unwrap();
        let request = db
            .insert_exam_request(encounter.id, &ExamRequestForm::new(exam.id))
            .unwrap();

        assert_eq!(
            db.display_label(EntityKind::Patient, patient.id).unwrap(),
            "Maria Lima - 123.456.789-00"
        );
        assert_eq!(
            db.display_label(EntityKind::Doctor, doctor.id).unwrap(),
            "Ana Souza (License CRM-1)"
        );
        assert_eq!(
            db.display_label(EntityKind::Encounter, encounter.id).unwrap(),
            "Maria Lima - 123.456.789-00 - 02/03/2025 14:30"
        );
        assert_eq!(
            db.display_label(EntityKind::Prescription, prescription.id).unwrap(),
            format!("Prescription #{} - Maria Lima", prescription.id)
        );
        assert_eq!(
            db.display_label(EntityKind::ExamRequest, request.id).unwrap(),
            "Blood count for Maria Lima"
        );
    }

    #[test]
    fn test_missing_record() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.display_label(EntityKind::Exam, 9),
            Err(DbError::NotFound(_))
        ));
    }
}
