use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use serde_json::json;

use schema_cell::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn patient_request(email: &str, phone: &str) -> CreatePatientRequest {
    CreatePatientRequest {
        name: "Aoife Byrne".to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        dob: date(1988, 4, 12),
        gender: Gender::Female,
        address: "12 Harbour Road, Cork".to_string(),
        emergency_person: "Ciaran Byrne".to_string(),
        emergency_relation: "husband".to_string(),
        emergency_number: "+353 87 000 0000".to_string(),
    }
}

fn doctor_request(email: &str, phone: &str) -> CreateDoctorRequest {
    CreateDoctorRequest {
        name: "Dr. Niamh Kelly".to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        specialization: "General Practice".to_string(),
    }
}

fn receptionist_request(email: &str, phone: &str) -> CreateReceptionistRequest {
    CreateReceptionistRequest {
        name: "Sean Walsh".to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
    }
}

fn slot_request(doctor_id: i32) -> CreateSlotRequest {
    CreateSlotRequest {
        doctor_id,
        available: true,
        slot_time: "09:00-09:30".to_string(),
        day: "Mon".to_string(),
    }
}

fn appointment_request(patient_id: i32, doctor_id: i32, slot_id: i32) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        patient_id,
        doctor_id,
        receptionist_id: None,
        slot_id,
        appointment_date: date(2024, 6, 3),
        reschedule_date: None,
        status: None,
        record_ids: None,
        reason: "Persistent cough".to_string(),
    }
}

struct Clinic {
    patient: Patient,
    doctor: Doctor,
    slot: Slot,
}

async fn seed(store: &MemoryStore) -> Clinic {
    let doctor: Doctor = store
        .create::<Doctor>(&doctor_request("niamh@clinic.test", "555-0001"))
        .await
        .expect("Failed to create doctor");
    let slot: Slot = store
        .create::<Slot>(&slot_request(doctor.id))
        .await
        .expect("Failed to create slot");
    let patient: Patient = store
        .create::<Patient>(&patient_request("aoife@example.com", "555-1001"))
        .await
        .expect("Failed to create patient");

    Clinic { patient, doctor, slot }
}

#[tokio::test]
async fn test_end_to_end_appointment_and_doctor_cascade() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;
    assert!(clinic.slot.available);

    let appointment = store
        .create::<Appointment>(&appointment_request(clinic.patient.id, clinic.doctor.id, clinic.slot.id))
        .await
        .expect("Failed to create appointment");

    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.receptionist_id, None);
    assert!(appointment.record_ids.is_empty());

    let read = serde_json::to_value(appointment.to_read()).unwrap();
    assert_eq!(read["status"], "PENDING");
    assert_eq!(read["receptionist_id"], serde_json::Value::Null);

    assert!(store.delete::<Doctor>(clinic.doctor.id).await.unwrap());

    assert!(store.get::<Slot>(clinic.slot.id).await.unwrap().is_none());
    assert!(store.get::<Appointment>(appointment.id).await.unwrap().is_none());
    assert!(store.get::<Patient>(clinic.patient.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_duplicate_unique_values_are_rejected() {
    let store = MemoryStore::new();
    seed(&store).await;

    let same_email = store
        .create::<Patient>(&patient_request("aoife@example.com", "555-9999"))
        .await;
    assert_matches!(
        same_email,
        Err(StoreError::UniqueViolation { table: "patient", column, .. }) if column == "email"
    );

    let same_phone = store
        .create::<Patient>(&patient_request("other@example.com", "555-1001"))
        .await;
    assert_matches!(
        same_phone,
        Err(StoreError::UniqueViolation { column, .. }) if column == "phone"
    );

    let doctor_dup = store
        .create::<Doctor>(&doctor_request("niamh@clinic.test", "555-0002"))
        .await
        .unwrap_err();
    assert_eq!(doctor_dup.kind(), ErrorKind::Uniqueness);

    store
        .create::<Receptionist>(&receptionist_request("desk@clinic.test", "555-2000"))
        .await
        .unwrap();
    let receptionist_dup = store
        .create::<Receptionist>(&receptionist_request("desk2@clinic.test", "555-2000"))
        .await
        .unwrap_err();
    assert_eq!(receptionist_dup.kind(), ErrorKind::Uniqueness);

    store
        .create::<Admin>(&CreateAdminRequest {
            username: "root".to_string(),
            name: "Root".to_string(),
            password_hash: "hash".to_string(),
            email: "root@clinic.test".to_string(),
        })
        .await
        .unwrap();
    let admin_dup = store
        .create::<Admin>(&CreateAdminRequest {
            username: "root".to_string(),
            name: "Another".to_string(),
            password_hash: "hash".to_string(),
            email: "another@clinic.test".to_string(),
        })
        .await;
    assert_matches!(
        admin_dup,
        Err(StoreError::UniqueViolation { table: "admin", column, .. }) if column == "username"
    );

    // Uniqueness is per table, not across tables.
    store
        .create::<Doctor>(&doctor_request("aoife@example.com", "555-0003"))
        .await
        .expect("Same email in another table should be accepted");
}

#[tokio::test]
async fn test_appointment_requires_existing_slot() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;

    let result = store
        .create::<Appointment>(&appointment_request(clinic.patient.id, clinic.doctor.id, 999))
        .await;

    assert_matches!(
        result,
        Err(StoreError::ForeignKeyViolation { table: "appointment", column, referenced_table, .. })
            if column == "slot_id" && referenced_table == "slot"
    );
    assert_eq!(store.row_count("appointment").await, 0);
}

#[tokio::test]
async fn test_optional_references_are_checked_when_present() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;

    let mut request = appointment_request(clinic.patient.id, clinic.doctor.id, clinic.slot.id);
    request.receptionist_id = Some(42);
    let result = store.create::<Appointment>(&request).await.unwrap_err();
    assert_eq!(result.kind(), ErrorKind::ReferentialIntegrity);

    let records = store
        .create::<Records>(&CreateRecordsRequest {
            patient_id: clinic.patient.id,
            doctor_id: None,
            reason: "Referral letter".to_string(),
            record_data: "records/aoife/referral.pdf".to_string(),
        })
        .await
        .expect("Records without a doctor should be accepted");
    assert_eq!(records.doctor_id, None);
}

#[tokio::test]
async fn test_deleting_patient_cascades_to_records() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;

    for path in ["records/a.pdf", "records/b.pdf"] {
        store
            .create::<Records>(&CreateRecordsRequest {
                patient_id: clinic.patient.id,
                doctor_id: Some(clinic.doctor.id),
                reason: "Blood panel".to_string(),
                record_data: path.to_string(),
            })
            .await
            .unwrap();
    }
    let by_patient = Filter::all().where_eq("patient_id", clinic.patient.id);
    assert_eq!(store.list::<Records>(&by_patient).await.unwrap().len(), 2);

    assert!(store.delete::<Patient>(clinic.patient.id).await.unwrap());

    assert!(store.list::<Records>(&by_patient).await.unwrap().is_empty());
    assert!(store.get::<Doctor>(clinic.doctor.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_cascade_reaches_prescriptions_and_spares_unrelated_rows() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;
    let other_patient = store
        .create::<Patient>(&patient_request("liam@example.com", "555-1002"))
        .await
        .unwrap();

    let appointment = store
        .create::<Appointment>(&appointment_request(clinic.patient.id, clinic.doctor.id, clinic.slot.id))
        .await
        .unwrap();
    let other_appointment = store
        .create::<Appointment>(&appointment_request(other_patient.id, clinic.doctor.id, clinic.slot.id))
        .await
        .unwrap();

    let prescription = store
        .create::<Prescription>(&CreatePrescriptionRequest {
            appointment_id: appointment.id,
            observation: "Mild bronchitis".to_string(),
            medication: "Amoxicillin 500mg".to_string(),
            advise: "Rest and fluids".to_string(),
            test: "None".to_string(),
        })
        .await
        .unwrap();

    assert!(store.delete::<Patient>(clinic.patient.id).await.unwrap());

    assert!(store.get::<Appointment>(appointment.id).await.unwrap().is_none());
    assert!(store.get::<Prescription>(prescription.id).await.unwrap().is_none());
    assert!(store.get::<Appointment>(other_appointment.id).await.unwrap().is_some());
    assert!(store.get::<Slot>(clinic.slot.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_deleting_slot_and_receptionist_cascade_to_appointments() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;
    let receptionist = store
        .create::<Receptionist>(&receptionist_request("desk@clinic.test", "555-2000"))
        .await
        .unwrap();

    let mut booked = appointment_request(clinic.patient.id, clinic.doctor.id, clinic.slot.id);
    booked.receptionist_id = Some(receptionist.id);
    let booked = store.create::<Appointment>(&booked).await.unwrap();
    assert_eq!(booked.receptionist_id, Some(receptionist.id));

    let second_slot = store.create::<Slot>(&slot_request(clinic.doctor.id)).await.unwrap();
    let walk_in = store
        .create::<Appointment>(&appointment_request(clinic.patient.id, clinic.doctor.id, second_slot.id))
        .await
        .unwrap();

    assert!(store.delete::<Receptionist>(receptionist.id).await.unwrap());
    assert!(store.get::<Appointment>(booked.id).await.unwrap().is_none());
    assert!(store.get::<Appointment>(walk_in.id).await.unwrap().is_some());

    assert!(store.delete::<Slot>(second_slot.id).await.unwrap());
    assert!(store.get::<Appointment>(walk_in.id).await.unwrap().is_none());
}

fn unique_table_payload(table: &str) -> serde_json::Value {
    match table {
        "admin" => json!({
            "username": "root",
            "name": "Root",
            "password_hash": "hash",
            "email": "root@clinic.test"
        }),
        "patient" => serde_json::to_value(patient_request("aoife@example.com", "555-1001")).unwrap(),
        "doctor" => serde_json::to_value(doctor_request("niamh@clinic.test", "555-0001")).unwrap(),
        "receptionist" => {
            serde_json::to_value(receptionist_request("desk@clinic.test", "555-2000")).unwrap()
        }
        other => panic!("no payload for table {}", other),
    }
}

async fn insert_into(store: &MemoryStore, table: &str, payload: serde_json::Value) -> StoreResult<i32> {
    match table {
        "admin" => store.insert_json::<Admin>(payload).await.map(|e| e.id),
        "patient" => store.insert_json::<Patient>(payload).await.map(|e| e.id),
        "doctor" => store.insert_json::<Doctor>(payload).await.map(|e| e.id),
        "receptionist" => store.insert_json::<Receptionist>(payload).await.map(|e| e.id),
        other => panic!("no entity for table {}", other),
    }
}

#[tokio::test]
async fn test_every_unique_column_rejects_duplicates() {
    let with_unique: Vec<_> = CLINIC_SCHEMA
        .tables
        .iter()
        .filter(|t| t.unique_columns().next().is_some())
        .map(|t| t.name)
        .collect();
    assert_eq!(with_unique, vec!["admin", "patient", "doctor", "receptionist"]);

    for table in CLINIC_SCHEMA.tables {
        for column in table.unique_columns() {
            let store = MemoryStore::new();
            let first = unique_table_payload(table.name);
            insert_into(&store, table.name, first.clone()).await.unwrap();

            // Every other unique column gets a fresh value; only `column` repeats.
            let mut second = first.clone();
            for other in table.unique_columns().filter(|c| c.name != column.name) {
                second[other.name] = json!(format!("other-{}", other.name));
            }

            let err = insert_into(&store, table.name, second.clone()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Uniqueness, "{}.{}", table.name, column.name);
            assert_matches!(
                err,
                StoreError::UniqueViolation { column: ref c, .. } if c == column.name
            );

            second[column.name] = json!(format!("other-{}", column.name));
            insert_into(&store, table.name, second)
                .await
                .unwrap_or_else(|e| panic!("{}.{}: {}", table.name, column.name, e));
            assert_eq!(store.row_count(table.name).await, 2);
        }
    }
}

#[tokio::test]
async fn test_dates_are_stored_in_canonical_form() {
    let store = MemoryStore::new();
    let payload = serde_json::to_value(patient_request("dob@example.com", "555-5000")).unwrap();

    for loose in ["2024-6-3", " 2024-06-03", "+2024-06-03"] {
        let mut attempt = payload.clone();
        attempt["dob"] = json!(loose);
        let result = store.insert_json::<Patient>(attempt).await;
        assert_matches!(
            result,
            Err(StoreError::Validation(ValidationError::InvalidDate { column, .. })) if column == "dob"
        );
    }
    assert_eq!(store.row_count("patient").await, 0);

    let mut canonical = payload.clone();
    canonical["dob"] = json!("2024-06-03");
    let patient = store.insert_json::<Patient>(canonical).await.unwrap();

    let found = store
        .list::<Patient>(&Filter::all().where_eq("dob", "2024-06-03"))
        .await
        .unwrap();
    assert_eq!(found, vec![patient]);
}

#[tokio::test]
async fn test_unknown_gender_fails_validation() {
    let store = MemoryStore::new();

    let payload = json!({
        "name": "Pat Doyle",
        "email": "pat@example.com",
        "phone": "555-3000",
        "dob": "1975-01-30",
        "gender": "unknown",
        "address": "4 Quay St",
        "emergency_person": "Mary Doyle",
        "emergency_relation": "sister",
        "emergency_number": "555-3001"
    });

    let result = store.insert_json::<Patient>(payload).await;
    assert_matches!(
        result,
        Err(StoreError::Validation(ValidationError::InvalidEnumValue { column, value, .. }))
            if column == "gender" && value == "unknown"
    );
    assert_eq!(store.row_count("patient").await, 0);
}

#[tokio::test]
async fn test_insert_json_validates_shape_and_bounds() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;

    let result = store.insert_json::<Slot>(json!(["not", "an", "object"])).await;
    assert_matches!(result, Err(StoreError::Validation(ValidationError::NotAnObject { .. })));

    let result = store
        .insert_json::<Slot>(json!({
            "doctor_id": clinic.doctor.id,
            "available": true,
            "slot_time": "10:00",
            "day": "Tuesday"
        }))
        .await;
    assert_matches!(result, Err(StoreError::Validation(ValidationError::TooLong { max: 3, .. })));

    let result = store
        .insert_json::<Slot>(json!({"doctor_id": clinic.doctor.id, "available": true, "day": "Tue"}))
        .await;
    assert_matches!(result, Err(StoreError::Validation(ValidationError::MissingField { .. })));

    let result = store
        .insert_json::<Appointment>(json!({
            "patient_id": clinic.patient.id,
            "doctor_id": clinic.doctor.id,
            "slot_id": clinic.slot.id,
            "appointment_date": "2024-06-03",
            "status": "CANCELLED",
            "reason": "x"
        }))
        .await;
    assert_matches!(result, Err(StoreError::Validation(ValidationError::InvalidEnumValue { .. })));
}

#[tokio::test]
async fn test_explicit_status_and_record_ids_are_kept() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;

    let mut request = appointment_request(clinic.patient.id, clinic.doctor.id, clinic.slot.id);
    request.status = Some(AppointmentStatus::Booked);
    request.record_ids = Some(vec![json!(1), json!("scans/xray.png")]);

    let appointment = store.create::<Appointment>(&request).await.unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Booked);
    assert_eq!(appointment.record_ids, vec![json!(1), json!("scans/xray.png")]);
}

#[tokio::test]
async fn test_status_transitions_are_unconstrained() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;
    let appointment = store
        .create::<Appointment>(&appointment_request(clinic.patient.id, clinic.doctor.id, clinic.slot.id))
        .await
        .unwrap();

    for status in [
        AppointmentStatus::Done,
        AppointmentStatus::Pending,
        AppointmentStatus::Rejected,
        AppointmentStatus::Booked,
    ] {
        let updated = store
            .update::<Appointment>(
                appointment.id,
                &UpdateAppointmentRequest {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, status);
    }
}

#[tokio::test]
async fn test_update_reschedules_and_clears_nullable_columns() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;
    let appointment = store
        .create::<Appointment>(&appointment_request(clinic.patient.id, clinic.doctor.id, clinic.slot.id))
        .await
        .unwrap();

    let rescheduled = store
        .update::<Appointment>(
            appointment.id,
            &UpdateAppointmentRequest {
                reschedule_date: Some(Some(date(2024, 6, 10))),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(rescheduled.reschedule_date, Some(date(2024, 6, 10)));
    assert_eq!(rescheduled.reason, appointment.reason);

    let cleared = store
        .update::<Appointment>(
            appointment.id,
            &UpdateAppointmentRequest {
                reschedule_date: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.reschedule_date, None);
}

#[tokio::test]
async fn test_update_enforces_constraints() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;
    let other = store
        .create::<Patient>(&patient_request("liam@example.com", "555-1002"))
        .await
        .unwrap();

    let taken = store
        .update::<Patient>(
            other.id,
            &UpdatePatientRequest {
                email: Some(clinic.patient.email.clone()),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(taken, Err(StoreError::UniqueViolation { .. }));

    // Writing a row's own unique value back is not a conflict.
    let same = store
        .update::<Patient>(
            other.id,
            &UpdatePatientRequest {
                email: Some(other.email.clone()),
                address: Some("7 New Street".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(same.address, "7 New Street");

    let moved = store
        .update::<Slot>(
            clinic.slot.id,
            &UpdateSlotRequest {
                doctor_id: Some(404),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(moved, Err(StoreError::ForeignKeyViolation { .. }));

    let missing = store
        .update::<Doctor>(999, &UpdateDoctorRequest::default())
        .await;
    assert_matches!(missing, Err(StoreError::NotFound { table: "doctor", id: 999 }));
}

#[tokio::test]
async fn test_admin_is_stored_with_hash_but_read_without_it() {
    let store = MemoryStore::new();
    let request = CreateAdminRequest::with_password("ops", "Ops Admin", "ops@clinic.test", "hunter22")
        .expect("Failed to hash password");

    let admin = store.create::<Admin>(&request).await.unwrap();
    assert!(admin.verify_password("hunter22"));

    let fetched = store.get::<Admin>(admin.id).await.unwrap().unwrap();
    let read = serde_json::to_value(fetched.to_read()).unwrap();
    assert!(read.get("password_hash").is_none());
    assert_eq!(read["email"], "ops@clinic.test");
}

#[tokio::test]
async fn test_ids_increment_and_are_not_reused() {
    let store = MemoryStore::new();
    let first = store
        .create::<Doctor>(&doctor_request("a@clinic.test", "1"))
        .await
        .unwrap();
    let second = store
        .create::<Doctor>(&doctor_request("b@clinic.test", "2"))
        .await
        .unwrap();
    assert_eq!((first.id, second.id), (1, 2));

    assert!(store.delete::<Doctor>(second.id).await.unwrap());
    assert!(!store.delete::<Doctor>(second.id).await.unwrap());

    let third = store
        .create::<Doctor>(&doctor_request("c@clinic.test", "3"))
        .await
        .unwrap();
    assert_eq!(third.id, 3);
}

#[tokio::test]
async fn test_list_filters_and_orders_by_id() {
    let store = MemoryStore::new();
    let clinic = seed(&store).await;
    let mut tuesday = slot_request(clinic.doctor.id);
    tuesday.day = "Tue".to_string();
    tuesday.available = false;
    store.create::<Slot>(&tuesday).await.unwrap();
    store.create::<Slot>(&slot_request(clinic.doctor.id)).await.unwrap();

    let all = store.list::<Slot>(&Filter::all()).await.unwrap();
    assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2, 3]);

    let open_mondays = store
        .list::<Slot>(&Filter::all().where_eq("day", "Mon").where_eq("available", true))
        .await
        .unwrap();
    assert_eq!(open_mondays.len(), 2);

    let bad = store.list::<Slot>(&Filter::all().where_eq("weekday", "Mon")).await;
    assert_matches!(bad, Err(StoreError::Validation(ValidationError::UnknownColumn { .. })));
}

#[tokio::test]
async fn test_concurrent_registrations_with_same_email() {
    let store = Arc::new(MemoryStore::new());

    let attempts = (0..8).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .create::<Patient>(&patient_request("race@example.com", &format!("555-40{:02}", i)))
                .await
        })
    });
    let results = futures::future::join_all(attempts).await;

    let outcomes: Vec<_> = results.into_iter().map(|r| r.expect("task panicked")).collect();
    let created = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::Uniqueness))
        .count();

    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(store.row_count("patient").await, 1);
}

#[tokio::test]
async fn test_clinic_store_from_config_uses_memory_engine() {
    let store = ClinicStore::from_config(&shared_config::AppConfig::in_memory());
    let doctor = store
        .create::<Doctor>(&doctor_request("cfg@clinic.test", "555-7000"))
        .await
        .unwrap();
    assert_eq!(store.get::<Doctor>(doctor.id).await.unwrap(), Some(doctor));
}
