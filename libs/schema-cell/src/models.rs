// libs/schema-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::schema::{
    TableDef, ADMIN_TABLE, APPOINTMENT_TABLE, DOCTOR_TABLE, PATIENT_TABLE, PRESCRIPTION_TABLE,
    RECEPTIONIST_TABLE, RECORDS_TABLE, SLOT_TABLE,
};
use crate::services::password::PasswordService;

/// A persisted record type mapped to one table.
///
/// Stores only ever deserialize entities; nothing here requires an entity to
/// be serializable, which is what keeps [`Admin`] out of client payloads.
pub trait Entity: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Insertable fields. Columns with defaults may be left out.
    type Create: Serialize + Send + Sync;
    /// Partial update; absent fields are left untouched.
    type Update: Serialize + Send + Sync;
    /// Client-facing projection.
    type Read: Serialize + Send;

    fn table() -> &'static TableDef;
    fn id(&self) -> i32;
    fn to_read(&self) -> Self::Read;
}

/// Distinguishes "field absent" (`None`) from "field set to null" (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ==============================================================================
// ENUMERATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const VALUES: &'static [&'static str] = &["male", "female", "other"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(format!(
                "Invalid gender: '{}'. Must be one of: {}",
                s,
                Self::VALUES.join(", ")
            )),
        }
    }
}

/// Appointment status. Transitions between states are decided by the
/// application; any value may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Booked,
    Done,
    Rejected,
}

impl AppointmentStatus {
    pub const VALUES: &'static [&'static str] = &["PENDING", "BOOKED", "DONE", "REJECTED"];
    pub const DEFAULT_VALUE: &'static str = "PENDING";

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Booked => "BOOKED",
            AppointmentStatus::Done => "DONE",
            AppointmentStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(AppointmentStatus::Pending),
            "BOOKED" => Ok(AppointmentStatus::Booked),
            "DONE" => Ok(AppointmentStatus::Done),
            "REJECTED" => Ok(AppointmentStatus::Rejected),
            _ => Err(format!(
                "Invalid appointment status: '{}'. Must be one of: {}",
                s,
                Self::VALUES.join(", ")
            )),
        }
    }
}

// ==============================================================================
// ENTITIES AND READ-SCHEMAS
// ==============================================================================

/// Declares an entity and its read-schema from one field list, so the
/// projection cannot drift from the entity.
macro_rules! entity {
    (
        $(#[$meta:meta])*
        $entity:ident in $table:ident {
            $($field:ident: $ty:ty,)*
        }
        read = $read:ident,
        create = $create:ty,
        update = $update:ty,
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $entity {
            pub id: i32,
            $(pub $field: $ty,)*
        }

        #[doc = concat!("Read-schema for [`", stringify!($entity), "`], mirroring every column.")]
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $read {
            pub id: i32,
            $(pub $field: $ty,)*
        }

        impl From<$entity> for $read {
            fn from(entity: $entity) -> Self {
                let $entity { id, $($field),* } = entity;
                Self { id, $($field),* }
            }
        }

        impl Entity for $entity {
            type Create = $create;
            type Update = $update;
            type Read = $read;

            fn table() -> &'static TableDef {
                &$table
            }

            fn id(&self) -> i32 {
                self.id
            }

            fn to_read(&self) -> Self::Read {
                self.clone().into()
            }
        }
    };
}

entity! {
    Patient in PATIENT_TABLE {
        name: String,
        email: String,
        phone: String,
        dob: NaiveDate,
        gender: Gender,
        address: String,
        emergency_person: String,
        emergency_relation: String,
        emergency_number: String,
    }
    read = PatientRead,
    create = CreatePatientRequest,
    update = UpdatePatientRequest,
}

impl Patient {
    /// Age in whole years on the given date.
    pub fn age_on(&self, date: NaiveDate) -> u32 {
        date.years_since(self.dob).unwrap_or(0)
    }
}

entity! {
    Doctor in DOCTOR_TABLE {
        name: String,
        email: String,
        phone: String,
        specialization: String,
    }
    read = DoctorRead,
    create = CreateDoctorRequest,
    update = UpdateDoctorRequest,
}

entity! {
    Receptionist in RECEPTIONIST_TABLE {
        name: String,
        email: String,
        phone: String,
    }
    read = ReceptionistRead,
    create = CreateReceptionistRequest,
    update = UpdateReceptionistRequest,
}

entity! {
    /// A doctor's bookable time unit. `day` is a three-letter code.
    Slot in SLOT_TABLE {
        doctor_id: i32,
        available: bool,
        slot_time: String,
        day: String,
    }
    read = SlotRead,
    create = CreateSlotRequest,
    update = UpdateSlotRequest,
}

entity! {
    /// A digital health record. `record_data` is an opaque reference such as
    /// a storage path.
    Records in RECORDS_TABLE {
        patient_id: i32,
        doctor_id: Option<i32>,
        reason: String,
        record_data: String,
    }
    read = RecordsRead,
    create = CreateRecordsRequest,
    update = UpdateRecordsRequest,
}

entity! {
    Appointment in APPOINTMENT_TABLE {
        patient_id: i32,
        doctor_id: i32,
        receptionist_id: Option<i32>,
        slot_id: i32,
        appointment_date: NaiveDate,
        reschedule_date: Option<NaiveDate>,
        status: AppointmentStatus,
        record_ids: Vec<Value>,
        reason: String,
    }
    read = AppointmentRead,
    create = CreateAppointmentRequest,
    update = UpdateAppointmentRequest,
}

impl Appointment {
    pub fn is_rescheduled(&self) -> bool {
        self.reschedule_date.is_some()
    }

    /// The date the appointment actually takes place.
    pub fn effective_date(&self) -> NaiveDate {
        self.reschedule_date.unwrap_or(self.appointment_date)
    }
}

entity! {
    Prescription in PRESCRIPTION_TABLE {
        appointment_id: i32,
        observation: String,
        medication: String,
        advise: String,
        test: String,
    }
    read = PrescriptionRead,
    create = CreatePrescriptionRequest,
    update = UpdatePrescriptionRequest,
}

// Admin is declared by hand: it carries a credential and must never be
// serialized. Only AdminRead is, and it has no hash field.

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Admin {
    pub id: i32,
    pub username: String,
    pub name: String,
    pub password_hash: String,
    pub email: String,
}

impl fmt::Debug for Admin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admin")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("name", &self.name)
            .field("password_hash", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

impl Admin {
    pub fn verify_password(&self, password: &str) -> bool {
        match PasswordService::verify_password(password, &self.password_hash) {
            Ok(matches) => matches,
            Err(e) => {
                warn!("Stored password hash for admin {} is unreadable: {}", self.id, e);
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRead {
    pub id: i32,
    pub username: String,
    pub name: String,
    pub email: String,
}

impl From<&Admin> for AdminRead {
    fn from(admin: &Admin) -> Self {
        Self {
            id: admin.id,
            username: admin.username.clone(),
            name: admin.name.clone(),
            email: admin.email.clone(),
        }
    }
}

impl Entity for Admin {
    type Create = CreateAdminRequest;
    type Update = UpdateAdminRequest;
    type Read = AdminRead;

    fn table() -> &'static TableDef {
        &ADMIN_TABLE
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn to_read(&self) -> Self::Read {
        AdminRead::from(self)
    }
}

// ==============================================================================
// WRITE MODELS
// ==============================================================================

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAdminRequest {
    pub username: String,
    pub name: String,
    pub password_hash: String,
    pub email: String,
}

impl CreateAdminRequest {
    /// Builds the request from a plaintext password, hashing it with argon2.
    pub fn with_password(
        username: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        password: &str,
    ) -> Result<Self, argon2::password_hash::Error> {
        Ok(Self {
            username: username.into(),
            name: name.into(),
            password_hash: PasswordService::hash_password(password)?,
            email: email.into(),
        })
    }
}

impl fmt::Debug for CreateAdminRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateAdminRequest")
            .field("username", &self.username)
            .field("name", &self.name)
            .field("password_hash", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAdminRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl fmt::Debug for UpdateAdminRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateAdminRequest")
            .field("username", &self.username)
            .field("name", &self.name)
            .field("password_hash", &self.password_hash.as_ref().map(|_| "<redacted>"))
            .field("email", &self.email)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub dob: NaiveDate,
    pub gender: Gender,
    pub address: String,
    pub emergency_person: String,
    pub emergency_relation: String,
    pub emergency_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePatientRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_person: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_relation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub specialization: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDoctorRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReceptionistRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReceptionistRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    pub doctor_id: i32,
    pub available: bool,
    pub slot_time: String,
    pub day: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSlotRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRecordsRequest {
    pub patient_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<i32>,
    pub reason: String,
    pub record_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecordsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<i32>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<Option<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: i32,
    pub doctor_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receptionist_id: Option<i32>,
    pub slot_id: i32,
    pub appointment_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reschedule_date: Option<NaiveDate>,
    /// Left out, the store applies PENDING.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_ids: Option<Vec<Value>>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<i32>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub receptionist_id: Option<Option<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub reschedule_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_ids: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub appointment_id: i32,
    pub observation: String,
    pub medication: String,
    pub advise: String,
    pub test: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePrescriptionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advise: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
}
