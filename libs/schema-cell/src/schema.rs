// libs/schema-cell/src/schema.rs
//
// Table definitions for the clinic entities: columns, constraints and
// relationships, plus row validation and Postgres DDL generation.

use std::fmt::Write as _;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::models::{AppointmentStatus, Gender};

/// A stored row: column name to JSON value.
pub type Row = Map<String, Value>;

/// Name of the auto-incrementing primary key present on every table.
pub const PRIMARY_KEY: &str = "id";

const DATE_FORMAT: &str = "%Y-%m-%d";

// ==============================================================================
// DEFINITIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Boolean,
    /// Bounded string, bound counted in characters.
    Varchar(usize),
    Text,
    Date,
    /// JSON array.
    JsonList,
    /// String restricted to a closed set of values.
    Enum(&'static [&'static str]),
}

impl ColumnType {
    fn expected(&self) -> &'static str {
        match self {
            ColumnType::Integer => "an integer",
            ColumnType::Boolean => "a boolean",
            ColumnType::Varchar(_) | ColumnType::Text | ColumnType::Enum(_) => "a string",
            ColumnType::Date => "a date string",
            ColumnType::JsonList => "a JSON list",
        }
    }

    fn sql_type(&self) -> String {
        match self {
            ColumnType::Integer => "INT".to_string(),
            ColumnType::Boolean => "BOOL".to_string(),
            ColumnType::Varchar(max) => format!("VARCHAR({})", max),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::JsonList => "JSONB".to_string(),
            ColumnType::Enum(values) => {
                let width = values.iter().map(|v| v.len()).max().unwrap_or(1);
                format!("VARCHAR({})", width)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    Text(&'static str),
    EmptyList,
}

impl ColumnDefault {
    pub fn to_value(self) -> Value {
        match self {
            ColumnDefault::Text(text) => Value::String(text.to_string()),
            ColumnDefault::EmptyList => Value::Array(Vec::new()),
        }
    }

    fn sql_literal(self) -> String {
        match self {
            ColumnDefault::Text(text) => format!("'{}'", text.replace('\'', "''")),
            ColumnDefault::EmptyList => "'[]'::jsonb".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
            unique: false,
            default: None,
        }
    }

    pub const fn unique(self) -> Self {
        Self { unique: true, ..self }
    }

    pub const fn nullable(self) -> Self {
        Self { nullable: true, ..self }
    }

    pub const fn default(self, default: ColumnDefault) -> Self {
        Self { default: Some(default), ..self }
    }

    /// Checks a non-null value against the column type and bounds.
    pub fn check_value(&self, table: &'static str, value: &Value) -> Result<(), ValidationError> {
        let mismatch = || ValidationError::TypeMismatch {
            table,
            column: self.name.to_string(),
            expected: self.column_type.expected(),
        };

        match self.column_type {
            ColumnType::Integer => {
                value
                    .as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or_else(mismatch)?;
            }
            ColumnType::Boolean => {
                value.as_bool().ok_or_else(mismatch)?;
            }
            ColumnType::Varchar(max) => {
                let text = value.as_str().ok_or_else(mismatch)?;
                let actual = text.chars().count();
                if actual > max {
                    return Err(ValidationError::TooLong {
                        table,
                        column: self.name.to_string(),
                        max,
                        actual,
                    });
                }
            }
            ColumnType::Text => {
                value.as_str().ok_or_else(mismatch)?;
            }
            ColumnType::Date => {
                let text = value.as_str().ok_or_else(mismatch)?;
                // Only the canonical YYYY-MM-DD spelling is accepted.
                let canonical = NaiveDate::parse_from_str(text, DATE_FORMAT)
                    .is_ok_and(|date| date.format(DATE_FORMAT).to_string() == text);
                if !canonical {
                    return Err(ValidationError::InvalidDate {
                        table,
                        column: self.name.to_string(),
                        value: text.to_string(),
                    });
                }
            }
            ColumnType::JsonList => {
                value.as_array().ok_or_else(mismatch)?;
            }
            ColumnType::Enum(values) => {
                let text = value.as_str().ok_or_else(mismatch)?;
                if !values.contains(&text) {
                    return Err(ValidationError::InvalidEnumValue {
                        table,
                        column: self.name.to_string(),
                        value: text.to_string(),
                        allowed: values.join(", "),
                    });
                }
            }
        }

        Ok(())
    }
}

/// What happens to referencing rows when the referenced row goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    Cascade,
    Restrict,
    SetNull,
}

impl ReferentialAction {
    fn sql(self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::SetNull => "SET NULL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl ForeignKey {
    pub const fn cascade(column: &'static str, references: &'static str) -> Self {
        Self {
            column,
            references,
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::Cascade,
        }
    }

    pub const fn on_delete(self, action: ReferentialAction) -> Self {
        Self { on_delete: action, ..self }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub foreign_keys: &'static [ForeignKey],
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.unique)
    }

    /// True for the primary key and every declared column.
    pub fn has_column(&self, name: &str) -> bool {
        name == PRIMARY_KEY || self.column(name).is_some()
    }

    fn reject_unknown<'a>(&self, keys: impl Iterator<Item = &'a String>) -> Result<(), ValidationError> {
        for key in keys {
            if key == PRIMARY_KEY {
                return Err(ValidationError::ReadOnlyColumn {
                    table: self.name,
                    column: key.clone(),
                });
            }
            if self.column(key).is_none() {
                return Err(ValidationError::UnknownColumn {
                    table: self.name,
                    column: key.clone(),
                });
            }
        }
        Ok(())
    }

    /// Validates a new row and fills declared defaults and absent nullable
    /// columns. The returned row has every declared column.
    pub fn validate_insert(&self, mut row: Row) -> Result<Row, ValidationError> {
        self.reject_unknown(row.keys())?;

        for column in self.columns {
            match row.get(column.name) {
                None => {
                    let filled = match column.default {
                        Some(default) => default.to_value(),
                        None if column.nullable => Value::Null,
                        None => {
                            return Err(ValidationError::MissingField {
                                table: self.name,
                                column: column.name.to_string(),
                            })
                        }
                    };
                    row.insert(column.name.to_string(), filled);
                }
                Some(Value::Null) if !column.nullable => {
                    return Err(ValidationError::NullNotAllowed {
                        table: self.name,
                        column: column.name.to_string(),
                    });
                }
                Some(Value::Null) => {}
                Some(value) => column.check_value(self.name, value)?,
            }
        }

        Ok(row)
    }

    /// Validates a partial update; only the columns present are checked.
    pub fn validate_update(&self, patch: &Row) -> Result<(), ValidationError> {
        self.reject_unknown(patch.keys())?;

        for (name, value) in patch {
            let Some(column) = self.column(name) else { continue };
            if value.is_null() {
                if !column.nullable {
                    return Err(ValidationError::NullNotAllowed {
                        table: self.name,
                        column: name.clone(),
                    });
                }
            } else {
                column.check_value(self.name, value)?;
            }
        }

        Ok(())
    }

    pub fn create_table_sql(&self) -> String {
        let mut lines = vec![format!("    \"{}\" SERIAL NOT NULL PRIMARY KEY", PRIMARY_KEY)];

        for column in self.columns {
            let mut line = format!("    \"{}\" {}", column.name, column.column_type.sql_type());
            if !column.nullable {
                line.push_str(" NOT NULL");
            }
            if column.unique {
                line.push_str(" UNIQUE");
            }
            if let Some(default) = column.default {
                let _ = write!(line, " DEFAULT {}", default.sql_literal());
            }
            if let ColumnType::Enum(values) = column.column_type {
                let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
                let _ = write!(line, " CHECK (\"{}\" IN ({}))", column.name, quoted.join(", "));
            }
            if let Some(fk) = self.foreign_keys.iter().find(|fk| fk.column == column.name) {
                let _ = write!(
                    line,
                    " REFERENCES \"{}\" (\"{}\") ON DELETE {} ON UPDATE {}",
                    fk.references,
                    PRIMARY_KEY,
                    fk.on_delete.sql(),
                    fk.on_update.sql()
                );
            }
            lines.push(line);
        }

        format!("CREATE TABLE IF NOT EXISTS \"{}\" (\n{}\n);", self.name, lines.join(",\n"))
    }
}

/// An ordered set of tables; parents come before the tables referencing them.
#[derive(Debug)]
pub struct Schema {
    pub tables: &'static [&'static TableDef],
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&'static TableDef> {
        self.tables.iter().copied().find(|t| t.name == name)
    }

    /// Every foreign key that points at `table`, with the table declaring it.
    pub fn referencing<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = (&'static TableDef, &'static ForeignKey)> + 'a {
        self.tables.iter().copied().flat_map(move |t| {
            t.foreign_keys
                .iter()
                .filter(move |fk| fk.references == table)
                .map(move |fk| (t, fk))
        })
    }

    /// Checks the declarations are coherent: foreign keys point at earlier
    /// tables through declared integer columns, and SET NULL only targets
    /// nullable columns.
    pub fn validate(&self) -> Result<(), String> {
        for (position, table) in self.tables.iter().enumerate() {
            for fk in table.foreign_keys {
                let column = table
                    .column(fk.column)
                    .ok_or_else(|| format!("{}.{} is not a declared column", table.name, fk.column))?;
                if column.column_type != ColumnType::Integer {
                    return Err(format!("{}.{} must be an integer column", table.name, fk.column));
                }
                let target = self.tables[..position]
                    .iter()
                    .any(|t| t.name == fk.references);
                if !target {
                    return Err(format!(
                        "{}.{} references '{}', which is not declared before it",
                        table.name, fk.column, fk.references
                    ));
                }
                if fk.on_delete == ReferentialAction::SetNull && !column.nullable {
                    return Err(format!("{}.{} is SET NULL but not nullable", table.name, fk.column));
                }
            }
        }
        Ok(())
    }

    pub fn to_postgres_ddl(&self) -> String {
        self.tables
            .iter()
            .map(|t| t.create_table_sql())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn drop_ddl(&self) -> String {
        self.tables
            .iter()
            .rev()
            .map(|t| format!("DROP TABLE IF EXISTS \"{}\";", t.name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ==============================================================================
// CLINIC TABLES
// ==============================================================================

pub static ADMIN_TABLE: TableDef = TableDef {
    name: "admin",
    columns: &[
        ColumnDef::new("username", ColumnType::Varchar(20)).unique(),
        ColumnDef::new("name", ColumnType::Varchar(50)),
        ColumnDef::new("password_hash", ColumnType::Varchar(128)),
        ColumnDef::new("email", ColumnType::Varchar(50)).unique(),
    ],
    foreign_keys: &[],
};

pub static PATIENT_TABLE: TableDef = TableDef {
    name: "patient",
    columns: &[
        ColumnDef::new("name", ColumnType::Varchar(255)),
        ColumnDef::new("email", ColumnType::Varchar(255)).unique(),
        ColumnDef::new("phone", ColumnType::Varchar(50)).unique(),
        ColumnDef::new("dob", ColumnType::Date),
        ColumnDef::new("gender", ColumnType::Enum(Gender::VALUES)),
        ColumnDef::new("address", ColumnType::Varchar(255)),
        ColumnDef::new("emergency_person", ColumnType::Varchar(255)),
        ColumnDef::new("emergency_relation", ColumnType::Varchar(255)),
        ColumnDef::new("emergency_number", ColumnType::Varchar(255)),
    ],
    foreign_keys: &[],
};

pub static DOCTOR_TABLE: TableDef = TableDef {
    name: "doctor",
    columns: &[
        ColumnDef::new("name", ColumnType::Varchar(255)),
        ColumnDef::new("email", ColumnType::Varchar(255)).unique(),
        ColumnDef::new("phone", ColumnType::Varchar(50)).unique(),
        ColumnDef::new("specialization", ColumnType::Varchar(255)),
    ],
    foreign_keys: &[],
};

pub static RECEPTIONIST_TABLE: TableDef = TableDef {
    name: "receptionist",
    columns: &[
        ColumnDef::new("name", ColumnType::Varchar(255)),
        ColumnDef::new("email", ColumnType::Varchar(255)).unique(),
        ColumnDef::new("phone", ColumnType::Varchar(50)).unique(),
    ],
    foreign_keys: &[],
};

pub static SLOT_TABLE: TableDef = TableDef {
    name: "slot",
    columns: &[
        ColumnDef::new("doctor_id", ColumnType::Integer),
        ColumnDef::new("available", ColumnType::Boolean),
        ColumnDef::new("slot_time", ColumnType::Varchar(255)),
        ColumnDef::new("day", ColumnType::Varchar(3)),
    ],
    foreign_keys: &[ForeignKey::cascade("doctor_id", "doctor")],
};

pub static RECORDS_TABLE: TableDef = TableDef {
    name: "records",
    columns: &[
        ColumnDef::new("patient_id", ColumnType::Integer),
        ColumnDef::new("doctor_id", ColumnType::Integer).nullable(),
        ColumnDef::new("reason", ColumnType::Text),
        ColumnDef::new("record_data", ColumnType::Varchar(255)),
    ],
    foreign_keys: &[
        ForeignKey::cascade("patient_id", "patient"),
        ForeignKey::cascade("doctor_id", "doctor"),
    ],
};

pub static APPOINTMENT_TABLE: TableDef = TableDef {
    name: "appointment",
    columns: &[
        ColumnDef::new("patient_id", ColumnType::Integer),
        ColumnDef::new("doctor_id", ColumnType::Integer),
        ColumnDef::new("receptionist_id", ColumnType::Integer).nullable(),
        ColumnDef::new("slot_id", ColumnType::Integer),
        ColumnDef::new("appointment_date", ColumnType::Date),
        ColumnDef::new("reschedule_date", ColumnType::Date).nullable(),
        ColumnDef::new("status", ColumnType::Enum(AppointmentStatus::VALUES))
            .default(ColumnDefault::Text(AppointmentStatus::DEFAULT_VALUE)),
        ColumnDef::new("record_ids", ColumnType::JsonList).default(ColumnDefault::EmptyList),
        ColumnDef::new("reason", ColumnType::Text),
    ],
    foreign_keys: &[
        ForeignKey::cascade("patient_id", "patient"),
        ForeignKey::cascade("doctor_id", "doctor"),
        ForeignKey::cascade("receptionist_id", "receptionist"),
        ForeignKey::cascade("slot_id", "slot"),
    ],
};

pub static PRESCRIPTION_TABLE: TableDef = TableDef {
    name: "prescription",
    columns: &[
        ColumnDef::new("appointment_id", ColumnType::Integer),
        ColumnDef::new("observation", ColumnType::Text),
        ColumnDef::new("medication", ColumnType::Text),
        ColumnDef::new("advise", ColumnType::Text),
        ColumnDef::new("test", ColumnType::Text),
    ],
    foreign_keys: &[ForeignKey::cascade("appointment_id", "appointment")],
};

pub static CLINIC_SCHEMA: Schema = Schema {
    tables: &[
        &ADMIN_TABLE,
        &PATIENT_TABLE,
        &DOCTOR_TABLE,
        &RECEPTIONIST_TABLE,
        &SLOT_TABLE,
        &RECORDS_TABLE,
        &APPOINTMENT_TABLE,
        &PRESCRIPTION_TABLE,
    ],
};
