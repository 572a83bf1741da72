//! Oracle statements, identifier checks, and error classification.

use crate::database::{DatabaseError, Result, SqlError};
use regex::Regex;
use std::sync::LazyLock;

pub const LIST_SESSIONS: &str =
    "SELECT username, sid, serial# FROM v$session WHERE username = UPPER(:1)";

pub const LIST_PUBLIC_SYNONYMS: &str =
    "SELECT synonym_name FROM all_synonyms WHERE owner = 'PUBLIC' AND table_owner LIKE UPPER(:1)";

pub const DELETE_CHANGE_LOG: &str = "DELETE FROM DATABASECHANGELOG WHERE ID LIKE :1";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_$#]{0,127}$").expect("valid regex"));

static SESSION_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,10}$").expect("valid regex"));

static ORA_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ORA-(\d{5})").expect("valid regex"));

pub fn kill_session(sid: &str, serial: &str) -> String {
    format!("ALTER SYSTEM KILL SESSION '{},{}' IMMEDIATE", sid, serial)
}

pub fn drop_user(username: &str) -> String {
    format!("DROP USER {} CASCADE", username)
}

/// Synonym names come back from the dictionary verbatim, so they are quoted.
pub fn drop_public_synonym(synonym: &str) -> String {
    format!("DROP PUBLIC SYNONYM \"{}\"", synonym.replace('"', "\"\""))
}

pub fn drop_tablespace(tablespace: &str) -> String {
    format!("DROP TABLESPACE {} INCLUDING CONTENTS AND DATAFILES", tablespace)
}

/// `prefix%`, the LIKE pattern for change-log ids.
pub fn change_log_pattern(prefix: &str) -> String {
    format!("{}%", prefix)
}

/// Reject anything that is not a plain, unquoted Oracle identifier.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(DatabaseError::Config(format!(
            "'{}' is not a valid Oracle {} name",
            name, kind
        )))
    }
}

pub fn is_session_number(value: &str) -> bool {
    SESSION_NUMBER.is_match(value)
}

/// Object kinds whose absence a teardown step may treat as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absent {
    /// ORA-00942
    Table,
    /// ORA-00959
    Tablespace,
    /// ORA-01918
    User,
    /// ORA-01432
    PublicSynonym,
    /// ORA-00030, ORA-00031
    Session,
}

/// Vendor code of `err`, falling back to an `ORA-NNNNN` prefix in the message.
pub fn error_code(err: &SqlError) -> Option<i32> {
    err.code.or_else(|| {
        ORA_CODE
            .captures(&err.message)
            .and_then(|c| c[1].parse().ok())
    })
}

/// `Some(kind)` when the error only says the object is already gone.
pub fn classify(err: &SqlError) -> Option<Absent> {
    match error_code(err)? {
        942 => Some(Absent::Table),
        959 => Some(Absent::Tablespace),
        1918 => Some(Absent::User),
        1432 => Some(Absent::PublicSynonym),
        30 | 31 => Some(Absent::Session),
        _ => None,
    }
}

pub fn is_absent(err: &SqlError, kind: Absent) -> bool {
    classify(err) == Some(kind)
}
