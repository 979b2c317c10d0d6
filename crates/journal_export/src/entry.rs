use std::{collections::BTreeMap, fmt};

/// Field carrying the record's position in the journal.
pub const CURSOR_FIELD: &str = "__CURSOR";

pub type Fields = BTreeMap<String, String>;

/// Opaque read position understood by the journal.
///
/// The value is stored and handed back verbatim; it is never parsed or ordered here.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decoded journal record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JournalEntry {
    pub cursor: Cursor,
    /// Every field of the record, `__CURSOR` included.
    pub fields: Fields,
}

impl JournalEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}
