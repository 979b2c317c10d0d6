use std::{collections::BTreeMap, sync::OnceLock};

use journal_export::{Fields, JournalEntry};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FilterError {
    #[error("'{clause}' doesn't match expected pattern Key=Value")]
    MalformedClause { clause: String },
}

/// Field-equality constraints that must all hold for an entry.
pub type FilterGroup = BTreeMap<String, String>;

/// How include/exclude lists are matched against an entry.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FilterSemantics {
    /// Every pair of a group must match; any matching group counts.
    #[default]
    Groups,
    /// Any single configured pair matching counts, regardless of grouping.
    AnyField,
}

fn clause_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^([^=]+)=([^=]+)$").expect("clause pattern is valid"))
}

/// Parses `key1=value1,key2=value2` strings, one group per string.
pub fn parse_groups(raw_groups: &[String]) -> Result<Vec<FilterGroup>, FilterError> {
    raw_groups
        .iter()
        .map(|raw| {
            raw.split(',')
                .map(|clause| -> Result<(String, String), FilterError> {
                    let captures = clause_pattern().captures(clause).ok_or_else(|| {
                        FilterError::MalformedClause {
                            clause: clause.to_string(),
                        }
                    })?;
                    Ok((captures[1].to_string(), captures[2].to_string()))
                })
                .collect::<Result<FilterGroup, FilterError>>()
        })
        .collect()
}

/// Include/exclude predicate compiled once at startup.
#[derive(Clone, Debug, Default)]
pub struct EntryFilter {
    include: Vec<FilterGroup>,
    exclude: Vec<FilterGroup>,
    semantics: FilterSemantics,
}

impl EntryFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, FilterError> {
        Ok(Self {
            include: parse_groups(include)?,
            exclude: parse_groups(exclude)?,
            semantics: FilterSemantics::Groups,
        })
    }

    pub fn semantics(mut self, semantics: FilterSemantics) -> Self {
        self.semantics = semantics;
        self
    }

    /// An entry passes when it matches an include group (or none are configured) and matches no
    /// exclude group.
    pub fn accepts(&self, fields: &Fields) -> bool {
        let included = self.include.is_empty() || self.matches_any(&self.include, fields);
        let excluded = !self.exclude.is_empty() && self.matches_any(&self.exclude, fields);
        included && !excluded
    }

    fn matches_any(&self, groups: &[FilterGroup], fields: &Fields) -> bool {
        let field_equals = |(key, value): (&String, &String)| fields.get(key) == Some(value);
        match self.semantics {
            FilterSemantics::Groups => groups
                .iter()
                .any(|group| group.iter().all(field_equals)),
            FilterSemantics::AnyField => groups.iter().flatten().any(field_equals),
        }
    }

    pub async fn run(
        self,
        mut entries: mpsc::Receiver<JournalEntry>,
        accepted: mpsc::Sender<JournalEntry>,
        cancel: CancellationToken,
    ) {
        loop {
            let entry = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                entry = entries.recv() => match entry {
                    Some(entry) => entry,
                    None => return,
                },
            };

            if !self.accepts(&entry.fields) {
                trace!(cursor = %entry.cursor, "filter: dropped entry");
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = accepted.send(entry) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
