//! Per-invariant result rows and their text and JSON renderings.

use crate::session::Session;
use crate::skeleton::StructureDefinitionSkeleton;
use serde::Serialize;
use std::fmt::Write;

/// Tallies of one invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub resource_type: String,
    pub key: String,
    pub severity: String,
    pub success: u32,
    pub fail: u32,
    pub error: u32,
    /// Canonical URL when the definition is a profile.
    pub profile: Option<String>,
}

impl ReportRow {
    /// Rows with errors are highlighted.
    pub fn highlighted(&self) -> bool {
        self.error > 0
    }

    /// `  Type\t\tkey(severity)\ts/f/e\t\t(profile - url)`, with the first
    /// column marked `!` when highlighted.
    pub fn line(&self) -> String {
        let marker = if self.highlighted() { "! " } else { "  " };
        let profile = self
            .profile
            .as_ref()
            .map(|url| format!("(profile - {})", url))
            .unwrap_or_default();
        format!(
            "{}{}\t\t{}({})\t{}/{}/{}\t\t{}",
            marker, self.resource_type, self.key, self.severity, self.success, self.fail, self.error, profile
        )
    }
}

#[derive(Serialize)]
struct JsonOut<T: Serialize> {
    ok: bool,
    data: T,
}

/// One row per invariant, in declaration order. Data types produce none.
pub fn skeleton_rows(sd: &StructureDefinitionSkeleton) -> Vec<ReportRow> {
    if sd.is_data_type {
        return Vec::new();
    }
    sd.invariants
        .iter()
        .map(|inv| ReportRow {
            resource_type: sd.type_name().to_string(),
            key: inv.key.clone(),
            severity: inv.severity.to_string(),
            success: inv.tally.success,
            fail: inv.tally.fail,
            error: inv.tally.error,
            profile: if sd.is_profile {
                Some(sd.canonical_url.clone().unwrap_or_default())
            } else {
                None
            },
        })
        .collect()
}

/// Rows for every skeleton the session's filter selects.
pub fn session_rows(session: &Session) -> Vec<ReportRow> {
    let mut rows = Vec::new();
    for id in session.ids() {
        if let Some(skeleton) = session.skeleton(id) {
            let sd = skeleton.lock();
            if session.selects(&sd) {
                rows.extend(skeleton_rows(&sd));
            }
        }
    }
    rows
}

pub fn render_text(rows: &[ReportRow]) -> String {
    let mut output = String::new();
    for row in rows {
        let _ = writeln!(output, "{}", row.line());
    }
    output
}

/// `{ "ok": .., "data": [rows] }`; `ok` is false when any row has errors.
pub fn render_json(rows: &[ReportRow]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonOut {
        ok: exit_code(rows) == 0,
        data: rows,
    })
}

/// 1 when any invariant recorded an error, else 0.
pub fn exit_code(rows: &[ReportRow]) -> i32 {
    if rows.iter().any(ReportRow::highlighted) {
        1
    } else {
        0
    }
}
