use serde::Deserialize;

/// Outcome of one `exec` call, as reported by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ExecOutcome {
    #[serde(rename = "lastInsertId")]
    last_insert_id: i64,
    #[serde(rename = "rowsAffected")]
    rows_affected: i64,
}

impl ExecOutcome {
    #[must_use]
    pub fn new(last_insert_id: i64, rows_affected: i64) -> Self {
        Self {
            last_insert_id,
            rows_affected,
        }
    }

    #[must_use]
    pub fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }

    #[must_use]
    pub fn rows_affected(&self) -> i64 {
        self.rows_affected
    }
}
