// fixtures/tables/companies.rs
//
// The sample fixture seeds a small company registry: one `cnpj` row per
// company with its record as JSON, and a `meta` key/value table.

use crate::fixtures::TestTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row of the `cnpj` table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn razao_social(&self) -> Option<&str> {
        self.json.get("razao_social").and_then(|v| v.as_str())
    }

    pub fn partners(&self) -> usize {
        self.json
            .get("qsa")
            .and_then(|v| v.as_array())
            .map_or(0, Vec::len)
    }
}

pub struct CompaniesTable;

impl CompaniesTable {
    pub const IDS: [&'static str; 3] = ["00000000000191", "19131243000197", "33683111000280"];
}

impl TestTable for CompaniesTable {
    fn table_name() -> &'static str {
        "cnpj"
    }

    fn seeded_rows() -> i64 {
        Self::IDS.len() as i64
    }
}

pub struct MetaTable;

impl TestTable for MetaTable {
    fn table_name() -> &'static str {
        "meta"
    }

    fn seeded_rows() -> i64 {
        1
    }
}
