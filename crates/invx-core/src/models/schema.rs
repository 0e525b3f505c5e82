//! Canonical output schema: column names, machine keys and extraction rules.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{InvxError, Result};

/// Instruction used for columns that have none.
pub const FALLBACK_INSTRUCTION: &str = "No instruction provided.";

/// Built-in column table for Japanese electricity invoices:
/// (column name, machine key, extraction instruction).
const ELECTRICITY_INVOICE_COLUMNS: &[(&str, &str, &str)] = &[
    ("N番号", "n_number", "Extract the N number if available. This is unique to each invoice and written on the filename inside brackets like 【Nxxxx】 or 【Nxxxx-x】 (x is an integer)."),
    ("企業名", "company_name", "Extract the company name (typically fixed across pages). There is always written '様' or '御中' at the end of the company name."),
    ("供給地点番号", "supply_point_identification_number", "Extract the supply point identification number (usually fixed)."),
    ("契約種別", "contract_type", "Extract the contract type as indicated on the invoice."),
    ("見積提出会社", "quotation_submission_company", "Extract the quotation submission company, which is typically mentioned on the invoice."),
    ("プラン名", "plan_name", "Extract the plan name (usually indicating the electricity billing plan)."),
    ("都道府県", "prefecture", "Extract the prefecture name from the address field."),
    ("市区町村", "city", "Extract the city name from the address field."),
    ("請求書発行日", "invoice_issue_date", "Extract the invoice issue date in the format 'YYYY年M月D日'."),
    ("請求金額", "billing_amount", "Extract the billing amount with the currency unit (e.g., '100,000円')."),
    ("電力使用量", "electricity_usage", "Extract the electricity usage, typically presented in kWh."),
    ("基本料金単価", "basic_unit_price", "Extract the basic unit price in yen."),
    ("燃料費調整額", "fuel_cost_adjustment", "Extract the fuel cost adjustment amount, including the unit if applicable."),
    ("電力調達費", "power_procurement_cost", "Extract the power procurement cost, including the unit if applicable."),
    ("再エネ賦課金", "renewable_energy_surcharge", "Extract the renewable energy surcharge amount, including the unit if applicable."),
    ("需給管理費", "demand_supply_management_cost", "Extract the demand supply management cost, including the unit if applicable."),
    ("使用料料金単価", "usage_fee_unit_price", "Extract the usage fee unit price in yen per kWh."),
    ("夏季使用量料金", "summer_usage_fee", "Extract the overall summer usage fee, including the unit if applicable."),
    ("冬季使用量利用金", "winter_usage_fee", "Extract the overall winter usage fee, including the unit if applicable."),
    ("他季使用量料金", "other_season_usage_fee", "Extract the overall other season usage fee, including the unit if applicable."),
    ("夏季昼間使用量料金", "summer_daytime_usage_fee", "Extract the summer daytime usage fee, including the unit if applicable."),
    ("夏季夜間使用量料金", "summer_late_night_usage_fee", "Extract the summer nighttime usage fee, including the unit if applicable."),
    ("冬季昼間使用量料金", "winter_daytime_usage_fee", "Extract the winter daytime usage fee, including the unit if applicable."),
    ("冬季夜間使用量料金", "winter_late_night_usage_fee", "Extract the winter nighttime usage fee, including the unit if applicable."),
    ("他季昼間使用量料金", "other_season_daytime_usage_fee", "Extract the other season daytime usage fee, including the unit if applicable."),
    ("他季夜間使用量料金", "other_season_late_night_usage_fee", "Extract the other season nighttime usage fee, including the unit if applicable."),
    ("ピーク時使用量料金", "peak_time_usage_fee", "Extract the peak time usage fee, including the necessary unit."),
    ("備考", "remarks", "Extract any remarks if present."),
];

/// One canonical output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Human-readable column name; this is the key of matched records.
    pub name: String,
    /// Stable machine-readable key.
    pub key: String,
    /// Natural-language extraction rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

/// Ordered, immutable set of canonical columns.
///
/// Built once at startup and shared; every record produced against a schema
/// carries exactly its column set, in its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalSchema {
    columns: Vec<Column>,
}

impl CanonicalSchema {
    /// Build a schema, rejecting empty tables and duplicate names or keys.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if columns.is_empty() {
            return Err(InvxError::Config("schema has no columns".to_string()));
        }

        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        for column in &columns {
            if !names.insert(column.name.as_str()) {
                return Err(InvxError::Config(format!(
                    "duplicate column name in schema: {}",
                    column.name
                )));
            }
            if !keys.insert(column.key.as_str()) {
                return Err(InvxError::Config(format!(
                    "duplicate column key in schema: {}",
                    column.key
                )));
            }
        }

        Ok(Self { columns })
    }

    /// The built-in electricity invoice schema.
    pub fn electricity_invoice() -> Self {
        let columns = ELECTRICITY_INVOICE_COLUMNS
            .iter()
            .map(|(name, key, instruction)| Column {
                name: (*name).to_string(),
                key: (*key).to_string(),
                instruction: Some((*instruction).to_string()),
            })
            .collect();
        Self { columns }
    }

    /// Load a schema from a JSON array of columns.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let columns: Vec<Column> = serde_json::from_str(&content).map_err(|e| {
            InvxError::Config(format!("invalid schema file {}: {}", path.display(), e))
        })?;
        Self::new(columns)
    }

    /// Columns in schema order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in schema order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Machine keys in schema order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.key.as_str())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false for a constructed schema.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Extraction instruction for a column, with the generic fallback.
    pub fn instruction_for(&self, name: &str) -> &str {
        self.column(name)
            .and_then(|c| c.instruction.as_deref())
            .unwrap_or(FALLBACK_INSTRUCTION)
    }
}

impl Default for CanonicalSchema {
    fn default() -> Self {
        Self::electricity_invoice()
    }
}
