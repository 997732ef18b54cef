// 🏢 Branch Entity - one physical/organizational location
//
// "Branch name is a VALUE (can change), Branch id is IDENTITY (never changes)"
//
// The id and timestamps are assigned by the store; everything else is
// supplied by the caller through NewBranch (create) or BranchPatch (update).

use crate::error::RegistryError;
use crate::gateway::Row;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Table holding branch records
pub const BRANCHES_TABLE: &str = "branches";

/// Country written on create when the caller leaves it blank
pub const DEFAULT_COUNTRY: &str = "USA";

// ============================================================================
// BRANCH ENTITY
// ============================================================================

/// Branch record as stored by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    // ========================================================================
    // IDENTITY (never changes)
    // ========================================================================
    pub id: String,

    // ========================================================================
    // VALUES (can change over time)
    // ========================================================================
    pub name: String,
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// SQLite hands the flag back as 0/1
    #[serde(default = "default_active", deserialize_with = "flag")]
    pub is_active: bool,

    /// Staff reference; not enforced at this layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,

    /// Short branch code (unique when present)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Free text, e.g. "06:00"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_hours: Option<String>,

    #[serde(default)]
    pub tax_rate: f64,

    #[serde(default)]
    pub max_capacity: i64,

    // ========================================================================
    // TIMESTAMPS (ISO-8601, store-assigned)
    // ========================================================================
    #[serde(default = "now_iso")]
    pub created_at: String,

    #[serde(default = "now_iso")]
    pub updated_at: String,
}

fn default_active() -> bool {
    true
}

/// Same shape as the schema default: `2025-01-01T00:00:00.000Z`
fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accept `true`/`false` as well as SQLite's 0/1
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(true)),
        Value::Null => Ok(true),
        other => Err(serde::de::Error::custom(format!(
            "expected boolean flag, got {}",
            other
        ))),
    }
}

/// Distinguish "field absent" (None) from "field explicitly null" (Some(None))
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl Branch {
    /// Decode a gateway row
    pub fn from_row(row: Row) -> Result<Branch, serde_json::Error> {
        serde_json::from_value(Value::Object(row))
    }

    /// Human-readable label for messages ("Downtown (DT-01)")
    pub fn label(&self) -> String {
        match &self.code {
            Some(code) => format!("{} ({})", self.name, code),
            None => self.name.clone(),
        }
    }
}

// ============================================================================
// CREATE FIELDS
// ============================================================================

/// Fields accepted by `BranchRegistry::create`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewBranch {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub manager_id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub opening_hours: Option<String>,
    #[serde(default)]
    pub closing_hours: Option<String>,
    #[serde(default)]
    pub tax_rate: Option<f64>,
    #[serde(default)]
    pub max_capacity: Option<i64>,
}

impl NewBranch {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        NewBranch {
            name: name.into(),
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Required fields must be non-blank after trimming
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::validation("name"));
        }
        if self.address.trim().is_empty() {
            return Err(RegistryError::validation("address"));
        }
        Ok(())
    }

    /// Trim strings, drop absent/blank optionals, default the country
    pub fn normalize(&self, default_country: &str) -> Row {
        let mut row = Row::new();
        row.insert("name".into(), Value::from(self.name.trim()));
        row.insert("address".into(), Value::from(self.address.trim()));

        let optional_text = [
            ("city", &self.city),
            ("state", &self.state),
            ("email", &self.email),
            ("phone", &self.phone),
            ("manager_id", &self.manager_id),
            ("code", &self.code),
            ("opening_hours", &self.opening_hours),
            ("closing_hours", &self.closing_hours),
        ];
        for (key, value) in optional_text {
            if let Some(text) = trimmed(value) {
                row.insert(key.into(), Value::from(text));
            }
        }

        let country = trimmed(&self.country).unwrap_or(default_country);
        row.insert("country".into(), Value::from(country));

        if let Some(active) = self.is_active {
            row.insert("is_active".into(), Value::from(active));
        }
        if let Some(rate) = self.tax_rate {
            row.insert("tax_rate".into(), Value::from(rate));
        }
        if let Some(capacity) = self.max_capacity {
            row.insert("max_capacity".into(), Value::from(capacity));
        }

        row
    }
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

// ============================================================================
// PARTIAL UPDATE
// ============================================================================

/// Partial update for `BranchRegistry::update`
///
/// Optional columns are tri-state: `None` leaves the column alone,
/// `Some(None)` clears it, `Some(Some(v))` sets it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BranchPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub city: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub state: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub country: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub manager_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub code: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub opening_hours: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub closing_hours: Option<Option<String>>,
    #[serde(default)]
    pub tax_rate: Option<f64>,
    #[serde(default)]
    pub max_capacity: Option<i64>,
}

impl BranchPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        BranchPatch {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// A patch may not blank out a required field
    pub fn validate(&self) -> Result<(), RegistryError> {
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(RegistryError::validation("name"));
        }
        if matches!(&self.address, Some(address) if address.trim().is_empty()) {
            return Err(RegistryError::validation("address"));
        }
        Ok(())
    }

    /// Only touched columns, plus a refreshed updated_at
    pub fn into_row(self) -> Row {
        let mut row = Row::new();

        if let Some(name) = &self.name {
            row.insert("name".into(), Value::from(name.trim()));
        }
        if let Some(address) = &self.address {
            row.insert("address".into(), Value::from(address.trim()));
        }

        let optional_text = [
            ("city", &self.city),
            ("state", &self.state),
            ("country", &self.country),
            ("email", &self.email),
            ("phone", &self.phone),
            ("manager_id", &self.manager_id),
            ("code", &self.code),
            ("opening_hours", &self.opening_hours),
            ("closing_hours", &self.closing_hours),
        ];
        for (key, change) in optional_text {
            if let Some(value) = change {
                let value = trimmed(value).map(Value::from).unwrap_or(Value::Null);
                row.insert(key.into(), value);
            }
        }

        if let Some(active) = self.is_active {
            row.insert("is_active".into(), Value::from(active));
        }
        if let Some(rate) = self.tax_rate {
            row.insert("tax_rate".into(), Value::from(rate));
        }
        if let Some(capacity) = self.max_capacity {
            row.insert("max_capacity".into(), Value::from(capacity));
        }

        row.insert("updated_at".into(), Value::from(now_iso()));
        row
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_branch_validation() {
        assert!(NewBranch::new("Downtown", "1 Main St").validate().is_ok());

        assert_eq!(
            NewBranch::new("", "X").validate(),
            Err(RegistryError::validation("name"))
        );
        assert_eq!(
            NewBranch::new("   ", "X").validate(),
            Err(RegistryError::validation("name"))
        );
        assert_eq!(
            NewBranch::new("Downtown", " \t").validate(),
            Err(RegistryError::validation("address"))
        );
    }

    #[test]
    fn test_normalize_trims_and_defaults_country() {
        let mut fields = NewBranch::new("  Downtown ", " 1 Main St ");
        fields.city = Some("  Springfield ".to_string());
        fields.email = Some("   ".to_string()); // Blank - should be dropped
        fields.code = Some("DT-01".to_string());

        let row = normalize_to_json(&fields, DEFAULT_COUNTRY);

        assert_eq!(row["name"], "Downtown");
        assert_eq!(row["address"], "1 Main St");
        assert_eq!(row["city"], "Springfield");
        assert_eq!(row["country"], DEFAULT_COUNTRY);
        assert_eq!(row["code"], "DT-01");
        assert!(row.get("email").is_none());
        assert!(row.get("phone").is_none());
        assert!(row.get("tax_rate").is_none());
    }

    #[test]
    fn test_normalize_keeps_explicit_country() {
        let mut fields = NewBranch::new("Centro", "Av. Juárez 10");
        fields.country = Some("Mexico".to_string());

        let row = normalize_to_json(&fields, DEFAULT_COUNTRY);
        assert_eq!(row["country"], "Mexico");
    }

    fn normalize_to_json(fields: &NewBranch, country: &str) -> Value {
        Value::Object(fields.normalize(country))
    }

    #[test]
    fn test_branch_from_row_accepts_integer_flag() {
        let row = json!({
            "id": "b-1",
            "name": "Downtown",
            "address": "1 Main St",
            "city": null,
            "is_active": 0,
            "tax_rate": 8.25,
            "max_capacity": 120,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        });
        let Value::Object(row) = row else { unreachable!() };

        let branch = Branch::from_row(row).unwrap();
        assert_eq!(branch.id, "b-1");
        assert!(!branch.is_active);
        assert_eq!(branch.city, None);
        assert_eq!(branch.tax_rate, 8.25);
        assert_eq!(branch.max_capacity, 120);
    }

    #[test]
    fn test_branch_defaults() {
        let Value::Object(row) = json!({"id": "b-2", "name": "North", "address": "2 Elm"}) else {
            unreachable!()
        };

        let branch = Branch::from_row(row).unwrap();
        assert!(branch.is_active);
        assert_eq!(branch.tax_rate, 0.0);
        assert_eq!(branch.max_capacity, 0);
        assert!(!branch.created_at.is_empty());
        assert_eq!(branch.label(), "North");
    }

    #[test]
    fn test_patch_rejects_blank_required_fields() {
        assert_eq!(
            BranchPatch::rename("  ").validate(),
            Err(RegistryError::validation("name"))
        );

        let patch = BranchPatch {
            address: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(patch.validate(), Err(RegistryError::validation("address")));
    }

    #[test]
    fn test_patch_row_contains_only_touched_fields() {
        let patch = BranchPatch {
            name: Some(" Uptown ".to_string()),
            city: Some(None),
            phone: Some(Some("555-0100".to_string())),
            ..Default::default()
        };

        let row = patch.into_row();
        assert_eq!(row["name"], "Uptown");
        assert_eq!(row["city"], Value::Null);
        assert_eq!(row["phone"], "555-0100");
        assert!(!row.contains_key("address"));
        assert!(!row.contains_key("state"));
    }

    #[test]
    fn test_patch_stamps_updated_at_in_millis_utc() {
        let row = BranchPatch::rename("Uptown").into_row();
        let stamp = row["updated_at"].as_str().unwrap();

        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
        assert!(stamp.ends_with('Z'));
        assert_eq!(stamp.len(), "2025-01-01T00:00:00.000Z".len());
    }

    #[test]
    fn test_patch_deserialize_distinguishes_null_from_absent() {
        let patch: BranchPatch =
            serde_json::from_value(json!({"city": null, "email": "a@b.c"})).unwrap();

        assert_eq!(patch.city, Some(None));
        assert_eq!(patch.email, Some(Some("a@b.c".to_string())));
        assert_eq!(patch.state, None);
    }
}
