// 📥 CSV Import - bulk branch creation
//
// Header row uses the NewBranch field names (name,address,city,...).
// Unknown columns are ignored; empty cells become None.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::entities::NewBranch;
use crate::error::RegistryError;
use crate::registry::BranchRegistry;

/// Read every row of a branch CSV
pub fn load_csv(csv_path: &Path) -> Result<Vec<NewBranch>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut branches = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let fields: NewBranch =
            result.with_context(|| format!("Failed to deserialize branch on row {}", line + 1))?;
        branches.push(fields);
    }

    Ok(branches)
}

/// Outcome of pushing a batch through the registry
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportReport {
    pub created: usize,
    /// Rows rejected because the name or code already exists
    pub conflicts: usize,
    /// Rows rejected for any other reason
    pub failed: usize,
}

impl ImportReport {
    pub fn total(&self) -> usize {
        self.created + self.conflicts + self.failed
    }
}

/// Create each row in order; one bad row does not stop the batch
pub async fn import_branches(registry: &BranchRegistry, rows: Vec<NewBranch>) -> ImportReport {
    let mut report = ImportReport::default();

    for fields in rows {
        let name = fields.name.clone();
        match registry.create(fields).await {
            Ok(_) => report.created += 1,
            Err(RegistryError::Conflict(_)) => {
                warn!("Skipping duplicate branch {:?}", name);
                report.conflicts += 1;
            }
            Err(e) => {
                warn!("Skipping branch {:?}: {}", name, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Imported {} branches ({} duplicates, {} failed)",
        report.created, report.conflicts, report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use std::fs;

    fn write_csv(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("branches.csv");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_csv_reads_optional_columns() {
        let (_dir, path) = write_csv(
            "name,address,city,code,tax_rate,is_active\n\
             Downtown, 1 Main St ,Springfield,DT,8.25,true\n\
             Uptown,9 Hill Rd,,,,\n",
        );

        let rows = load_csv(&path).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].name, "Downtown");
        assert_eq!(rows[0].address, "1 Main St");
        assert_eq!(rows[0].city.as_deref(), Some("Springfield"));
        assert_eq!(rows[0].tax_rate, Some(8.25));
        assert_eq!(rows[0].is_active, Some(true));

        assert_eq!(rows[1].city, None);
        assert_eq!(rows[1].code, None);
        assert_eq!(rows[1].tax_rate, None);
    }

    #[test]
    fn test_load_csv_reports_bad_rows() {
        let (_dir, path) = write_csv("name,address,max_capacity\nNorth,2 Elm,lots\n");

        let err = load_csv(&path).unwrap_err();
        assert!(err.to_string().contains("row 1"));

        assert!(load_csv(Path::new("/nonexistent/branches.csv")).is_err());
    }

    #[tokio::test]
    async fn test_import_counts_created_and_duplicates() {
        let h = harness(&[("1", "Alpha")], None).await;
        h.registry.load().await;

        let rows = vec![
            NewBranch::new("Beta", "2 Elm"),
            NewBranch::new("Alpha", "Somewhere else"),
            NewBranch::new("", "No name"),
            NewBranch::new("Gamma", "3 Oak").with_city("Shelbyville"),
        ];
        let report = import_branches(&h.registry, rows).await;

        assert_eq!(
            report,
            ImportReport {
                created: 2,
                conflicts: 1,
                failed: 1
            }
        );
        assert_eq!(report.total(), 4);
        assert_eq!(h.registry.branches().len(), 3);
    }
}
