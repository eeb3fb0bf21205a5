//! Shared scaffolding for CLI integration tests: builds a working
//! directory with a mapping configuration, destination schema, and source
//! files.

use std::{fs, path::PathBuf};

use tempfile::TempDir;

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp workspace");
        fs::create_dir_all(dir.path().join("in")).expect("source dir");
        Self { dir }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dir");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    /// One delimited claim mapping with a required `Clm No` column and a
    /// 10-character width on `Payee`.
    pub fn claim_config(&self) -> (PathBuf, PathBuf) {
        let mappings = self.write(
            "mappings.yml",
            &format!(
                r#"
mappings:
  - table: Claim_Staging
    kind: delimited
    pattern: "claims_*.csv"
    source_dir: {source}
    archive_dir: {archive}
    columns:
      - from: "Clm No"
        to: ClaimNumber
        required: true
      - from: Payee
        to: Payee
"#,
                source = self.path("in").display(),
                archive = self.path("archive").display(),
            ),
        );
        let schema = self.write(
            "destinations.yml",
            r#"
tables:
  Claim_Staging:
    columns:
      - name: ClaimNumber
        max_length: 20
      - name: Payee
        max_length: 10
      - name: SourceFileName
"#,
        );
        (mappings, schema)
    }
}
