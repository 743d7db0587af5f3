//! Shared toolkit for RISCOF DUT plugin adapters.
//!
//! A plugin compiles each compliance test for its simulator, runs it to
//! capture a signature file, and hands all per-test work to an external
//! build tool as generated Makefile targets. This crate provides the
//! lifecycle the host framework drives ([`DutPlugin`]), the configuration
//! and ISA-description parsing, toolchain resolution, and the Makefile
//! registry the adapters share.

pub mod config;
pub mod isa;
pub mod make;
pub mod toolchain;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

pub use config::PluginConfig;
pub use isa::{IsaSpec, Xlen};
pub use make::MakeUtil;

/// Fatal setup errors. Everything here is detected before a single build
/// target is generated and aborts the whole run; per-test failures never
/// take this form (they only surface through the build tool's aggregate
/// exit status).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}: executable not found. Please check environment setup.")]
    ToolNotFound(Utf8PathBuf),
    #[error("config node for {0} missing")]
    MissingConfig(String),
}

/// One compliance test from the framework's test list.
#[derive(Debug, Clone, Deserialize)]
pub struct TestEntry {
    /// Assembly source of the test.
    pub test_path: Utf8PathBuf,
    /// Directory all artifacts of this test land in. The framework
    /// guarantees it is exclusive to the test; no two targets ever write
    /// the same file.
    pub work_dir: Utf8PathBuf,
    /// ISA the test was generated for, e.g. `RV32IMC`.
    pub isa: String,
    /// Compile-time macros to define, without the `-D` prefix.
    #[serde(default)]
    pub macros: Vec<String>,
    /// Functional-coverage bins this test exercises.
    #[serde(default)]
    pub coverage_labels: Vec<String>,
}

impl TestEntry {
    /// Short test name: the source file name without its extension.
    pub fn name(&self) -> &str {
        self.test_path.file_stem().unwrap_or(self.test_path.as_str())
    }
}

/// Load a riscof test-list YAML, preserving document order. Target names
/// depend on insertion order, so the order of this list is meaningful.
pub fn load_test_list(path: &Utf8Path) -> Result<Vec<TestEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read test list {path}"))?;
    let mapping: serde_yaml::Mapping =
        serde_yaml::from_str(&text).with_context(|| format!("Malformed test list {path}"))?;
    let mut tests = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        tests.push(
            serde_yaml::from_value(value)
                .with_context(|| format!("Malformed test entry {key:?} in {path}"))?,
        );
    }
    Ok(tests)
}

/// What the host framework should do after [`DutPlugin::run_tests`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Signatures are in place; proceed with comparison and reporting.
    Completed,
    /// The build tool was dispatched and per-test results are checked out
    /// of band; report success immediately and skip post-processing.
    Dispatched,
}

/// Lifecycle a DUT plugin exposes to the host framework.
///
/// Calls arrive in order: [`initialise`](Self::initialise) once with the
/// run's directories, [`build`](Self::build) once with the riscv-config
/// descriptions, then [`run_tests`](Self::run_tests) with the full test
/// list.
pub trait DutPlugin {
    /// DUT name. Signature files are `<name>.signature` and the generated
    /// build file is `Makefile.<name>`.
    fn name(&self) -> &str;

    /// Capture the suite location, the run's work directory and the
    /// architecture-test environment, and resolve toolchain binaries from
    /// their environment overrides.
    fn initialise(
        &mut self,
        suite: &Utf8Path,
        work_dir: &Utf8Path,
        archtest_env: &Utf8Path,
    ) -> Result<()>;

    /// Derive the ISA and ABI from the riscv-config YAMLs and validate
    /// that every required executable resolves. Must succeed before
    /// [`run_tests`](Self::run_tests) is called.
    fn build(&mut self, isa_yaml: &Utf8Path, platform_yaml: &Utf8Path) -> Result<()>;

    /// Generate one build target per test, in list order, and delegate
    /// execution to the external build tool.
    fn run_tests(
        &mut self,
        tests: &[TestEntry],
        coverage: Option<&[Utf8PathBuf]>,
    ) -> Result<RunOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_test_list_preserves_document_order() {
        let yaml = "\
suite/rv32i_m/I/src/xor-01.S:
  test_path: /suite/rv32i_m/I/src/xor-01.S
  work_dir: /work/xor-01
  isa: RV32I
  macros: [TEST_CASE_1, XLEN=32]
  coverage_labels: [xor]
suite/rv32i_m/I/src/add-01.S:
  test_path: /suite/rv32i_m/I/src/add-01.S
  work_dir: /work/add-01
  isa: RV32I
";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        let path = Utf8Path::from_path(file.path()).unwrap();

        let tests = load_test_list(path).unwrap();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].name(), "xor-01");
        assert_eq!(tests[1].name(), "add-01");
        assert_eq!(tests[0].macros, ["TEST_CASE_1", "XLEN=32"]);
        assert_eq!(tests[0].coverage_labels, ["xor"]);
        assert!(tests[1].macros.is_empty());
    }

    #[test]
    fn test_entry_name_strips_extension_only() {
        let entry = TestEntry {
            test_path: "/suite/I/src/misalign1-jalr-01.S".into(),
            work_dir: "/work".into(),
            isa: "RV32I".into(),
            macros: vec![],
            coverage_labels: vec![],
        };
        assert_eq!(entry.name(), "misalign1-jalr-01");
    }
}
