//! Standalone driver for the DUT plugins.
//!
//! Walks a plugin through the same initialise/build/run lifecycle the
//! compliance framework uses, so a simulator bring-up can be exercised
//! without the framework: point it at a plugin configuration, a test
//! suite and the architecture-test env directory and it compiles and
//! runs every test, leaving signatures in the work directory.

use std::process::ExitCode;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, ValueEnum};
use glob::glob;
use log::{error, info};
use riscof_dut_kit::{DutPlugin, IsaSpec, PluginConfig, RunOutcome, TestEntry, load_test_list};
use riscof_sail_csim::SailCsim;
use riscof_spike::Spike;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PluginKind {
    /// Sail C simulator (riscv_sim_RV32 / riscv_sim_RV64)
    SailCsim,
    /// Spike ISS with the hardware-target binary flow
    Spike,
}

impl PluginKind {
    /// Node name in the configuration file.
    fn config_node(self) -> &'static str {
        match self {
            PluginKind::SailCsim => "sail_cSim",
            PluginKind::Spike => "spike",
        }
    }
}

#[derive(Parser)]
#[command(name = "riscof-runner")]
#[command(about = "Drive a DUT plugin through its compliance-test lifecycle")]
#[command(version)]
struct Args {
    /// Plugin configuration YAML (one node per plugin)
    #[arg(long)]
    config: Utf8PathBuf,

    /// Plugin to drive
    #[arg(long, value_enum)]
    plugin: PluginKind,

    /// Root of the architectural test suite
    #[arg(long)]
    suite: Utf8PathBuf,

    /// Directory for generated artifacts (Makefile, per-test work dirs)
    #[arg(long)]
    work_dir: Utf8PathBuf,

    /// riscv-arch-test env directory (arch_test.h and friends)
    #[arg(long)]
    env: Utf8PathBuf,

    /// riscof test-list YAML; tests are discovered from the suite when omitted
    #[arg(long)]
    testlist: Option<Utf8PathBuf>,

    /// Coverage group files for riscv_isac (may be repeated)
    #[arg(long = "cgf")]
    cgf: Vec<Utf8PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(RunOutcome::Completed) => ExitCode::SUCCESS,
        Ok(RunOutcome::Dispatched) => {
            // The spike flow checks results out of band; dispatching the
            // build tool is already success here.
            info!("build tool dispatched; skipping post-processing");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<RunOutcome> {
    let args = Args::parse();

    let cwd = Utf8PathBuf::from_path_buf(std::env::current_dir()?)
        .map_err(|dir| anyhow::anyhow!("Non-UTF-8 working directory {}", dir.display()))?;
    let config = PluginConfig::load(&args.config, args.plugin.config_node())?.absolutize(&cwd);

    let mut plugin: Box<dyn DutPlugin> = match args.plugin {
        PluginKind::SailCsim => Box::new(SailCsim::new(&config)),
        PluginKind::Spike => Box::new(Spike::new(&config)),
    };

    plugin.initialise(&args.suite, &args.work_dir, &args.env)?;
    plugin.build(&config.ispec, &config.pspec)?;

    let tests = match &args.testlist {
        Some(path) => load_test_list(path)?,
        None => discover_tests(&args.suite, &args.work_dir, &config.ispec)?,
    };
    anyhow::ensure!(!tests.is_empty(), "No tests found for {}", args.suite);
    info!("running {} tests as {}", tests.len(), plugin.name());

    std::fs::create_dir_all(&args.work_dir)
        .with_context(|| format!("Failed to create {}", args.work_dir))?;
    for entry in &tests {
        std::fs::create_dir_all(&entry.work_dir)
            .with_context(|| format!("Failed to create {}", entry.work_dir))?;
    }

    let coverage = (!args.cgf.is_empty()).then_some(args.cgf.as_slice());
    plugin.run_tests(&tests, coverage)
}

/// Build a test list straight from the suite's assembly sources, one work
/// directory per test. The compliance framework normally generates this
/// list; discovery keeps the runner usable without it.
fn discover_tests(
    suite: &Utf8Path,
    work_dir: &Utf8Path,
    ispec: &Utf8Path,
) -> Result<Vec<TestEntry>> {
    let spec = IsaSpec::load(ispec)?;
    let isa = spec.base_isa().to_uppercase();
    let xlen_macro = format!("XLEN={}", spec.xlen().bits());

    let pattern = format!("{suite}/**/*.S");
    let mut sources = Vec::new();
    for path in glob(&pattern).context("Bad suite glob pattern")? {
        let path = Utf8PathBuf::from_path_buf(path?)
            .map_err(|p| anyhow::anyhow!("Non-UTF-8 test path {}", p.display()))?;
        sources.push(path);
    }
    sources.sort();

    let mut tests = Vec::with_capacity(sources.len());
    for source in sources {
        let name = source
            .file_stem()
            .with_context(|| format!("Test source without a file name: {source}"))?
            .to_string();
        tests.push(TestEntry {
            work_dir: work_dir.join(&name),
            isa: isa.clone(),
            macros: vec!["TEST_CASE_1".to_string(), xlen_macro.clone()],
            coverage_labels: vec![name],
            test_path: source,
        });
    }
    Ok(tests)
}
