//! DUT adapter for the Sail-generated C simulators (`riscv_sim_RV32` /
//! `riscv_sim_RV64`).
//!
//! For every test the adapter registers one build target that compiles the
//! test, disassembles the ELF for debugging, runs the simulator with
//! signature capture, and (when coverage group files are supplied) feeds
//! the run into the coverage analyzer.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use riscof_dut_kit::{
    DutPlugin, IsaSpec, MakeUtil, PluginConfig, RunOutcome, TestEntry, Xlen, toolchain,
};

/// Environment overrides recognized by this adapter.
const ENV_CC: &str = "RISCV_CC";
const ENV_OBJDUMP: &str = "RISCV_OBJDUMP";
const ENV_SIM_RV32: &str = "RISCV_SIM_RV32";
const ENV_SIM_RV64: &str = "RISCV_SIM_RV64";

pub struct SailCsim {
    name: String,
    jobs: u32,
    pluginpath: Utf8PathBuf,
    make: String,
    sim_rv32: Utf8PathBuf,
    sim_rv64: Utf8PathBuf,
    compiler: Utf8PathBuf,
    objdump: Utf8PathBuf,
    work_dir: Utf8PathBuf,
    archtest_env: Utf8PathBuf,
    isa: Option<IsaSpec>,
}

impl SailCsim {
    pub fn new(config: &PluginConfig) -> Self {
        debug!("sail_cSim plugin created with configuration {config:?}");
        Self {
            name: "sail_cSim".to_string(),
            jobs: config.jobs,
            pluginpath: config.pluginpath.clone(),
            make: config.make.clone(),
            sim_rv32: toolchain::resolve(ENV_SIM_RV32, config.path.join("riscv_sim_RV32")),
            sim_rv64: toolchain::resolve(ENV_SIM_RV64, config.path.join("riscv_sim_RV64")),
            compiler: Utf8PathBuf::new(),
            objdump: Utf8PathBuf::new(),
            work_dir: Utf8PathBuf::new(),
            archtest_env: Utf8PathBuf::new(),
            isa: None,
        }
    }

    /// Override the DUT name used for signature files and the Makefile.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn sim_exe(&self, xlen: Xlen) -> &Utf8Path {
        match xlen {
            Xlen::Rv32 => &self.sim_rv32,
            Xlen::Rv64 => &self.sim_rv64,
        }
    }

    fn spec(&self) -> Result<&IsaSpec> {
        self.isa.as_ref().context("build() must run before tests")
    }

    fn compile_command(&self, spec: &IsaSpec, entry: &TestEntry, elf: &str) -> String {
        let mut cmd = format!(
            "{cc} -march={march} -DXLEN={xlen} -static -mcmodel=medany -fvisibility=hidden \
             -nostdlib -nostartfiles -T {plugin}/env/link.ld -I {plugin}/env/ -I {env} \
             -mabi={abi} {test} -o {elf}",
            cc = self.compiler,
            march = entry.isa.to_lowercase(),
            xlen = spec.xlen().bits(),
            plugin = self.pluginpath,
            env = self.archtest_env,
            abi = spec.abi(),
            test = entry.test_path,
        );
        for name in &entry.macros {
            cmd.push_str(" -D");
            cmd.push_str(name);
        }
        cmd
    }

    fn objdump_command(&self, elf: &str, listing: &str) -> String {
        format!("{} -D {} > {};", self.objdump, elf, listing)
    }

    fn sim_command(&self, spec: &IsaSpec, entry: &TestEntry, elf: &str) -> String {
        let signature = entry.work_dir.join(format!("{}.signature", self.name));
        format!(
            "{sim} --test-signature={signature} {elf} > {name}.log 2>&1;",
            sim = self.sim_exe(spec.xlen()),
            name = entry.name(),
        )
    }

    fn coverage_command(
        &self,
        spec: &IsaSpec,
        entry: &TestEntry,
        coverage: &[Utf8PathBuf],
    ) -> String {
        let mut cmd = format!(
            "riscv_isac --verbose info coverage -d -t {name}.log --parser-name c_sail \
             -o coverage.rpt --sig-label begin_signature end_signature \
             --test-label rvtest_code_begin rvtest_code_end -e ref.elf",
            name = entry.name(),
        );
        for file in coverage {
            cmd.push_str(" -c ");
            cmd.push_str(file.as_str());
        }
        cmd.push_str(&format!(" -x{}", spec.xlen().bits()));
        for label in &entry.coverage_labels {
            cmd.push_str(" -l ");
            cmd.push_str(label);
        }
        cmd.push(';');
        cmd
    }

    /// The complete shell command sequence for one test, run from inside
    /// its exclusive work directory.
    fn test_target(
        &self,
        spec: &IsaSpec,
        entry: &TestEntry,
        coverage: Option<&[Utf8PathBuf]>,
    ) -> String {
        let elf = "ref.elf";
        let mut target = format!("@cd {};", entry.work_dir);
        target.push_str(&self.compile_command(spec, entry, elf));
        target.push(';');
        target.push_str(&self.objdump_command(elf, "ref.disass"));
        target.push_str(&self.sim_command(spec, entry, elf));
        if let Some(coverage) = coverage {
            target.push_str(&self.coverage_command(spec, entry, coverage));
        }
        target
    }
}

impl DutPlugin for SailCsim {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(
        &mut self,
        _suite: &Utf8Path,
        work_dir: &Utf8Path,
        archtest_env: &Utf8Path,
    ) -> Result<()> {
        self.compiler = toolchain::resolve(ENV_CC, "riscv64-unknown-elf-gcc");
        self.objdump = toolchain::resolve(ENV_OBJDUMP, "riscv64-unknown-elf-objdump");
        self.work_dir = work_dir.to_owned();
        self.archtest_env = archtest_env.to_owned();
        Ok(())
    }

    fn build(&mut self, isa_yaml: &Utf8Path, _platform_yaml: &Utf8Path) -> Result<()> {
        let spec = IsaSpec::load(isa_yaml)?;
        toolchain::require(&self.objdump)?;
        toolchain::require(&self.compiler)?;
        toolchain::require(self.sim_exe(spec.xlen()))?;
        toolchain::require(Utf8Path::new(&self.make))?;
        self.isa = Some(spec);
        Ok(())
    }

    fn run_tests(
        &mut self,
        tests: &[TestEntry],
        coverage: Option<&[Utf8PathBuf]>,
    ) -> Result<RunOutcome> {
        let spec = self.spec()?.clone();
        let mut make = MakeUtil::new(self.work_dir.join(format!("Makefile.{}", self.name)))?;
        make.set_make_command(&format!("{} -j{}", self.make, self.jobs));
        for entry in tests {
            make.add_target(&self.test_target(&spec, entry, coverage))?;
        }
        make.execute_all(&self.work_dir)?;
        Ok(RunOutcome::Completed)
    }
}
