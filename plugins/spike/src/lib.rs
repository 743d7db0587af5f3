//! DUT adapter for the Spike ISA simulator.
//!
//! Spike runs the conventional ELF, but the downstream hardware flow needs
//! a raw binary laid out for its own memory map, so every target compiles
//! the test twice: once against `env/link.ld` for Spike, once against
//! `env/link-hw.ld` for the hardware image that objcopy then flattens.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use riscof_dut_kit::{
    DutPlugin, IsaSpec, MakeUtil, PluginConfig, RunOutcome, TestEntry, toolchain,
};

const ENV_CC: &str = "RISCV_CC";
const ENV_OBJCOPY: &str = "RISCV_OBJCOPY";
const ENV_SPIKE: &str = "RISCV_SPIKE";

/// Which linker script a compile pass links against.
#[derive(Debug, Clone, Copy)]
enum LinkScript {
    /// Simulator image, `env/link.ld`.
    Sim,
    /// Hardware-target image, `env/link-hw.ld`.
    Hw,
}

impl LinkScript {
    fn file(self) -> &'static str {
        match self {
            LinkScript::Sim => "link.ld",
            LinkScript::Hw => "link-hw.ld",
        }
    }
}

pub struct Spike {
    name: String,
    jobs: u32,
    pluginpath: Utf8PathBuf,
    make: String,
    dut_exe: Utf8PathBuf,
    compiler: Utf8PathBuf,
    objcopy: Utf8PathBuf,
    work_dir: Utf8PathBuf,
    archtest_env: Utf8PathBuf,
    isa: Option<IsaSpec>,
}

impl Spike {
    pub fn new(config: &PluginConfig) -> Self {
        debug!("spike plugin created with configuration {config:?}");
        Self {
            name: "spike".to_string(),
            jobs: config.jobs,
            pluginpath: config.pluginpath.clone(),
            make: config.make.clone(),
            dut_exe: toolchain::resolve(ENV_SPIKE, config.path.join("spike")),
            compiler: Utf8PathBuf::new(),
            objcopy: Utf8PathBuf::new(),
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

    fn spec(&self) -> Result<&IsaSpec> {
        self.isa.as_ref().context("build() must run before tests")
    }

    fn compile_command(
        &self,
        spec: &IsaSpec,
        entry: &TestEntry,
        elf: &str,
        script: LinkScript,
    ) -> String {
        let mut cmd = format!(
            "{cc} -march={march} -DXLEN={xlen} -static -mcmodel=medany -fvisibility=hidden \
             -nostdlib -nostartfiles -T {plugin}/env/{script} -I {plugin}/env/ -I {env} \
             -mabi={abi} {test} -o {elf}",
            cc = self.compiler,
            march = spec.full_isa(),
            xlen = spec.xlen().bits(),
            plugin = self.pluginpath,
            script = script.file(),
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

    fn objcopy_command(&self, elf: &str, binary: &str) -> String {
        format!("{} -O binary {} {}", self.objcopy, elf, binary)
    }

    fn sim_command(&self, spec: &IsaSpec, entry: &TestEntry, elf: &str) -> String {
        let signature = entry.work_dir.join(format!("{}.signature", self.name));
        format!(
            "{spike} --isa={isa} +signature={signature} +signature-granularity=4 {elf}",
            spike = self.dut_exe,
            isa = spec.full_isa(),
        )
    }

    fn test_target(&self, spec: &IsaSpec, entry: &TestEntry) -> String {
        let compile = self.compile_command(spec, entry, "my.elf", LinkScript::Sim);
        let compile_hw = self.compile_command(spec, entry, "my-hw.elf", LinkScript::Hw);
        let objcopy = self.objcopy_command("my-hw.elf", "my.bin");
        let sim = self.sim_command(spec, entry, "my.elf");
        format!(
            "@cd {}; {}; {}; {}; {};",
            entry.work_dir, compile, compile_hw, objcopy, sim
        )
    }
}

impl DutPlugin for Spike {
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
        self.objcopy = toolchain::resolve(ENV_OBJCOPY, "riscv64-unknown-elf-objcopy");
        self.work_dir = work_dir.to_owned();
        self.archtest_env = archtest_env.to_owned();
        Ok(())
    }

    fn build(&mut self, isa_yaml: &Utf8Path, _platform_yaml: &Utf8Path) -> Result<()> {
        let spec = IsaSpec::load(isa_yaml)?;
        toolchain::require(&self.compiler)?;
        toolchain::require(&self.objcopy)?;
        toolchain::require(&self.dut_exe)?;
        toolchain::require(Utf8Path::new(&self.make))?;
        self.isa = Some(spec);
        Ok(())
    }

    /// Registers the targets and dispatches the build tool, then reports
    /// [`RunOutcome::Dispatched`]: per-test results for this flow are
    /// checked out of band against the hardware target, so the framework's
    /// own post-processing is deliberately skipped and the run counts as a
    /// success as soon as the dispatch returns.
    fn run_tests(
        &mut self,
        tests: &[TestEntry],
        coverage: Option<&[Utf8PathBuf]>,
    ) -> Result<RunOutcome> {
        if coverage.is_some() {
            warn!("coverage collection is not supported by the spike adapter; ignoring");
        }
        let spec = self.spec()?.clone();
        let mut make = MakeUtil::new(self.work_dir.join(format!("Makefile.{}", self.name)))?;
        make.set_make_command(&format!("{} -k -j{}", self.make, self.jobs));
        for entry in tests {
            make.add_target(&self.test_target(&spec, entry))?;
        }
        make.execute_all(&self.work_dir)?;
        Ok(RunOutcome::Dispatched)
    }
}
