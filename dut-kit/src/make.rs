use std::fs::OpenOptions;
use std::io::Write;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use xshell::{Shell, cmd};

/// Registry of generated build targets, backed by a Makefile.
///
/// Targets are auto-named `TARGET0`, `TARGET1`, … in insertion order and
/// executed by a single invocation of the external build tool, which owns
/// all parallelism. The registry never inspects per-target results; the
/// build tool's aggregate exit status is all the caller gets.
pub struct MakeUtil {
    makefile: Utf8PathBuf,
    make_command: Vec<String>,
    targets: Vec<String>,
}

impl MakeUtil {
    /// Create a registry writing to `makefile`. A stale file left over from
    /// a previous run is deleted so none of its targets leak into this one.
    pub fn new(makefile: impl Into<Utf8PathBuf>) -> Result<Self> {
        let makefile = makefile.into();
        if makefile.exists() {
            std::fs::remove_file(&makefile)
                .with_context(|| format!("Failed to remove stale {makefile}"))?;
        }
        Ok(Self {
            makefile,
            make_command: vec!["make".to_string()],
            targets: Vec::new(),
        })
    }

    /// Replace the build-tool command line, e.g. `make -k -j4`.
    pub fn set_make_command(&mut self, command: &str) {
        self.make_command = command.split_whitespace().map(str::to_string).collect();
    }

    /// Register `command` as the next target and append it to the Makefile.
    pub fn add_target(&mut self, command: &str) -> Result<()> {
        let name = format!("TARGET{}", self.targets.len());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.makefile)
            .with_context(|| format!("Failed to open {}", self.makefile))?;
        write!(
            file,
            "\n\n.PHONY : {name}\n{name} :\n\t{}",
            command.replace('\n', "\n\t")
        )?;
        self.targets.push(name);
        Ok(())
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Run every registered target through the external build tool, from
    /// `cwd`. Returns an error when the tool's aggregate status is nonzero.
    pub fn execute_all(&self, cwd: &Utf8Path) -> Result<()> {
        let (program, args) = self
            .make_command
            .split_first()
            .context("Empty build-tool command")?;
        let sh = Shell::new()?;
        sh.change_dir(cwd);
        let makefile = &self.makefile;
        let targets = &self.targets;
        cmd!(sh, "{program} {args...} -f {makefile} {targets...}")
            .run()
            .context("Build tool reported failing targets")?;
        Ok(())
    }
}
