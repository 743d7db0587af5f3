use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::Error;

fn default_jobs() -> u32 {
    1
}

fn default_make() -> String {
    "make".to_string()
}

/// One plugin's node from the run configuration file.
///
/// Every key the host framework may omit carries its default here, so the
/// rest of the adapter never has to ask "is the key present?".
#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    /// Parallel jobs handed to the build tool.
    #[serde(default = "default_jobs")]
    pub jobs: u32,
    /// Directory holding the plugin's `env/` linker scripts and headers.
    pub pluginpath: Utf8PathBuf,
    /// riscv-config ISA description of the DUT.
    pub ispec: Utf8PathBuf,
    /// riscv-config platform description of the DUT.
    pub pspec: Utf8PathBuf,
    /// Directory prefixed to the default simulator binary names.
    #[serde(rename = "PATH", default)]
    pub path: Utf8PathBuf,
    /// Build tool override.
    #[serde(default = "default_make")]
    pub make: String,
}

impl PluginConfig {
    /// Load the node named `plugin` from a configuration file. A missing
    /// node is a fatal setup error: without at least the spec paths the
    /// adapter cannot do anything useful.
    pub fn load(file: &Utf8Path, plugin: &str) -> Result<Self> {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read configuration {file}"))?;
        let mut doc: std::collections::BTreeMap<String, serde_yaml::Value> =
            serde_yaml::from_str(&text).with_context(|| format!("Malformed configuration {file}"))?;
        let node = doc
            .remove(plugin)
            .ok_or_else(|| Error::MissingConfig(plugin.to_string()))?;
        let config = serde_yaml::from_value(node)
            .with_context(|| format!("Malformed config node for {plugin}"))?;
        Ok(config)
    }

    /// Resolve the path-valued fields against `base` so later directory
    /// changes inside generated targets cannot reinterpret them.
    pub fn absolutize(mut self, base: &Utf8Path) -> Self {
        for field in [
            &mut self.pluginpath,
            &mut self.ispec,
            &mut self.pspec,
            &mut self.path,
        ] {
            if !field.as_str().is_empty() && field.is_relative() {
                let joined = base.join(field.as_path());
                *field = joined;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = "\
sail_cSim:
  pluginpath: plugins/sail-csim
  ispec: specs/isa.yaml
  pspec: specs/platform.yaml
  jobs: 4
spike:
  pluginpath: /opt/plugins/spike
  ispec: /opt/specs/isa.yaml
  pspec: /opt/specs/platform.yaml
  PATH: /opt/spike/bin
  make: gmake
";

    fn config_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_applied() {
        let file = config_file();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let config = PluginConfig::load(path, "sail_cSim").unwrap();
        assert_eq!(config.jobs, 4);
        assert_eq!(config.make, "make");
        assert_eq!(config.path, Utf8PathBuf::new());
    }

    #[test]
    fn test_overrides_win() {
        let file = config_file();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let config = PluginConfig::load(path, "spike").unwrap();
        assert_eq!(config.make, "gmake");
        assert_eq!(config.path, Utf8PathBuf::from("/opt/spike/bin"));
        assert_eq!(config.jobs, 1);
    }

    #[test]
    fn test_missing_node_is_fatal() {
        let file = config_file();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let err = PluginConfig::load(path, "qemu").unwrap_err();
        let err = err.downcast::<Error>().unwrap();
        assert!(matches!(err, Error::MissingConfig(name) if name == "qemu"));
    }

    #[test]
    fn test_absolutize_leaves_absolute_and_empty_alone() {
        let file = config_file();
        let path = Utf8Path::from_path(file.path()).unwrap();
        let config = PluginConfig::load(path, "sail_cSim")
            .unwrap()
            .absolutize(Utf8Path::new("/work"));
        assert_eq!(config.pluginpath, Utf8PathBuf::from("/work/plugins/sail-csim"));
        assert_eq!(config.ispec, Utf8PathBuf::from("/work/specs/isa.yaml"));
        assert_eq!(config.path, Utf8PathBuf::new());

        let config = PluginConfig::load(path, "spike")
            .unwrap()
            .absolutize(Utf8Path::new("/work"));
        assert_eq!(config.pluginpath, Utf8PathBuf::from("/opt/plugins/spike"));
    }
}
