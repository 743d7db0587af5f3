use std::collections::BTreeSet;

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Deserialize;

/// Register width of the target hart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Xlen {
    Rv32,
    Rv64,
}

impl Xlen {
    pub fn bits(self) -> u32 {
        match self {
            Xlen::Rv32 => 32,
            Xlen::Rv64 => 64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IsaYaml {
    hart0: HartNode,
}

#[derive(Debug, Deserialize)]
struct HartNode {
    supported_xlen: Vec<u32>,
    #[serde(rename = "ISA")]
    isa: String,
}

/// Hart description parsed from a riscv-config ISA YAML: the register width
/// and the set of supported extensions.
///
/// The derived ISA strings follow the canonical extension ordering
/// (`imafdc`, then the Z-extensions), not whatever order the YAML spells
/// them in. Simulators and toolchains parse the string positionally.
#[derive(Debug, Clone)]
pub struct IsaSpec {
    xlen: Xlen,
    extensions: BTreeSet<String>,
}

impl IsaSpec {
    /// Load the `hart0` description from an ISA YAML file.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ISA spec {path}"))?;
        Self::from_yaml_str(&text).with_context(|| format!("Malformed ISA spec {path}"))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let doc: IsaYaml = serde_yaml::from_str(text)?;
        let xlen = if doc.hart0.supported_xlen.contains(&64) {
            Xlen::Rv64
        } else {
            Xlen::Rv32
        };
        Ok(Self {
            xlen,
            extensions: parse_extensions(&doc.hart0.isa),
        })
    }

    pub fn xlen(&self) -> Xlen {
        self.xlen
    }

    /// Whether the hart supports an extension, e.g. `"M"` or `"Zicsr"`.
    pub fn has(&self, ext: &str) -> bool {
        self.extensions.contains(ext)
    }

    /// `rv<width>` plus the single-letter extensions in canonical order.
    pub fn base_isa(&self) -> String {
        let mut isa = format!("rv{}", self.xlen.bits());
        if self.has("I") {
            isa.push('i');
        }
        if self.has("M") {
            isa.push('m');
        }
        if self.has("A") {
            isa.push('a');
        }
        if self.has("F") {
            isa.push('f');
        }
        if self.has("D") {
            isa.push('d');
        }
        if self.has("C") {
            isa.push('c');
        }
        isa
    }

    /// [`base_isa`](Self::base_isa) plus the underscore-separated
    /// Z-extensions, in the order toolchains expect them.
    pub fn full_isa(&self) -> String {
        let mut isa = self.base_isa();
        for ext in ["Zicsr", "Zifencei", "Zba", "Zbb", "Zbc", "Zbs"] {
            if self.has(ext) {
                isa.push('_');
                isa.push_str(&ext.to_lowercase());
            }
        }
        isa
    }

    pub fn abi(&self) -> &'static str {
        match self.xlen {
            Xlen::Rv32 => "ilp32",
            Xlen::Rv64 => "lp64",
        }
    }
}

/// Split an ISA string like `RV32IMCZicsr_Zifencei` into its extension set.
///
/// A plain substring test is not good enough here: `Zicsr` contains a `C`
/// but does not imply the compressed extension.
fn parse_extensions(isa: &str) -> BTreeSet<String> {
    let body = isa
        .trim_start_matches(['R', 'r', 'V', 'v'])
        .trim_start_matches(|c: char| c.is_ascii_digit());

    let mut extensions = BTreeSet::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '_' {
            continue;
        }
        if c == 'Z' || c == 'z' {
            let mut name = String::from('Z');
            while let Some(&next) = chars.peek() {
                if next == '_' || next.is_ascii_uppercase() {
                    break;
                }
                name.push(next.to_ascii_lowercase());
                chars.next();
            }
            extensions.insert(name);
        } else if c.is_ascii_alphabetic() {
            extensions.insert(c.to_ascii_uppercase().to_string());
        }
    }
    extensions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(xlen: u32, isa: &str) -> IsaSpec {
        IsaSpec::from_yaml_str(&format!(
            "hart0:\n  supported_xlen: [{xlen}]\n  ISA: {isa}\n"
        ))
        .unwrap()
    }

    #[test]
    fn test_base_isa_canonical_order() {
        assert_eq!(spec(32, "RV32IMC").base_isa(), "rv32imc");
        assert_eq!(spec(64, "RV64IMAFDC").base_isa(), "rv64imafdc");
        // Declaration order in the YAML must not leak into the string.
        assert_eq!(spec(64, "RV64CDFAMI").base_isa(), "rv64imafdc");
    }

    #[test]
    fn test_full_isa_appends_z_extensions() {
        let spec = spec(32, "RV32IMCZicsr_Zifencei_Zba_Zbb_Zbc_Zbs");
        assert_eq!(
            spec.full_isa(),
            "rv32imc_zicsr_zifencei_zba_zbb_zbc_zbs"
        );
    }

    #[test]
    fn test_zicsr_does_not_imply_compressed() {
        let spec = spec(32, "RV32IZicsr");
        assert!(spec.has("Zicsr"));
        assert!(!spec.has("C"));
        assert_eq!(spec.base_isa(), "rv32i");
        assert_eq!(spec.full_isa(), "rv32i_zicsr");
    }

    #[test]
    fn test_abi_follows_xlen() {
        assert_eq!(spec(32, "RV32I").abi(), "ilp32");
        assert_eq!(spec(64, "RV64I").abi(), "lp64");
        assert_eq!(spec(32, "RV32I").xlen().bits(), 32);
        assert_eq!(spec(64, "RV64I").xlen().bits(), 64);
    }

    #[test]
    fn test_xlen_prefers_64() {
        let spec = IsaSpec::from_yaml_str(
            "hart0:\n  supported_xlen: [32, 64]\n  ISA: RV64I\n",
        )
        .unwrap();
        assert_eq!(spec.xlen(), Xlen::Rv64);
    }

    #[test]
    fn test_missing_hart_node_is_an_error() {
        assert!(IsaSpec::from_yaml_str("harts: []\n").is_err());
    }
}
