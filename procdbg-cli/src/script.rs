//! シミュレーション用のプログラム台本
//!
//! モックサーバーが再生する実行トレースを TOML から読み込みます。
//!
//! ```toml
//! schema = "HR"
//! program = "PAY_RAISE"
//! object_type = "procedure"
//! entry_line = 3
//!
//! [[argument]]
//! name = "P_EMP_ID"
//! value = "100"
//!
//! [[step]]
//! stack = ["HR.PAY_RAISE:3", "HR.ANON:1"]
//! ```

use anyhow::{anyhow, bail, Context, Result};
use procdbg_core::{DebugTarget, EntryPointResolver, MethodTarget};
use procdbg_protocol::{ObjectType, ProgramPosition, RuntimeInfo};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    schema: String,
    program: String,
    member: Option<String>,
    #[serde(default = "default_object_type")]
    object_type: String,
    entry_line: Option<u32>,
    #[serde(default, rename = "argument")]
    arguments: Vec<ScriptArgument>,
    #[serde(rename = "step")]
    steps: Vec<ScriptStep>,
}

#[derive(Debug, Deserialize)]
struct ScriptArgument {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ScriptStep {
    stack: Vec<String>,
}

fn default_object_type() -> String {
    "procedure".to_string()
}

/// 読み込み済みの台本
#[derive(Debug, Clone)]
pub struct ProgramScript {
    pub target: MethodTarget,
    pub entry_line: Option<u32>,
    pub trace: Vec<Vec<RuntimeInfo>>,
}

impl ProgramScript {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid script {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: ScriptFile = toml::from_str(s)?;
        let object_type = ObjectType::parse(&file.object_type)
            .ok_or_else(|| anyhow!("Unknown object type '{}'", file.object_type))?;
        if file.steps.is_empty() {
            bail!("Script has no steps");
        }

        let mut target = MethodTarget::new(&file.schema, &file.program, object_type);
        if let Some(member) = &file.member {
            target = target.with_member(member);
        }
        for arg in &file.arguments {
            target = target.with_argument(&arg.name, &arg.value);
        }

        let trace = file
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| parse_stack(&step.stack).with_context(|| format!("step {}", i + 1)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            target,
            entry_line: file.entry_line,
            trace,
        })
    }

    /// 組み込みのデモ台本
    ///
    /// HR.PAY_RAISE が10行目で HR.BONUS を呼び出します。
    pub fn demo() -> Self {
        let frames: &[&[(&str, &str, u32)]] = &[
            &[("HR", "ANON", 1)],
            &[("HR", "PAY_RAISE", 3), ("HR", "ANON", 1)],
            &[("HR", "PAY_RAISE", 10), ("HR", "ANON", 1)],
            &[("HR", "BONUS", 2), ("HR", "PAY_RAISE", 10), ("HR", "ANON", 1)],
            &[("HR", "BONUS", 3), ("HR", "PAY_RAISE", 10), ("HR", "ANON", 1)],
            &[("HR", "PAY_RAISE", 11), ("HR", "ANON", 1)],
            &[("HR", "PAY_RAISE", 12), ("HR", "ANON", 1)],
            &[("HR", "ANON", 2)],
        ];
        Self {
            target: MethodTarget::new("HR", "PAY_RAISE", ObjectType::Procedure)
                .with_argument("P_EMP_ID", "100"),
            entry_line: Some(3),
            trace: frames
                .iter()
                .map(|stack| procdbg_protocol::mock::stack(stack))
                .collect(),
        }
    }

    pub fn debug_target(&self) -> DebugTarget {
        DebugTarget::Method(self.target.clone())
    }

    pub fn entry_resolver(&self) -> ScriptEntry {
        ScriptEntry {
            schema: self.target.schema.clone(),
            program: self.target.program.clone(),
            line: self.entry_line,
        }
    }
}

/// `OWNER.PROGRAM:LINE` の列をコールスタックに変換する
fn parse_stack(frames: &[String]) -> Result<Vec<RuntimeInfo>> {
    if frames.is_empty() {
        bail!("empty stack");
    }
    frames
        .iter()
        .map(|frame| {
            let (name, line) = frame
                .rsplit_once(':')
                .ok_or_else(|| anyhow!("Invalid frame '{}'", frame))?;
            let (owner, program) = name
                .split_once('.')
                .ok_or_else(|| anyhow!("Invalid frame '{}'", frame))?;
            let line = line
                .parse::<u32>()
                .with_context(|| format!("Invalid line in frame '{}'", frame))?;
            Ok(RuntimeInfo::at(
                &owner.to_ascii_uppercase(),
                &program.to_ascii_uppercase(),
                line,
            ))
        })
        .collect()
}

/// 台本の入口行を返すリゾルバ
pub struct ScriptEntry {
    schema: String,
    program: String,
    line: Option<u32>,
}

impl EntryPointResolver for ScriptEntry {
    fn resolve_entry(&self, target: &MethodTarget) -> Option<ProgramPosition> {
        if target.schema != self.schema || target.program != self.program {
            return None;
        }
        self.line
            .map(|line| ProgramPosition::new(&target.schema, &target.program, target.object_type, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
schema = "hr"
program = "bonus"
object_type = "function"
entry_line = 2

[[argument]]
name = "P_AMOUNT"
value = "10"

[[step]]
stack = ["hr.anon:1"]

[[step]]
stack = ["HR.BONUS:2", "HR.ANON:1"]
"#;

    #[test]
    fn test_load_script() {
        let script = ProgramScript::from_toml_str(SCRIPT).unwrap();
        assert_eq!(script.target.qualified_name(), "HR.BONUS");
        assert_eq!(script.target.object_type, ObjectType::Function);
        assert_eq!(script.trace.len(), 2);
        assert_eq!(script.trace[1].len(), 2);
        assert_eq!(script.trace[1][0].line, 2);
        assert_eq!(script.trace[0][0].owner.as_deref(), Some("HR"));
    }

    #[test]
    fn test_load_script_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, SCRIPT.as_bytes()).unwrap();
        let script = ProgramScript::load(file.path()).unwrap();
        assert_eq!(script.entry_line, Some(2));
    }

    #[test]
    fn test_invalid_scripts() {
        assert!(ProgramScript::from_toml_str("schema = \"HR\"\nprogram = \"P\"\nstep = []").is_err());
        let bad_frame = "schema = \"HR\"\nprogram = \"P\"\n[[step]]\nstack = [\"HR.P\"]";
        assert!(ProgramScript::from_toml_str(bad_frame).is_err());
        let bad_type = "schema = \"HR\"\nprogram = \"P\"\nobject_type = \"view\"\n[[step]]\nstack = [\"HR.P:1\"]";
        assert!(ProgramScript::from_toml_str(bad_type).is_err());
    }

    #[test]
    fn test_entry_resolver_matches_target() {
        let script = ProgramScript::demo();
        let resolver = script.entry_resolver();
        let entry = resolver.resolve_entry(&script.target).unwrap();
        assert_eq!(entry.to_string(), "HR.PAY_RAISE:3");

        let other = MethodTarget::new("HR", "BONUS", ObjectType::Function);
        assert!(resolver.resolve_entry(&other).is_none());
    }
}
