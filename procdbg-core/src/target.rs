//! デバッグ対象と実行入力

use crate::host::EntryPointResolver;
use procdbg_protocol::{ObjectType, ProgramPosition, SchemaId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 名前付き引数とその値（リテラルとしてそのまま埋め込まれる）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub value: String,
}

impl Argument {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// ストアドプログラムの呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodTarget {
    pub schema: String,
    /// スタンドアロンのプログラム名、またはパッケージ名
    pub program: String,
    /// パッケージ内のメンバー名
    pub member: Option<String>,
    pub object_type: ObjectType,
    pub arguments: Vec<Argument>,
}

impl MethodTarget {
    pub fn new(schema: &str, program: &str, object_type: ObjectType) -> Self {
        Self {
            schema: schema.to_ascii_uppercase(),
            program: program.to_ascii_uppercase(),
            member: None,
            object_type,
            arguments: Vec::new(),
        }
    }

    pub fn with_member(mut self, member: &str) -> Self {
        self.member = Some(member.to_ascii_uppercase());
        self
    }

    pub fn with_argument(mut self, name: &str, value: &str) -> Self {
        self.arguments.push(Argument::new(name, value));
        self
    }

    fn call_expression(&self) -> String {
        let args = self
            .arguments
            .iter()
            .map(|a| format!("{} => {}", a.name, a.value))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.qualified_name(), args)
    }

    /// `SCHEMA.PROGRAM[.MEMBER]`
    pub fn qualified_name(&self) -> String {
        match &self.member {
            Some(member) => format!("{}.{}.{}", self.schema, self.program, member),
            None => format!("{}.{}", self.schema, self.program),
        }
    }
}

/// 任意の文（無名ブロック）の実行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementTarget {
    pub text: String,
}

/// デバッグ対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugTarget {
    Method(MethodTarget),
    Statement(StatementTarget),
}

impl DebugTarget {
    pub fn statement(text: &str) -> Self {
        DebugTarget::Statement(StatementTarget {
            text: text.to_string(),
        })
    }

    /// エラー報告に使う修飾名
    pub fn qualified_name(&self) -> String {
        match self {
            DebugTarget::Method(m) => m.qualified_name(),
            DebugTarget::Statement(_) => "anonymous block".to_string(),
        }
    }

    /// ターゲット接続で実行する文
    pub fn invocation(&self) -> String {
        match self {
            DebugTarget::Method(m) if m.object_type == ObjectType::Function => format!(
                "DECLARE\n    result VARCHAR2(32767);\nBEGIN\n    result := {};\nEND;",
                m.call_expression()
            ),
            DebugTarget::Method(m) => format!("BEGIN\n    {};\nEND;", m.call_expression()),
            DebugTarget::Statement(s) => s.text.clone(),
        }
    }

    /// デフォルトブレークポイントの位置
    ///
    /// 文の実行には入口が無いため `None` です。
    pub fn default_breakpoint(&self, resolver: &dyn EntryPointResolver) -> Option<ProgramPosition> {
        match self {
            DebugTarget::Method(m) => resolver.resolve_entry(m),
            DebugTarget::Statement(_) => None,
        }
    }
}

/// 実行入力
///
/// キャンセルフラグは呼び出し機構と共有されます。
#[derive(Debug, Clone)]
pub struct ExecutionInput {
    target: DebugTarget,
    schema: SchemaId,
    cancelled: Arc<AtomicBool>,
}

impl ExecutionInput {
    pub fn new(target: DebugTarget, schema: SchemaId) -> Self {
        Self {
            target,
            schema,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn target(&self) -> &DebugTarget {
        &self.target
    }

    pub fn schema(&self) -> &SchemaId {
        &self.schema
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn set_cancelled(&self, cancelled: bool) {
        self.cancelled.store(cancelled, Ordering::SeqCst);
    }

    /// 共有キャンセルフラグ
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}
