//! サーバー側ブレークポイントの型

use std::fmt;

/// サーバーが割り当てるブレークポイントID
pub type BreakpointId = i32;

/// デバッグ対象となるプログラムオブジェクトの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Procedure,
    Function,
    Package,
    PackageBody,
    Trigger,
    Type,
    TypeBody,
}

impl ObjectType {
    /// プロトコルに渡す大文字の型名
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Procedure => "PROCEDURE",
            ObjectType::Function => "FUNCTION",
            ObjectType::Package => "PACKAGE",
            ObjectType::PackageBody => "PACKAGE BODY",
            ObjectType::Trigger => "TRIGGER",
            ObjectType::Type => "TYPE",
            ObjectType::TypeBody => "TYPE BODY",
        }
    }

    /// 型名文字列をパースする（大文字小文字は区別しない）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PROCEDURE" => Some(ObjectType::Procedure),
            "FUNCTION" => Some(ObjectType::Function),
            "PACKAGE" => Some(ObjectType::Package),
            "PACKAGE BODY" | "PACKAGE_BODY" => Some(ObjectType::PackageBody),
            "TRIGGER" => Some(ObjectType::Trigger),
            "TYPE" => Some(ObjectType::Type),
            "TYPE BODY" | "TYPE_BODY" => Some(ObjectType::TypeBody),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// プログラム内の位置 (schema, program, type, line)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramPosition {
    pub schema: String,
    pub program: String,
    pub object_type: ObjectType,
    pub line: u32,
}

impl ProgramPosition {
    pub fn new(schema: &str, program: &str, object_type: ObjectType, line: u32) -> Self {
        Self {
            schema: schema.to_string(),
            program: program.to_string(),
            object_type,
            line,
        }
    }

    /// `SCHEMA.PROGRAM:LINE` 形式の位置文字列をパースする
    ///
    /// オブジェクト種別は指定されたデフォルト値を使用します。
    pub fn parse(s: &str, object_type: ObjectType) -> Option<Self> {
        let (name, line) = s.trim().rsplit_once(':')?;
        let line = line.trim().parse::<u32>().ok()?;
        let (schema, program) = name.split_once('.')?;
        if schema.is_empty() || program.is_empty() {
            return None;
        }
        Some(Self::new(
            &schema.to_ascii_uppercase(),
            &program.to_ascii_uppercase(),
            object_type,
            line,
        ))
    }
}

impl fmt::Display for ProgramPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.schema, self.program, self.line)
    }
}

/// ブレークポイント追加の結果
///
/// サーバーは例外ではなくエラー文字列で失敗を返すことがあります。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BreakpointInfo {
    pub breakpoint_id: Option<BreakpointId>,
    pub error: Option<String>,
}

impl BreakpointInfo {
    /// 成功したブレークポイント
    pub fn ok(id: BreakpointId) -> Self {
        Self {
            breakpoint_id: Some(id),
            error: None,
        }
    }

    /// サーバーに拒否されたブレークポイント
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            breakpoint_id: None,
            error: Some(error.into()),
        }
    }
}

/// ブレークポイントの有効化・無効化・削除の結果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BreakpointOperationInfo {
    pub error: Option<String>,
}

impl BreakpointOperationInfo {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position() {
        let pos = ProgramPosition::parse("hr.pay_raise:12", ObjectType::Procedure).unwrap();
        assert_eq!(pos.schema, "HR");
        assert_eq!(pos.program, "PAY_RAISE");
        assert_eq!(pos.line, 12);
        assert_eq!(pos.to_string(), "HR.PAY_RAISE:12");
    }

    #[test]
    fn test_parse_position_invalid() {
        assert!(ProgramPosition::parse("pay_raise:12", ObjectType::Procedure).is_none());
        assert!(ProgramPosition::parse("hr.pay_raise", ObjectType::Procedure).is_none());
        assert!(ProgramPosition::parse("hr.pay_raise:x", ObjectType::Procedure).is_none());
    }

    #[test]
    fn test_object_type_roundtrip_names() {
        assert_eq!(ObjectType::parse("package body"), Some(ObjectType::PackageBody));
        assert_eq!(ObjectType::PackageBody.as_str(), "PACKAGE BODY");
        assert_eq!(ObjectType::parse("view"), None);
    }
}
