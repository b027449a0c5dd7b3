//! パース関連のユーティリティ関数

use anyhow::{bail, Result};
use procdbg_protocol::{ObjectType, ProgramPosition};

/// 位置文字列をプログラム位置にパース
///
/// `SCHEMA.PROGRAM:LINE` 形式。先頭にオブジェクト種別を付けることもできます。
///
/// # Examples
/// ```
/// use procdbg_core::parse::parse_location;
/// use procdbg_protocol::ObjectType;
///
/// let pos = parse_location("hr.pay_raise:10", ObjectType::Procedure).unwrap();
/// assert_eq!(pos.to_string(), "HR.PAY_RAISE:10");
///
/// let pos = parse_location("package body hr.payroll:12", ObjectType::Procedure).unwrap();
/// assert_eq!(pos.object_type, ObjectType::PackageBody);
/// ```
pub fn parse_location(s: &str, default_type: ObjectType) -> Result<ProgramPosition> {
    let s = s.trim();
    let (object_type, location) = match s.rsplit_once(char::is_whitespace) {
        Some((prefix, location)) => match ObjectType::parse(prefix) {
            Some(object_type) => (object_type, location),
            None => bail!("Unknown object type '{}'", prefix.trim()),
        },
        None => (default_type, s),
    };

    match ProgramPosition::parse(location, object_type) {
        Some(pos) => Ok(pos),
        None => bail!("Invalid location '{}': expected SCHEMA.PROGRAM:LINE", location),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location_default_type() {
        let pos = parse_location(" hr.pay_raise:10 ", ObjectType::Procedure).unwrap();
        assert_eq!(pos.schema, "HR");
        assert_eq!(pos.program, "PAY_RAISE");
        assert_eq!(pos.object_type, ObjectType::Procedure);
        assert_eq!(pos.line, 10);
    }

    #[test]
    fn test_parse_location_with_type() {
        let pos = parse_location("function hr.bonus:3", ObjectType::Procedure).unwrap();
        assert_eq!(pos.object_type, ObjectType::Function);
        let pos = parse_location("PACKAGE BODY hr.payroll:12", ObjectType::Procedure).unwrap();
        assert_eq!(pos.object_type, ObjectType::PackageBody);
    }

    #[test]
    fn test_parse_location_invalid() {
        assert!(parse_location("view hr.v:1", ObjectType::Procedure).is_err());
        assert!(parse_location("hr.pay_raise", ObjectType::Procedure).is_err());
        assert!(parse_location("pay_raise:10", ObjectType::Procedure).is_err());
    }
}
