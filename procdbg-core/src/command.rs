//! デバッガコマンド

use crate::executor::DebugOperation;

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ブレークポイントを設定
    Break(String),
    /// ブレークポイントを削除
    Delete(String),
    /// ブレークポイントを有効化
    Enable(String),
    /// ブレークポイントを一時的に無効化
    Disable(String),
    /// 実行継続
    Continue,
    /// ステップ実行（呼び出しに入る）
    Step,
    /// 次の行へ
    Next,
    /// 現在のプログラムから抜けるまで実行
    Finish,
    /// 指定位置まで実行
    Until(String),
    /// 一時停止
    Pause,
    /// バックトレース表示
    Backtrace,
    /// ブレークポイント一覧表示
    InfoBreakpoints,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.trim().split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }
        let rest = || {
            if parts.len() > 1 {
                Some(parts[1..].join(" "))
            } else {
                None
            }
        };

        match parts[0] {
            "break" | "b" => rest().map(Command::Break),
            "delete" | "d" => rest().map(Command::Delete),
            "enable" => rest().map(Command::Enable),
            "disable" => rest().map(Command::Disable),
            "continue" | "c" => Some(Command::Continue),
            "step" | "s" => Some(Command::Step),
            "next" | "n" => Some(Command::Next),
            "finish" | "f" => Some(Command::Finish),
            "until" | "u" => rest().map(Command::Until),
            "pause" => Some(Command::Pause),
            "backtrace" | "bt" => Some(Command::Backtrace),
            "info" => match parts.get(1) {
                Some(&"breakpoints") | Some(&"b") => Some(Command::InfoBreakpoints),
                _ => None,
            },
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }

    /// 引数を持たない実行制御コマンドのデバッグ操作
    pub fn operation(&self) -> Option<DebugOperation> {
        match self {
            Command::Continue => Some(DebugOperation::Resume),
            Command::Step => Some(DebugOperation::StepInto),
            Command::Next => Some(DebugOperation::StepOver),
            Command::Finish => Some(DebugOperation::StepOut),
            Command::Pause => Some(DebugOperation::Pause),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("continue"), Some(Command::Continue));
        assert_eq!(Command::parse("c"), Some(Command::Continue));
        assert_eq!(Command::parse("step"), Some(Command::Step));
        assert_eq!(Command::parse("info breakpoints"), Some(Command::InfoBreakpoints));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
        assert_eq!(Command::parse("   "), None);
        assert_eq!(Command::parse("info"), None);
    }

    #[test]
    fn test_parse_location_arguments() {
        assert_eq!(
            Command::parse("b hr.pay_raise:10"),
            Some(Command::Break("hr.pay_raise:10".to_string()))
        );
        assert_eq!(
            Command::parse("until package body hr.payroll:12"),
            Some(Command::Until("package body hr.payroll:12".to_string()))
        );
        assert_eq!(Command::parse("break"), None);
    }

    #[test]
    fn test_operation_mapping() {
        assert_eq!(Command::Next.operation(), Some(DebugOperation::StepOver));
        assert_eq!(Command::Step.operation(), Some(DebugOperation::StepInto));
        assert_eq!(Command::Finish.operation(), Some(DebugOperation::StepOut));
        assert_eq!(Command::Backtrace.operation(), None);
    }
}
