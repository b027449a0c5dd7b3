//! ランタイム情報（停止位置とバックトレース）

use std::fmt;

/// デバッグセッション初期化の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// サーバーが発行したデバッグセッションID
    pub session_id: String,
}

/// 停止位置または終了状態のスナップショット
///
/// ステップ・再開のたびに丸ごと置き換えられます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    /// プログラムの所有スキーマ
    pub owner: Option<String>,
    /// プログラム名
    pub program: Option<String>,
    /// 行番号
    pub line: u32,
    /// コンテンツパートのインデックス（仕様部/本体部など）
    pub namespace: u32,
    /// デバッグ対象が終了したかどうか
    pub terminated: bool,
    /// 停止または終了の理由コード
    pub reason: i32,
}

impl RuntimeInfo {
    /// 停止位置を作成する
    pub fn at(owner: &str, program: &str, line: u32) -> Self {
        Self {
            owner: Some(owner.to_string()),
            program: Some(program.to_string()),
            line,
            namespace: 1,
            terminated: false,
            reason: 0,
        }
    }

    /// 終了状態を作成する
    pub fn terminated(reason: i32) -> Self {
        Self {
            owner: None,
            program: None,
            line: 0,
            namespace: 0,
            terminated: true,
            reason,
        }
    }

    /// 理由コードを設定する
    pub fn with_reason(mut self, reason: i32) -> Self {
        self.reason = reason;
        self
    }

    /// コンテンツパートを設定する
    pub fn with_namespace(mut self, namespace: u32) -> Self {
        self.namespace = namespace;
        self
    }

    /// 同じソース位置を指しているかどうか
    ///
    /// 理由コードと終了フラグは比較しません。
    pub fn is_same_location(&self, other: &RuntimeInfo) -> bool {
        self.owner == other.owner
            && self.program == other.program
            && self.line == other.line
            && self.namespace == other.namespace
    }

    /// `OWNER.PROGRAM` 形式の修飾名
    pub fn qualified_name(&self) -> Option<String> {
        match (&self.owner, &self.program) {
            (Some(owner), Some(program)) => Some(format!("{}.{}", owner, program)),
            (None, Some(program)) => Some(program.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terminated {
            return write!(f, "<terminated reason={}>", self.reason);
        }
        match self.qualified_name() {
            Some(name) => write!(f, "{}:{}", name, self.line),
            None => write!(f, "<anonymous>:{}", self.line),
        }
    }
}

/// 停止時点のコールスタック（内側のフレームが先頭）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacktraceInfo {
    pub frames: Vec<RuntimeInfo>,
}

impl BacktraceInfo {
    /// フレーム列からバックトレースを作成する
    pub fn new(frames: Vec<RuntimeInfo>) -> Self {
        Self { frames }
    }

    /// 最も内側のフレーム
    pub fn top(&self) -> Option<&RuntimeInfo> {
        self.frames.first()
    }

    /// フレーム数
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// フレームが空かどうか
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
