use peti_core::geometry::{Coord, CoordError, VectorError};
use peti_core::props::PropertyValueError;
use peti_core::vocab::DirectionError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("字符串缺少结束引号")]
    UnterminatedString,
    #[error("意外的字符 '{0}'")]
    UnexpectedChar(char),
    #[error("多余的 \"}}\"")]
    UnbalancedBrace,
}

/// 词法错误，附带出错行号与来源名称。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_name}:{line}: {kind}")]
pub struct TokenizerError {
    pub kind: LexErrorKind,
    pub line: usize,
    pub source_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("{context} 中出现未知的键 \"{key}\"")]
    UnknownKey { context: String, key: String },
    #[error("{context} 缺少必需的 {field}")]
    MissingField {
        context: &'static str,
        field: &'static str,
    },
    #[error("{context} 重复设置了 {field}")]
    DuplicateField {
        context: &'static str,
        field: &'static str,
    },
    #[error("未知的{what} \"{value}\"")]
    InvalidValue { what: &'static str, value: String },
    #[error("{key} 的值 \"{value}\" 不是有效整数")]
    InvalidNumber { key: String, value: String },
    #[error("{key} 的值 \"{value}\" 不是有效布尔值")]
    InvalidBool { key: String, value: String },
    #[error("{key}: {source}")]
    InvalidVector {
        key: String,
        #[source]
        source: VectorError,
    },
    #[error("{key}: {source}")]
    InvalidCoord {
        key: String,
        #[source]
        source: CoordError,
    },
    #[error("无效的连接方向 \"{value}\": {source}")]
    InvalidDirection {
        value: String,
        #[source]
        source: DirectionError,
    },
    #[error("默认值 \"{value}\" 对属性 {id} 无效: {source}")]
    InvalidProperty {
        id: String,
        value: String,
        #[source]
        source: PropertyValueError,
    },
    #[error("实例索引 \"{value}\" 不能为负数")]
    NegativeInstanceIndex { value: String },
    #[error("实例索引 \"{value}\" 超过上限 {limit}")]
    InstanceIndexTooLarge { value: String, limit: usize },
    #[error("体积 {pos1} 到 {pos2} 包含 {count} 个体素，超过上限 {limit}")]
    VolumeTooLarge {
        pos1: Coord,
        pos2: Coord,
        count: u64,
        limit: u64,
    },
    #[error("期望 {expected}，实际为 {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    #[error("{block} 之后期望 \"{{\"，实际为 {found}")]
    ExpectedBlock { block: String, found: String },
    #[error("文件在 {block} 块结束前终止")]
    UnclosedBlock { block: String },
    #[error("缺少 \"ItemData\" 块，实际为 {found}")]
    MissingItemData { found: String },
}

/// 结构错误，附带出错行号与来源名称。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_name}:{line}: {kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
    pub source_name: String,
}

/// 解析过程中的致命错误。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl FormatError {
    pub fn line(&self) -> usize {
        match self {
            FormatError::Tokenizer(err) => err.line,
            FormatError::Parse(err) => err.line,
        }
    }

    pub fn source_name(&self) -> &str {
        match self {
            FormatError::Tokenizer(err) => &err.source_name,
            FormatError::Parse(err) => &err.source_name,
        }
    }

    /// 结构错误的具体类别；词法错误返回 `None`。
    pub fn parse_kind(&self) -> Option<&ParseErrorKind> {
        match self {
            FormatError::Parse(err) => Some(&err.kind),
            FormatError::Tokenizer(_) => None,
        }
    }
}
