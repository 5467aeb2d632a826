//! 花括号/引号分隔文本的词法分析器。

use std::iter::Peekable;
use std::str::Chars;

use crate::errors::{FormatError, LexErrorKind, ParseError, ParseErrorKind, TokenizerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// 引号字符串或裸词。
    String(String),
    BraceOpen,
    BraceClose,
    Newline,
    Eof,
}

impl Token {
    /// 错误信息中对该记号的描述。
    pub fn describe(&self) -> String {
        match self {
            Token::String(value) => format!("字符串 \"{value}\""),
            Token::BraceOpen => "\"{\"".to_string(),
            Token::BraceClose => "\"}\"".to_string(),
            Token::Newline => "换行".to_string(),
            Token::Eof => "文件结尾".to_string(),
        }
    }
}

pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    source_name: String,
    line: usize,
    depth: usize,
    buffer: Option<Token>,
    allow_escapes: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str, source_name: impl Into<String>) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self {
            chars: text.chars().peekable(),
            source_name: source_name.into(),
            line: 1,
            depth: 0,
            buffer: None,
            allow_escapes: true,
        }
    }

    /// 是否解析引号字符串中的 `\n`、`\t`、`\\`、`\"` 转义。
    pub fn with_escapes(mut self, allow: bool) -> Self {
        self.allow_escapes = allow;
        self
    }

    #[inline]
    pub fn line(&self) -> usize {
        self.line
    }

    #[inline]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// 在当前位置构造解析错误。
    pub fn error(&self, kind: ParseErrorKind) -> FormatError {
        FormatError::Parse(ParseError {
            kind,
            line: self.line,
            source_name: self.source_name.clone(),
        })
    }

    fn lex_error(&self, kind: LexErrorKind, line: usize) -> FormatError {
        FormatError::Tokenizer(TokenizerError {
            kind,
            line,
            source_name: self.source_name.clone(),
        })
    }

    /// 回退一个记号，下次调用 [`Tokenizer::next_token`] 时返回。
    pub fn push_back(&mut self, token: Token) {
        if self.buffer.is_some() {
            panic!("内部错误：尝试多次回退记号");
        }
        self.buffer = Some(token);
    }

    pub fn next_token(&mut self) -> Result<Token, FormatError> {
        if let Some(token) = self.buffer.take() {
            return Ok(token);
        }
        loop {
            let Some(ch) = self.chars.next() else {
                return Ok(Token::Eof);
            };
            match ch {
                '\n' => {
                    self.line += 1;
                    return Ok(Token::Newline);
                }
                '{' => {
                    self.depth += 1;
                    return Ok(Token::BraceOpen);
                }
                '}' => {
                    if self.depth == 0 {
                        return Err(self.lex_error(LexErrorKind::UnbalancedBrace, self.line));
                    }
                    self.depth -= 1;
                    return Ok(Token::BraceClose);
                }
                '"' => return self.read_quoted(),
                '/' => {
                    if self.chars.peek() == Some(&'/') {
                        while let Some(&next) = self.chars.peek() {
                            if next == '\n' {
                                break;
                            }
                            self.chars.next();
                        }
                    } else {
                        return Err(self.lex_error(LexErrorKind::UnexpectedChar('/'), self.line));
                    }
                }
                '[' | ']' => {
                    return Err(self.lex_error(LexErrorKind::UnexpectedChar(ch), self.line));
                }
                ch if ch.is_whitespace() => continue,
                ch => return Ok(self.read_bare(ch)),
            }
        }
    }

    fn read_quoted(&mut self) -> Result<Token, FormatError> {
        let start_line = self.line;
        let mut value = String::new();
        loop {
            let Some(ch) = self.chars.next() else {
                return Err(self.lex_error(LexErrorKind::UnterminatedString, start_line));
            };
            match ch {
                '"' => return Ok(Token::String(value)),
                '\\' if self.allow_escapes => match self.chars.peek().copied() {
                    Some('n') => {
                        self.chars.next();
                        value.push('\n');
                    }
                    Some('t') => {
                        self.chars.next();
                        value.push('\t');
                    }
                    Some('\\') => {
                        self.chars.next();
                        value.push('\\');
                    }
                    Some('"') => {
                        self.chars.next();
                        value.push('"');
                    }
                    _ => value.push('\\'),
                },
                '\n' => {
                    self.line += 1;
                    value.push('\n');
                }
                ch => value.push(ch),
            }
        }
    }

    fn read_bare(&mut self, first: char) -> Token {
        let mut value = String::new();
        value.push(first);
        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() || matches!(ch, '{' | '}' | '"') {
                break;
            }
            value.push(ch);
            self.chars.next();
        }
        Token::String(value)
    }

    /// 返回下一个非换行记号。
    pub fn next_skipping_newlines(&mut self) -> Result<Token, FormatError> {
        loop {
            match self.next_token()? {
                Token::Newline => continue,
                token => return Ok(token),
            }
        }
    }

    /// 读取一个字符串值（跳过换行），否则报错。
    pub fn expect_string(&mut self) -> Result<String, FormatError> {
        match self.next_skipping_newlines()? {
            Token::String(value) => Ok(value),
            other => Err(self.error(ParseErrorKind::UnexpectedToken {
                expected: "字符串",
                found: other.describe(),
            })),
        }
    }

    pub fn expect_brace_open(&mut self) -> Result<(), FormatError> {
        match self.next_skipping_newlines()? {
            Token::BraceOpen => Ok(()),
            other => Err(self.error(ParseErrorKind::UnexpectedToken {
                expected: "\"{\"",
                found: other.describe(),
            })),
        }
    }

    /// 进入名为 `block` 的块：读取开头的 `{`。
    pub fn open_block(&mut self, block: &str) -> Result<(), FormatError> {
        match self.next_skipping_newlines()? {
            Token::BraceOpen => Ok(()),
            other => Err(self.error(ParseErrorKind::ExpectedBlock {
                block: block.to_string(),
                found: other.describe(),
            })),
        }
    }

    /// 块内的下一个键；遇到配对的 `}` 时返回 `None`。
    pub fn next_key(&mut self, block: &str) -> Result<Option<String>, FormatError> {
        match self.next_skipping_newlines()? {
            Token::String(key) => Ok(Some(key)),
            Token::BraceClose => Ok(None),
            Token::Eof => Err(self.error(ParseErrorKind::UnclosedBlock {
                block: block.to_string(),
            })),
            other => Err(self.error(ParseErrorKind::UnexpectedToken {
                expected: "键或 \"}\"",
                found: other.describe(),
            })),
        }
    }

    /// 跳过一个值：标量直接丢弃，块按花括号深度整体跳过。
    pub fn skip_value(&mut self, key: &str) -> Result<(), FormatError> {
        match self.next_skipping_newlines()? {
            Token::String(_) => Ok(()),
            Token::BraceOpen => {
                let mut level = 1usize;
                while level > 0 {
                    match self.next_token()? {
                        Token::BraceOpen => level += 1,
                        Token::BraceClose => level -= 1,
                        Token::Eof => {
                            return Err(self.error(ParseErrorKind::UnclosedBlock {
                                block: key.to_string(),
                            }));
                        }
                        Token::String(_) | Token::Newline => {}
                    }
                }
                Ok(())
            }
            other => Err(self.error(ParseErrorKind::UnexpectedToken {
                expected: "值或块",
                found: other.describe(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(text: &str) -> Result<Vec<Token>, FormatError> {
        let mut tok = Tokenizer::new(text, "test.txt");
        let mut tokens = Vec::new();
        loop {
            let token = tok.next_token()?;
            if token == Token::Eof {
                return Ok(tokens);
            }
            tokens.push(token);
        }
    }

    fn string(value: &str) -> Token {
        Token::String(value.to_string())
    }

    #[test]
    fn lexes_quoted_bare_braces_and_newlines() {
        let tokens = collect("\"Item\"\n\t{ Type \"ITEM_A\" }\n").unwrap();
        assert_eq!(
            tokens,
            vec![
                string("Item"),
                Token::Newline,
                Token::BraceOpen,
                string("Type"),
                string("ITEM_A"),
                Token::BraceClose,
                Token::Newline,
            ]
        );
    }

    #[test]
    fn skips_comments_and_bom() {
        let tokens = collect("\u{feff}// header\n\"a\" // trailing\n\"b\"").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Newline, string("a"), Token::Newline, string("b")]
        );
    }

    #[test]
    fn bare_words_stop_at_quotes_and_braces() {
        let tokens = collect("key\"value\"{x}").unwrap();
        assert_eq!(
            tokens,
            vec![
                string("key"),
                string("value"),
                Token::BraceOpen,
                string("x"),
                Token::BraceClose,
            ]
        );
    }

    #[test]
    fn handles_escapes_when_enabled() {
        let tokens = collect(r#""a\"b\\c\td\q""#).unwrap();
        assert_eq!(tokens, vec![string("a\"b\\c\td\\q")]);

        let mut tok = Tokenizer::new(r#""a\nb""#, "raw.txt").with_escapes(false);
        assert_eq!(tok.next_token().unwrap(), string("a\\nb"));
    }

    #[test]
    fn multiline_string_advances_line_counter() {
        let mut tok = Tokenizer::new("\"one\ntwo\" x", "m.txt");
        assert_eq!(tok.next_token().unwrap(), string("one\ntwo"));
        assert_eq!(tok.line(), 2);
    }

    #[test]
    fn reports_lexical_errors_with_line_and_file() {
        match collect("\n\n\"unterminated") {
            Err(FormatError::Tokenizer(err)) => {
                assert_eq!(err.kind, LexErrorKind::UnterminatedString);
                assert_eq!(err.line, 3);
                assert_eq!(err.source_name, "test.txt");
            }
            other => panic!("期望词法错误，实际为 {other:?}"),
        }
        match collect("a / b") {
            Err(FormatError::Tokenizer(err)) => {
                assert_eq!(err.kind, LexErrorKind::UnexpectedChar('/'))
            }
            other => panic!("期望词法错误，实际为 {other:?}"),
        }
        match collect("{ }\n}") {
            Err(FormatError::Tokenizer(err)) => {
                assert_eq!(err.kind, LexErrorKind::UnbalancedBrace);
                assert_eq!(err.line, 2);
            }
            other => panic!("期望词法错误，实际为 {other:?}"),
        }
    }

    #[test]
    fn block_iteration_yields_keys_until_close() {
        let mut tok = Tokenizer::new("{\n \"a\" \"1\"\n b 2 }", "blk.txt");
        tok.open_block("Test").unwrap();
        let mut pairs = Vec::new();
        while let Some(key) = tok.next_key("Test").unwrap() {
            pairs.push((key, tok.expect_string().unwrap()));
        }
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
        assert_eq!(tok.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn unclosed_block_is_a_parse_error() {
        let mut tok = Tokenizer::new("{ \"a\" \"1\"", "eof.txt");
        tok.open_block("Editor").unwrap();
        assert!(tok.next_key("Editor").unwrap().is_some());
        tok.expect_string().unwrap();
        match tok.next_key("Editor") {
            Err(FormatError::Parse(err)) => {
                assert_eq!(
                    err.kind,
                    ParseErrorKind::UnclosedBlock {
                        block: "Editor".to_string()
                    }
                );
                assert_eq!(err.source_name, "eof.txt");
            }
            other => panic!("期望解析错误，实际为 {other:?}"),
        }
    }

    #[test]
    fn skip_value_consumes_scalars_and_nested_blocks() {
        let mut tok = Tokenizer::new("\"x\" { a { b c } d } tail", "skip.txt");
        tok.skip_value("Scalar").unwrap();
        tok.skip_value("Nested").unwrap();
        assert_eq!(tok.next_token().unwrap(), string("tail"));
    }

    #[test]
    fn push_back_returns_token_first() {
        let mut tok = Tokenizer::new("a b", "pb.txt");
        let first = tok.next_token().unwrap();
        tok.push_back(first.clone());
        assert_eq!(tok.next_token().unwrap(), first);
        assert_eq!(tok.next_token().unwrap(), string("b"));
    }
}
