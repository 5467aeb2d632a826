use std::fs;
use std::path::Path;
use std::sync::Arc;

use peti_core::document::Document;
use peti_core::geometry::CoordCache;
use peti_core::props::{PropertyRegistry, builtin_registry};
use thiserror::Error;
use tracing::{debug, info};

pub mod errors;
pub mod parser;
pub mod tokenizer;
pub mod writer;

pub use errors::{FormatError, LexErrorKind, ParseError, ParseErrorKind, TokenizerError};
pub use parser::{ItemDataParser, ParseOptions, ParseWarning, ParsedItemData};
pub use writer::{export_document, export_item, write_document, write_item};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Syntax(#[from] FormatError),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

pub trait DocumentSaver {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError>;
}

/// 使用内建属性表解析一段文本，每次调用使用独立的坐标缓存。
pub fn parse_str(text: &str, source_name: &str) -> Result<Document, FormatError> {
    let cache = CoordCache::new();
    ItemDataParser::new(text, source_name, builtin_registry(), &cache)
        .parse()
        .map(|parsed| parsed.document)
}

/// `editoritems` 文件的读写入口。
#[derive(Debug, Clone)]
pub struct ItemDataFacade {
    registry: Arc<PropertyRegistry>,
    cache: Arc<CoordCache>,
    options: ParseOptions,
}

impl ItemDataFacade {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(builtin_registry().clone()),
            cache: Arc::new(CoordCache::new()),
            options: ParseOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_registry(mut self, registry: Arc<PropertyRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// 与其他解析会话共享坐标缓存。
    pub fn with_cache(mut self, cache: Arc<CoordCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn options(&self) -> ParseOptions {
        self.options
    }

    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<CoordCache> {
        &self.cache
    }

    pub fn parse_text(&self, text: &str, source_name: &str) -> Result<ParsedItemData, FormatError> {
        ItemDataParser::new(text, source_name, &self.registry, &self.cache)
            .with_options(self.options)
            .parse()
    }

    /// 读取并解析文件，同时返回非致命警告。
    pub fn load_with_warnings(&self, path: &Path) -> Result<ParsedItemData, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = self.parse_text(&data, &path.display().to_string())?;
        info!(
            path = %path.display(),
            items = parsed.document.len(),
            warnings = parsed.warnings.len(),
            "已加载物品定义"
        );
        Ok(parsed)
    }
}

impl Default for ItemDataFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader for ItemDataFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        self.load_with_warnings(path).map(|parsed| parsed.document)
    }
}

impl DocumentSaver for ItemDataFacade {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError> {
        let text = export_document(document);
        fs::write(path, text.as_bytes()).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), items = document.len(), "已写出物品定义");
        Ok(())
    }
}
