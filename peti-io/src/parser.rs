//! `editoritems` 物品定义文件的递归下降解析器。
//!
//! 每一层嵌套块对应一个独立的解析函数，共享同一个 [`Tokenizer`]。

use std::collections::BTreeMap;
use std::fmt;

use peti_core::document::{
    CUSTOM_INSTANCE_PREFIX, Document, ICON_EXTENSION, InstanceSlot, Item, MAX_INSTANCE_INDEX,
    MAX_VOLUME_VOXELS, Palette, Renderable, SubType, normalize_extension,
};
use peti_core::geometry::{
    AntlinePoint, Coord, CoordCache, CoordError, EmbedFace, Overlay, Vec3, box_volume,
};
use peti_core::props::{PropertyRegistry, parse_bool};
use peti_core::vocab::{
    Anim, ConnSide, DesiredFacing, FaceType, Handle, ItemClass, RenderableKind, Sound, Surface,
};
use tracing::{debug, warn};

use crate::errors::{FormatError, ParseErrorKind};
use crate::tokenizer::{Token, Tokenizer};

/// 解析行为开关。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// 是否解析引号字符串中的反斜杠转义。
    pub allow_escapes: bool,
    /// 为真时 `CanAnchorOnGoo` 写入 `anchor_barriers`，与现存文件的行为一致。
    pub legacy_goo_anchor: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            allow_escapes: true,
            legacy_goo_anchor: true,
        }
    }
}

/// 不中断解析的问题。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// 同一 ID 再次声明，后者覆盖前者。
    DuplicateItem { id: String, line: usize },
    /// 自定义实例名称缺少 `bee2_` 前缀。
    MissingInstancePrefix {
        item: String,
        name: String,
        line: usize,
    },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::DuplicateItem { id, line } => {
                write!(f, "第 {line} 行：物品 {id} 重复声明")
            }
            ParseWarning::MissingInstancePrefix { item, name, line } => write!(
                f,
                "第 {line} 行：物品 {item} 的自定义实例 \"{name}\" 缺少 {CUSTOM_INSTANCE_PREFIX} 前缀"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItemData {
    pub document: Document,
    pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Clone, Copy)]
enum EditorFlag {
    AnchorBarriers,
    AnchorGoo,
    OccupiesVoxel,
    Copiable,
    Deletable,
    PseudoHandle,
}

/// `Editor` 块中的布尔键。
const EDITOR_FLAGS: &[(&str, EditorFlag)] = &[
    ("cananchoronbarriers", EditorFlag::AnchorBarriers),
    ("cananchorongoo", EditorFlag::AnchorGoo),
    ("occupiesvoxel", EditorFlag::OccupiesVoxel),
    ("copyable", EditorFlag::Copiable),
    ("deletable", EditorFlag::Deletable),
    ("pseudohandle", EditorFlag::PseudoHandle),
];

/// 仅读取后丢弃的旧版物品键。
const LEGACY_ITEM_KEYS: &[&str] = &["author", "description", "filter"];

pub struct ItemDataParser<'a> {
    tok: Tokenizer<'a>,
    registry: &'a PropertyRegistry,
    cache: &'a CoordCache,
    options: ParseOptions,
    warnings: Vec<ParseWarning>,
}

impl<'a> ItemDataParser<'a> {
    pub fn new(
        text: &'a str,
        source_name: impl Into<String>,
        registry: &'a PropertyRegistry,
        cache: &'a CoordCache,
    ) -> Self {
        Self {
            tok: Tokenizer::new(text, source_name),
            registry,
            cache,
            options: ParseOptions::default(),
            warnings: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.tok = self.tok.with_escapes(options.allow_escapes);
        self.options = options;
        self
    }

    pub fn parse(mut self) -> Result<ParsedItemData, FormatError> {
        match self.tok.next_skipping_newlines()? {
            Token::String(key) if key.eq_ignore_ascii_case("ItemData") => {}
            other => {
                return Err(self.tok.error(ParseErrorKind::MissingItemData {
                    found: other.describe(),
                }));
            }
        }

        let mut document = Document::new();
        self.tok.open_block("ItemData")?;
        while let Some(key) = self.tok.next_key("ItemData")? {
            if key.eq_ignore_ascii_case("Item") {
                let item = self.parse_item()?;
                let id = item.id.clone();
                if document.insert_item(item).is_some() {
                    let line = self.tok.line();
                    warn!(item = %id, line, source = self.tok.source_name(), "物品重复声明，后者覆盖前者");
                    self.warnings.push(ParseWarning::DuplicateItem { id, line });
                }
            } else if key.eq_ignore_ascii_case("Renderables") {
                self.tok.open_block("Renderables")?;
                while let Some(block) = self.tok.next_key("Renderables")? {
                    if !block.eq_ignore_ascii_case("Item") {
                        return Err(self.unknown_key("Renderables", block));
                    }
                    let renderable = self.parse_renderable()?;
                    document.set_renderable(renderable);
                }
            } else {
                return Err(self.unknown_key("ItemData", key));
            }
        }

        debug!(
            source = self.tok.source_name(),
            items = document.len(),
            warnings = self.warnings.len(),
            cached_coords = self.cache.len(),
            cache_hits = self.cache.hits(),
            "物品定义解析完成"
        );
        Ok(ParsedItemData {
            document,
            warnings: self.warnings,
        })
    }

    fn unknown_key(&self, context: &str, key: String) -> FormatError {
        self.tok.error(ParseErrorKind::UnknownKey {
            context: context.to_string(),
            key,
        })
    }

    fn missing(&self, context: &'static str, field: &'static str) -> FormatError {
        self.tok.error(ParseErrorKind::MissingField { context, field })
    }

    fn read_int(&mut self, key: &str) -> Result<i32, FormatError> {
        let raw = self.tok.expect_string()?;
        raw.trim().parse().map_err(|_| {
            self.tok.error(ParseErrorKind::InvalidNumber {
                key: key.to_string(),
                value: raw,
            })
        })
    }

    fn read_count(&mut self, key: &str) -> Result<u32, FormatError> {
        let raw = self.tok.expect_string()?;
        raw.trim().parse().map_err(|_| {
            self.tok.error(ParseErrorKind::InvalidNumber {
                key: key.to_string(),
                value: raw,
            })
        })
    }

    fn read_bool(&mut self, key: &str) -> Result<bool, FormatError> {
        let raw = self.tok.expect_string()?;
        parse_bool(&raw).ok_or_else(|| {
            self.tok.error(ParseErrorKind::InvalidBool {
                key: key.to_string(),
                value: raw,
            })
        })
    }

    fn read_vec(&mut self, key: &str) -> Result<Vec3, FormatError> {
        let raw = self.tok.expect_string()?;
        Vec3::parse(&raw).map_err(|source| {
            self.tok.error(ParseErrorKind::InvalidVector {
                key: key.to_string(),
                source,
            })
        })
    }

    fn read_coord(&mut self, key: &str) -> Result<Coord, FormatError> {
        let raw = self.tok.expect_string()?;
        let coord = Coord::parse(&raw).map_err(|source| {
            self.tok.error(ParseErrorKind::InvalidCoord {
                key: key.to_string(),
                source,
            })
        })?;
        Ok(self.cache.intern_coord(coord))
    }

    fn parse_animations(&mut self, anims: &mut BTreeMap<Anim, i32>) -> Result<(), FormatError> {
        self.tok.open_block("Animations")?;
        while let Some(name) = self.tok.next_key("Animations")? {
            let anim = Anim::from_token(&name).ok_or_else(|| {
                self.tok.error(ParseErrorKind::InvalidValue {
                    what: "动画",
                    value: name.clone(),
                })
            })?;
            let index = self.read_int(&name)?;
            anims.insert(anim, index);
        }
        Ok(())
    }

    fn parse_renderable(&mut self) -> Result<Renderable, FormatError> {
        let mut kind = None;
        let mut model = String::new();
        let mut animations = BTreeMap::new();

        self.tok.open_block("Renderable Item")?;
        while let Some(key) = self.tok.next_key("Renderable Item")? {
            match key.to_ascii_lowercase().as_str() {
                "type" => {
                    let raw = self.tok.expect_string()?;
                    kind = Some(RenderableKind::from_token(&raw).ok_or_else(|| {
                        self.tok.error(ParseErrorKind::InvalidValue {
                            what: "图标类型",
                            value: raw.clone(),
                        })
                    })?);
                }
                "model" => model = self.tok.expect_string()?,
                "animations" => self.parse_animations(&mut animations)?,
                _ => return Err(self.unknown_key("Renderable Item", key)),
            }
        }
        let kind = kind.ok_or_else(|| self.missing("Renderable", "Type"))?;
        Ok(Renderable {
            kind,
            model,
            animations,
        })
    }

    /// 解析 `Item` 块。闭合的 `}` 直接按记号判断。
    fn parse_item(&mut self) -> Result<Item, FormatError> {
        self.tok.expect_brace_open()?;
        let mut item = Item::new(String::new());

        loop {
            let key = match self.tok.next_token()? {
                Token::BraceClose => {
                    if item.id.is_empty() {
                        return Err(self.missing("Item", "Type"));
                    }
                    return Ok(item);
                }
                Token::Newline => continue,
                Token::String(key) => key,
                Token::Eof => {
                    return Err(self.tok.error(ParseErrorKind::UnclosedBlock {
                        block: "Item".to_string(),
                    }));
                }
                other => {
                    return Err(self.tok.error(ParseErrorKind::UnexpectedToken {
                        expected: "物品键或 \"}\"",
                        found: other.describe(),
                    }));
                }
            };

            match key.to_ascii_lowercase().as_str() {
                "type" => {
                    if !item.id.is_empty() {
                        return Err(self.tok.error(ParseErrorKind::DuplicateField {
                            context: "Item",
                            field: "Type",
                        }));
                    }
                    let id = self.tok.expect_string()?.trim().to_uppercase();
                    if id.is_empty() {
                        return Err(self.tok.error(ParseErrorKind::InvalidValue {
                            what: "物品 ID",
                            value: id,
                        }));
                    }
                    item.id = id;
                }
                "itemclass" => {
                    let raw = self.tok.expect_string()?;
                    item.class = ItemClass::from_token(&raw).ok_or_else(|| {
                        self.tok.error(ParseErrorKind::InvalidValue {
                            what: "物品类",
                            value: raw.clone(),
                        })
                    })?;
                }
                "editor" => self.parse_editor(&mut item)?,
                "properties" => self.parse_properties(&mut item)?,
                "exporting" => self.parse_exporting(&mut item)?,
                folded if LEGACY_ITEM_KEYS.contains(&folded) => {
                    self.tok.expect_string()?;
                }
                _ => return Err(self.unknown_key("Item", key)),
            }
        }
    }

    fn parse_editor(&mut self, item: &mut Item) -> Result<(), FormatError> {
        self.tok.open_block("Editor")?;
        while let Some(key) = self.tok.next_key("Editor")? {
            let folded = key.to_ascii_lowercase();
            match folded.as_str() {
                "subtype" => {
                    let subtype = self.parse_subtype()?;
                    item.subtypes.push(subtype);
                }
                "animations" => self.parse_animations(&mut item.animations)?,
                "movementhandle" => {
                    let raw = self.tok.expect_string()?;
                    item.handle = Handle::from_token(&raw).ok_or_else(|| {
                        self.tok.error(ParseErrorKind::InvalidValue {
                            what: "移动手柄",
                            value: raw.clone(),
                        })
                    })?;
                }
                "invalidsurface" => {
                    let raw = self.tok.expect_string()?;
                    for word in raw.split_whitespace() {
                        let surface = Surface::from_token(word).ok_or_else(|| {
                            self.tok.error(ParseErrorKind::InvalidValue {
                                what: "表面类型",
                                value: word.to_string(),
                            })
                        })?;
                        item.invalid_surfaces.insert(surface);
                    }
                }
                "subtypeproperty" => {
                    let raw = self.tok.expect_string()?;
                    let kind = self.registry.lookup(&raw).ok_or_else(|| {
                        self.tok.error(ParseErrorKind::InvalidValue {
                            what: "属性",
                            value: raw.clone(),
                        })
                    })?;
                    item.subtype_prop = Some(kind.id().to_string());
                }
                "desiredfacing" => {
                    let raw = self.tok.expect_string()?;
                    item.facing = DesiredFacing::from_token(&raw).ok_or_else(|| {
                        self.tok.error(ParseErrorKind::InvalidValue {
                            what: "朝向",
                            value: raw.clone(),
                        })
                    })?;
                }
                "rendercolor" => {
                    self.tok.expect_string()?;
                }
                _ => {
                    let Some(&(_, flag)) = EDITOR_FLAGS.iter().find(|(name, _)| *name == folded)
                    else {
                        return Err(self.unknown_key("Editor", key));
                    };
                    let value = self.read_bool(&key)?;
                    *self.flag_slot(item, flag) = value;
                }
            }
        }
        Ok(())
    }

    fn flag_slot<'i>(&self, item: &'i mut Item, flag: EditorFlag) -> &'i mut bool {
        match flag {
            EditorFlag::AnchorBarriers => &mut item.anchor_barriers,
            EditorFlag::AnchorGoo if self.options.legacy_goo_anchor => &mut item.anchor_barriers,
            EditorFlag::AnchorGoo => &mut item.anchor_goo,
            EditorFlag::OccupiesVoxel => &mut item.occupies_voxel,
            EditorFlag::Copiable => &mut item.copiable,
            EditorFlag::Deletable => &mut item.deletable,
            EditorFlag::PseudoHandle => &mut item.pseudo_handle,
        }
    }

    fn parse_subtype(&mut self) -> Result<SubType, FormatError> {
        let mut subtype = SubType::default();
        self.tok.open_block("Subtype")?;
        while let Some(key) = self.tok.next_key("Subtype")? {
            match key.to_ascii_lowercase().as_str() {
                "name" => subtype.name = self.tok.expect_string()?,
                "model" => {
                    let model = self.parse_model()?;
                    subtype.add_model(&model);
                }
                "palette" => {
                    if let Some(palette) = self.parse_palette()? {
                        subtype.palette = Some(palette);
                    }
                }
                "sounds" => {
                    self.tok.open_block("Sounds")?;
                    while let Some(name) = self.tok.next_key("Sounds")? {
                        let sound = Sound::from_token(&name).ok_or_else(|| {
                            self.tok.error(ParseErrorKind::InvalidValue {
                                what: "声音类型",
                                value: name.clone(),
                            })
                        })?;
                        let script = self.tok.expect_string()?;
                        subtype.sounds.insert(sound, script);
                    }
                }
                "animations" => self.parse_animations(&mut subtype.animations)?,
                _ => return Err(self.unknown_key("Subtype", key)),
            }
        }
        Ok(subtype)
    }

    /// `Model` 可以是文件名，也可以是带 `ModelName` 的块。
    fn parse_model(&mut self) -> Result<String, FormatError> {
        match self.tok.next_skipping_newlines()? {
            Token::String(name) => Ok(name),
            Token::BraceOpen => {
                let mut name = None;
                while let Some(key) = self.tok.next_key("Model")? {
                    match key.to_ascii_lowercase().as_str() {
                        "modelname" => name = Some(self.tok.expect_string()?),
                        "texturename" => {
                            self.tok.expect_string()?;
                        }
                        _ => return Err(self.unknown_key("Model", key)),
                    }
                }
                name.ok_or_else(|| self.missing("Model", "ModelName"))
            }
            other => Err(self.tok.error(ParseErrorKind::UnexpectedToken {
                expected: "模型文件名或 \"{\"",
                found: other.describe(),
            })),
        }
    }

    fn parse_palette(&mut self) -> Result<Option<Palette>, FormatError> {
        let mut tooltip = String::new();
        let mut icon = None;
        let mut position = None;

        self.tok.open_block("Palette")?;
        while let Some(key) = self.tok.next_key("Palette")? {
            match key.to_ascii_lowercase().as_str() {
                "tooltip" => tooltip = self.tok.expect_string()?,
                "image" => {
                    let raw = self.tok.expect_string()?;
                    icon = Some(normalize_extension(&raw, ICON_EXTENSION));
                }
                "position" => {
                    let raw = self.tok.expect_string()?;
                    let parts: Vec<&str> = raw.split_whitespace().collect();
                    if !(2..=3).contains(&parts.len()) {
                        return Err(self.tok.error(ParseErrorKind::InvalidCoord {
                            key,
                            source: CoordError::WrongCount {
                                count: parts.len(),
                            },
                        }));
                    }
                    let mut xy = [0i32; 2];
                    for (slot, (axis, part)) in xy.iter_mut().zip(['x', 'y'].into_iter().zip(&parts))
                    {
                        *slot = part.parse().map_err(|_| {
                            self.tok.error(ParseErrorKind::InvalidCoord {
                                key: key.clone(),
                                source: CoordError::InvalidComponent {
                                    axis,
                                    value: part.to_string(),
                                },
                            })
                        })?;
                    }
                    position = Some((xy[0], xy[1]));
                }
                _ => return Err(self.unknown_key("Palette", key)),
            }
        }

        match position {
            Some(position) => Ok(Some(Palette {
                tooltip,
                icon,
                position,
            })),
            None => {
                debug!(line = self.tok.line(), "调色板缺少 Position，忽略该条目");
                Ok(None)
            }
        }
    }

    fn parse_properties(&mut self, item: &mut Item) -> Result<(), FormatError> {
        self.tok.open_block("Properties")?;
        while let Some(name) = self.tok.next_key("Properties")? {
            let registry = self.registry;
            let kind = registry.lookup(&name).ok_or_else(|| {
                self.tok.error(ParseErrorKind::InvalidValue {
                    what: "属性",
                    value: name.clone(),
                })
            })?;

            let context = format!("{name} options");
            let mut default = String::new();
            let mut index = 0;
            let mut allow_user_default = true;
            self.tok.open_block(&context)?;
            while let Some(option) = self.tok.next_key(&context)? {
                match option.to_ascii_lowercase().as_str() {
                    "defaultvalue" => default = self.tok.expect_string()?,
                    "index" => index = self.read_int(&option)?,
                    "bee2_ignore" => allow_user_default = self.read_bool(&option)?,
                    _ => return Err(self.unknown_key(&context, option)),
                }
            }

            let property = kind
                .construct(&default, index, allow_user_default)
                .map_err(|source| {
                    self.tok.error(ParseErrorKind::InvalidProperty {
                        id: kind.id().to_string(),
                        value: default.clone(),
                        source,
                    })
                })?;
            item.properties.insert(property.id.clone(), property);
        }
        Ok(())
    }

    fn parse_exporting(&mut self, item: &mut Item) -> Result<(), FormatError> {
        self.tok.open_block("Exporting")?;
        while let Some(key) = self.tok.next_key("Exporting")? {
            match key.to_ascii_lowercase().as_str() {
                "targetname" => item.targetname = self.tok.expect_string()?,
                "offset" => item.offset = self.read_vec(&key)?,
                "instances" => {
                    self.tok.open_block("Instances")?;
                    while let Some(label) = self.tok.next_key("Instances")? {
                        self.parse_instance(item, label)?;
                    }
                }
                "connectionpoints" => self.parse_connection_points(item)?,
                "embeddedvoxels" => self.parse_embedded_voxels(item)?,
                "embedface" => self.parse_embed_faces(item)?,
                "overlay" => self.parse_overlay(item)?,
                _ => {
                    debug!(key = %key, line = self.tok.line(), "跳过未识别的导出选项");
                    self.tok.skip_value(&key)?;
                }
            }
        }
        Ok(())
    }

    fn parse_instance(&mut self, item: &mut Item, label: String) -> Result<(), FormatError> {
        let index = match label.trim().parse::<i64>() {
            Ok(value) if value < 0 => {
                return Err(self.tok.error(ParseErrorKind::NegativeInstanceIndex { value: label }));
            }
            Ok(value) => match usize::try_from(value) {
                Ok(index) if index <= MAX_INSTANCE_INDEX => Some(index),
                _ => {
                    return Err(self.tok.error(ParseErrorKind::InstanceIndexTooLarge {
                        value: label,
                        limit: MAX_INSTANCE_INDEX,
                    }));
                }
            },
            Err(_) => None,
        };

        let slot = match self.tok.next_skipping_newlines()? {
            Token::String(file) => InstanceSlot::from_file(file),
            Token::BraceOpen => {
                let mut file = None;
                let mut slot = InstanceSlot::placeholder();
                while let Some(key) = self.tok.next_key("Instances")? {
                    match key.to_ascii_lowercase().as_str() {
                        "name" => file = Some(self.tok.expect_string()?),
                        "entitycount" => slot.entity_count = self.read_count(&key)?,
                        "brushcount" => slot.brush_count = self.read_count(&key)?,
                        "brushsidecount" => slot.brush_side_count = self.read_count(&key)?,
                        _ => return Err(self.unknown_key("Instance", key)),
                    }
                }
                slot.file = file.ok_or_else(|| self.missing("Instance", "Name"))?;
                slot
            }
            other => {
                return Err(self.tok.error(ParseErrorKind::UnexpectedToken {
                    expected: "实例文件名或 \"{\"",
                    found: other.describe(),
                }));
            }
        };

        match index {
            Some(index) => item.set_instance(index, slot),
            None => {
                let prefix_len = CUSTOM_INSTANCE_PREFIX.len();
                let has_prefix = label
                    .get(..prefix_len)
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(CUSTOM_INSTANCE_PREFIX));
                let name = if has_prefix {
                    label[prefix_len..].to_string()
                } else {
                    let line = self.tok.line();
                    warn!(
                        item = %item.id,
                        name = %label,
                        line,
                        source = self.tok.source_name(),
                        "自定义实例名称应带 bee2_ 前缀"
                    );
                    self.warnings.push(ParseWarning::MissingInstancePrefix {
                        item: item.id.clone(),
                        name: label.clone(),
                        line,
                    });
                    label
                };
                item.custom_instances.insert(name, slot.file);
            }
        }
        Ok(())
    }

    fn parse_connection_points(&mut self, item: &mut Item) -> Result<(), FormatError> {
        self.tok.open_block("ConnectionPoints")?;
        while let Some(key) = self.tok.next_key("ConnectionPoints")? {
            if !key.eq_ignore_ascii_case("Point") {
                return Err(self.unknown_key("ConnectionPoints", key));
            }
            let mut side = None;
            let mut pos = None;
            let mut sign_off = None;
            let mut priority = 0;
            let mut group = None;

            self.tok.open_block("Point")?;
            while let Some(opt) = self.tok.next_key("Point")? {
                match opt.to_ascii_lowercase().as_str() {
                    "dir" => {
                        let raw = self.tok.expect_string()?;
                        side = Some(ConnSide::parse(&raw).map_err(|source| {
                            self.tok.error(ParseErrorKind::InvalidDirection {
                                value: raw.clone(),
                                source,
                            })
                        })?);
                    }
                    "pos" => pos = Some(self.read_coord(&opt)?),
                    "signageoffset" => sign_off = Some(self.read_coord(&opt)?),
                    "priority" => priority = self.read_int(&opt)?,
                    "groupid" => group = Some(self.read_int(&opt)?),
                    _ => return Err(self.unknown_key("Point", opt)),
                }
            }

            let side = side.ok_or_else(|| self.missing("Point", "Dir"))?;
            let pos = pos.ok_or_else(|| self.missing("Point", "Pos"))?;
            let sign_off = sign_off.ok_or_else(|| self.missing("Point", "SignageOffset"))?;
            item.add_antline_point(
                side,
                AntlinePoint {
                    pos,
                    sign_off,
                    priority,
                    group,
                },
            );
        }
        Ok(())
    }

    fn parse_embedded_voxels(&mut self, item: &mut Item) -> Result<(), FormatError> {
        self.tok.open_block("EmbeddedVoxels")?;
        while let Some(key) = self.tok.next_key("EmbeddedVoxels")? {
            match key.to_ascii_lowercase().as_str() {
                "volume" => {
                    let mut pos1 = None;
                    let mut pos2 = None;
                    self.tok.open_block("Volume")?;
                    while let Some(opt) = self.tok.next_key("Volume")? {
                        match opt.to_ascii_lowercase().as_str() {
                            "pos1" => pos1 = Some(self.read_coord(&opt)?),
                            "pos2" => pos2 = Some(self.read_coord(&opt)?),
                            _ => return Err(self.unknown_key("Volume", opt)),
                        }
                    }
                    let pos1 = pos1.ok_or_else(|| self.missing("Volume", "Pos1"))?;
                    let pos2 = pos2.ok_or_else(|| self.missing("Volume", "Pos2"))?;
                    let count = box_volume(pos1, pos2);
                    if count > MAX_VOLUME_VOXELS {
                        return Err(self.tok.error(ParseErrorKind::VolumeTooLarge {
                            pos1,
                            pos2,
                            count,
                            limit: MAX_VOLUME_VOXELS,
                        }));
                    }
                    item.embed_volume(pos1, pos2);
                }
                "voxel" => {
                    self.tok.open_block("Voxel")?;
                    while let Some(opt) = self.tok.next_key("Voxel")? {
                        if !opt.eq_ignore_ascii_case("Pos") {
                            return Err(self.unknown_key("Voxel", opt));
                        }
                        let pos = self.read_coord(&opt)?;
                        item.embed_voxels.insert(pos);
                    }
                }
                _ => return Err(self.unknown_key("EmbeddedVoxels", key)),
            }
        }
        Ok(())
    }

    fn parse_embed_faces(&mut self, item: &mut Item) -> Result<(), FormatError> {
        self.tok.open_block("EmbedFace")?;
        while let Some(key) = self.tok.next_key("EmbedFace")? {
            if !key.eq_ignore_ascii_case("Solid") {
                return Err(self.unknown_key("EmbedFace", key));
            }
            let mut center = None;
            let mut size = None;
            let mut face_type = FaceType::default();

            self.tok.open_block("Solid")?;
            while let Some(opt) = self.tok.next_key("Solid")? {
                match opt.to_ascii_lowercase().as_str() {
                    "center" => center = Some(self.read_vec(&opt)?),
                    "dimensions" => size = Some(self.read_vec(&opt)?),
                    "grid" => {
                        let raw = self.tok.expect_string()?;
                        face_type = FaceType::from_token(&raw).ok_or_else(|| {
                            self.tok.error(ParseErrorKind::InvalidValue {
                                what: "表面网格",
                                value: raw.clone(),
                            })
                        })?;
                    }
                    _ => return Err(self.unknown_key("Solid", opt)),
                }
            }

            let center = center.ok_or_else(|| self.missing("Solid", "Center"))?;
            let size = size.ok_or_else(|| self.missing("Solid", "Dimensions"))?;
            item.embed_faces.push(EmbedFace {
                center,
                size,
                face_type,
            });
        }
        Ok(())
    }

    fn parse_overlay(&mut self, item: &mut Item) -> Result<(), FormatError> {
        let mut center = None;
        let mut size = None;
        let mut material = String::new();
        let mut rotation = 0;

        self.tok.open_block("Overlay")?;
        while let Some(opt) = self.tok.next_key("Overlay")? {
            match opt.to_ascii_lowercase().as_str() {
                "center" => center = Some(self.read_vec(&opt)?),
                "dimensions" => size = Some(self.read_vec(&opt)?),
                "material" => material = self.tok.expect_string()?,
                "rotation" => rotation = self.read_int(&opt)?,
                _ => return Err(self.unknown_key("Overlay", opt)),
            }
        }

        let center = center.ok_or_else(|| self.missing("Overlay", "Center"))?;
        let size = size.ok_or_else(|| self.missing("Overlay", "Dimensions"))?;
        item.overlays.push(Overlay {
            material,
            center,
            size,
            rotation,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ParsedItemData, FormatError> {
        let registry = PropertyRegistry::builtin();
        let cache = CoordCache::new();
        ItemDataParser::new(text, "unit.txt", &registry, &cache).parse()
    }

    fn wrap_item(body: &str) -> String {
        format!("\"ItemData\" {{ \"Item\" {{ \"Type\" \"ITEM_UNIT\" {body} }} }}")
    }

    #[test]
    fn rejects_missing_item_data() {
        let err = parse("\"Items\" { }").unwrap_err();
        assert!(matches!(
            err.parse_kind(),
            Some(ParseErrorKind::MissingItemData { .. })
        ));
        assert!(parse("").is_err());
    }

    #[test]
    fn legacy_keys_are_discarded() {
        let text = wrap_item("\"Author\" \"someone\" \"Description\" \"x\" \"Filter\" \"y\"");
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.document.len(), 1);
    }

    #[test]
    fn type_twice_is_fatal() {
        let err = parse(&wrap_item("\"Type\" \"ITEM_OTHER\"")).unwrap_err();
        assert_eq!(
            err.parse_kind(),
            Some(&ParseErrorKind::DuplicateField {
                context: "Item",
                field: "Type"
            })
        );
    }

    #[test]
    fn item_without_type_is_fatal() {
        let err = parse("\"ItemData\" { \"Item\" { \"ItemClass\" \"ItemButtonFloor\" } }")
            .unwrap_err();
        assert_eq!(
            err.parse_kind(),
            Some(&ParseErrorKind::MissingField {
                context: "Item",
                field: "Type"
            })
        );
    }

    #[test]
    fn truncated_item_reports_unclosed_block() {
        let err = parse("\"ItemData\" { \"Item\" { \"Type\" \"ITEM_CUT\"").unwrap_err();
        assert_eq!(
            err.parse_kind(),
            Some(&ParseErrorKind::UnclosedBlock {
                block: "Item".to_string()
            })
        );
    }

    #[test]
    fn goo_anchor_mapping_follows_options() {
        let text = wrap_item("\"Editor\" { \"CanAnchorOnGoo\" \"1\" }");
        let legacy = parse(&text).unwrap();
        let item = legacy.document.item("ITEM_UNIT").unwrap();
        assert!(item.anchor_barriers);
        assert!(!item.anchor_goo);

        let registry = PropertyRegistry::builtin();
        let cache = CoordCache::new();
        let fixed = ItemDataParser::new(&text, "unit.txt", &registry, &cache)
            .with_options(ParseOptions {
                legacy_goo_anchor: false,
                ..ParseOptions::default()
            })
            .parse()
            .unwrap();
        let item = fixed.document.item("item_unit").unwrap();
        assert!(!item.anchor_barriers);
        assert!(item.anchor_goo);
    }

    #[test]
    fn negative_instance_index_is_fatal() {
        let text = wrap_item("\"Exporting\" { \"Instances\" { \"-1\" \"a.vmf\" } }");
        let err = parse(&text).unwrap_err();
        assert!(matches!(
            err.parse_kind(),
            Some(ParseErrorKind::NegativeInstanceIndex { .. })
        ));
    }

    #[test]
    fn huge_instance_index_is_fatal() {
        let text = wrap_item("\"Exporting\" { \"Instances\" { \"4000000000\" \"a.vmf\" } }");
        let err = parse(&text).unwrap_err();
        assert!(matches!(
            err.parse_kind(),
            Some(ParseErrorKind::InstanceIndexTooLarge { limit: MAX_INSTANCE_INDEX, .. })
        ));

        let text = wrap_item("\"Exporting\" { \"Instances\" { \"4096\" \"a.vmf\" } }");
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.document.item("ITEM_UNIT").unwrap().instances.len(), 4097);
    }

    #[test]
    fn oversized_volume_is_fatal() {
        let text = wrap_item(
            "\"Exporting\" { \"EmbeddedVoxels\" { \"Volume\" { \"Pos1\" \"-2147483648 0 0\" \"Pos2\" \"2147483647 0 0\" } } }",
        );
        let err = parse(&text).unwrap_err();
        assert!(matches!(
            err.parse_kind(),
            Some(ParseErrorKind::VolumeTooLarge { count, .. }) if *count == 1 << 32
        ));
    }

    #[test]
    fn extreme_voxel_survives_parse_and_export() {
        let text = wrap_item(
            "\"Exporting\" { \"EmbeddedVoxels\" { \"Voxel\" { \"Pos\" \"-2147483648 0 0\" } \"Voxel\" { \"Pos\" \"2147483647 0 0\" } } }",
        );
        let parsed = parse(&text).unwrap();
        let item = parsed.document.item("ITEM_UNIT").unwrap();
        assert!(item.embed_voxels.contains(&Coord::new(i32::MIN, 0, 0)));
        let exported = crate::writer::export_document(&parsed.document);
        assert!(exported.contains("\"Pos\" \"2147483647 0 0\""));
        assert!(exported.contains("\"Pos\" \"-2147483648 0 0\""));
    }

    #[test]
    fn palette_without_position_is_dropped() {
        let text = wrap_item(
            "\"Editor\" { \"Subtype\" { \"Palette\" { \"Tooltip\" \"X\" \"Image\" \"a/b.png\" } } }",
        );
        let parsed = parse(&text).unwrap();
        let item = parsed.document.item("ITEM_UNIT").unwrap();
        assert_eq!(item.subtypes.len(), 1);
        assert!(item.subtypes[0].palette.is_none());
    }

    #[test]
    fn palette_position_accepts_two_or_three_components() {
        let text = wrap_item(
            "\"Editor\" { \"Subtype\" { \"Palette\" { \"Image\" \"pal/a.png\" \"Position\" \"1 2\" } } \
             \"Subtype\" { \"Palette\" { \"Position\" \"3 4 9\" } } }",
        );
        let parsed = parse(&text).unwrap();
        let item = parsed.document.item("ITEM_UNIT").unwrap();
        let first = item.subtypes[0].palette.as_ref().unwrap();
        assert_eq!(first.position, (1, 2));
        assert_eq!(first.icon.as_deref(), Some("pal/a.vtf"));
        assert_eq!(item.subtypes[1].palette.as_ref().unwrap().position, (3, 4));

        let bad = wrap_item("\"Editor\" { \"Subtype\" { \"Palette\" { \"Position\" \"1\" } } }");
        assert!(matches!(
            parse(&bad).unwrap_err().parse_kind(),
            Some(ParseErrorKind::InvalidCoord { .. })
        ));
    }

    #[test]
    fn coord_errors_name_axis_and_value() {
        let text = wrap_item(
            "\"Exporting\" { \"EmbeddedVoxels\" { \"Voxel\" { \"Pos\" \"0 y 0\" } } }",
        );
        let err = parse(&text).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unit.txt"), "{message}");
        assert!(message.contains("\"y\""), "{message}");
        assert!(message.contains('y'), "{message}");
    }

    #[test]
    fn invalid_property_default_names_property_and_value() {
        let text = wrap_item("\"Properties\" { \"ButtonType\" { \"DefaultValue\" \"7\" } }");
        match parse(&text).unwrap_err().parse_kind() {
            Some(ParseErrorKind::InvalidProperty { id, value, .. }) => {
                assert_eq!(id, "ButtonType");
                assert_eq!(value, "7");
            }
            other => panic!("期望属性错误，实际为 {other:?}"),
        }
    }

    #[test]
    fn unknown_renderable_type_is_fatal() {
        let text = "\"ItemData\" { \"Renderables\" { \"Item\" { \"Type\" \"Sparkles\" } } }";
        assert!(matches!(
            parse(text).unwrap_err().parse_kind(),
            Some(ParseErrorKind::InvalidValue { .. })
        ));
    }

    #[test]
    fn parses_renderables() {
        let text = "\"ItemData\" { \"Renderables\" { \"Item\" { \"Type\" \"ErrorState\" \
                    \"Model\" \"error.mdl\" \"Animations\" { \"ANIM_ICON_SHOW\" \"1\" } } } }";
        let parsed = parse(text).unwrap();
        let renderable = parsed
            .document
            .renderable(RenderableKind::Error)
            .unwrap();
        assert_eq!(renderable.model, "error.mdl");
        assert_eq!(renderable.animations.get(&Anim::BadPlaceShow), Some(&1));
    }
}
