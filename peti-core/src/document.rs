use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::geometry::{AntlinePoint, Coord, EmbedFace, Overlay, Vec3};
use crate::props::ItemProperty;
use crate::vocab::{
    Anim, ConnSide, DesiredFacing, Handle, ItemClass, RenderableKind, Sound, Surface,
    default_sounds,
};

/// 内存中模型文件的扩展名（实际文件是 MDL）。
pub const MODEL_EXTENSION: &str = "mdl";
/// 写回文件时模型使用的扩展名，格式要求如此。
pub const MODEL_EXPORT_EXTENSION: &str = "3ds";
/// 内存中调色板图标的扩展名（实际文件是 VTF）。
pub const ICON_EXTENSION: &str = "vtf";
pub const ICON_EXPORT_EXTENSION: &str = "png";
/// 自定义实例名称应带的前缀（不区分大小写）。
pub const CUSTOM_INSTANCE_PREFIX: &str = "bee2_";
/// 解析时允许的最大实例索引。
pub const MAX_INSTANCE_INDEX: usize = 4096;
/// 单个 `Volume` 最多展开的体素数量。
pub const MAX_VOLUME_VOXELS: u64 = 1 << 20;

/// 返回路径最后一段的扩展名（不含点）。与 POSIX 路径规则一致：
/// 以点开头或以点结尾的文件名没有扩展名。
pub fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        None
    } else {
        Some(&name[dot + 1..])
    }
}

/// 替换（或追加）路径最后一段的扩展名；文件名为空时原样返回。
pub fn with_extension(path: &str, ext: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    if name.is_empty() {
        return path.to_string();
    }
    let stem_len = match extension(path) {
        Some(current) => path.len() - current.len() - 1,
        None => path.len(),
    };
    format!("{}.{}", &path[..stem_len], ext)
}

/// 扩展名不同（不区分大小写）时替换为 `ext`。
pub fn normalize_extension(path: &str, ext: &str) -> String {
    match extension(path) {
        Some(current) if current.eq_ignore_ascii_case(ext) => path.to_string(),
        _ => with_extension(path, ext),
    }
}

/// 一个实例槽位。空文件名的槽位是占位符。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSlot {
    pub file: String,
    pub entity_count: u32,
    pub brush_count: u32,
    pub brush_side_count: u32,
}

impl InstanceSlot {
    /// 填补空缺索引用的占位符。
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn from_file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_placeholder(&self) -> bool {
        self.file.is_empty()
    }

    #[inline]
    pub fn has_counts(&self) -> bool {
        self.entity_count != 0 || self.brush_count != 0 || self.brush_side_count != 0
    }
}

/// 调色板中的条目。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    /// 显示在调色板底部的名称。
    pub tooltip: String,
    /// 图标路径，扩展名为 `.vtf`。
    pub icon: Option<String>,
    /// 调色板网格中的位置。
    pub position: (i32, i32),
}

/// 物品的一个子类型（视觉或行为变体）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubType {
    /// 在断开连接窗口中显示的名称。
    pub name: String,
    /// 按顺序使用的模型，扩展名统一为 `.mdl`。
    pub models: Vec<String>,
    pub sounds: BTreeMap<Sound, String>,
    pub animations: BTreeMap<Anim, i32>,
    pub palette: Option<Palette>,
}

impl Default for SubType {
    fn default() -> Self {
        Self {
            name: String::new(),
            models: Vec::new(),
            sounds: default_sounds(),
            animations: BTreeMap::new(),
            palette: None,
        }
    }
}

impl SubType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 追加模型，扩展名会被统一为 `.mdl`。
    pub fn add_model(&mut self, path: &str) {
        self.models.push(normalize_extension(path, MODEL_EXTENSION));
    }

    pub fn has_default_sounds(&self) -> bool {
        self.sounds == default_sounds()
    }
}

/// 错误图标与连接心形图标使用的简化定义。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Renderable {
    pub kind: RenderableKind,
    pub model: String,
    pub animations: BTreeMap<Anim, i32>,
}

impl Renderable {
    pub fn new(kind: RenderableKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            animations: BTreeMap::new(),
        }
    }
}

/// 一个可放置的物品定义。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub class: ItemClass,
    /// 用于区分子类型的属性类型 ID。
    pub subtype_prop: Option<String>,
    pub handle: Handle,
    pub facing: DesiredFacing,
    pub invalid_surfaces: BTreeSet<Surface>,
    pub animations: BTreeMap<Anim, i32>,

    pub anchor_barriers: bool,
    pub anchor_goo: bool,
    pub occupies_voxel: bool,
    pub copiable: bool,
    pub deletable: bool,
    pub pseudo_handle: bool,

    pub subtypes: Vec<SubType>,
    pub properties: IndexMap<String, ItemProperty>,

    pub targetname: String,
    pub offset: Vec3,
    /// 编辑器使用的实例，索引即槽位号，空缺处为占位符。
    pub instances: Vec<InstanceSlot>,
    /// 条件逻辑使用的命名实例（名称不含前缀），计数无意义故只保存文件。
    pub custom_instances: IndexMap<String, String>,
    /// 四个侧面各自的连接点，保持插入顺序。
    pub antline_points: BTreeMap<ConnSide, Vec<AntlinePoint>>,
    /// 物品在地面内挖空的体素。
    pub embed_voxels: BTreeSet<Coord>,
    pub embed_faces: Vec<EmbedFace>,
    pub overlays: Vec<Overlay>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class: ItemClass::Unclassed,
            subtype_prop: None,
            handle: Handle::None,
            facing: DesiredFacing::Anything,
            invalid_surfaces: BTreeSet::new(),
            animations: BTreeMap::new(),
            anchor_barriers: false,
            anchor_goo: false,
            occupies_voxel: true,
            copiable: true,
            deletable: true,
            pseudo_handle: false,
            subtypes: Vec::new(),
            properties: IndexMap::new(),
            targetname: String::new(),
            // 格式默认值是原点，但旋转中心会因此出错，这里直接使用实际可用的值。
            offset: Vec3::new(64.0, 64.0, 64.0),
            instances: Vec::new(),
            custom_instances: IndexMap::new(),
            antline_points: ConnSide::ALL.iter().map(|&side| (side, Vec::new())).collect(),
            embed_voxels: BTreeSet::new(),
            embed_faces: Vec::new(),
            overlays: Vec::new(),
        }
    }

    /// 写入指定槽位：超出末尾时先以占位符补齐，然后覆盖或追加。
    pub fn set_instance(&mut self, index: usize, slot: InstanceSlot) {
        while self.instances.len() < index {
            self.instances.push(InstanceSlot::placeholder());
        }
        if index == self.instances.len() {
            self.instances.push(slot);
        } else {
            self.instances[index] = slot;
        }
    }

    pub fn add_antline_point(&mut self, side: ConnSide, point: AntlinePoint) {
        self.antline_points.entry(side).or_default().push(point);
    }

    pub fn antline_points_on(&self, side: ConnSide) -> &[AntlinePoint] {
        self.antline_points
            .get(&side)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_antline_points(&self) -> bool {
        self.antline_points.values().any(|points| !points.is_empty())
    }

    /// 加入闭区间包围盒内的全部体素，两个角点顺序无关。
    pub fn embed_volume(&mut self, corner_a: Coord, corner_b: Coord) {
        self.embed_voxels
            .extend(crate::geometry::box_points(corner_a, corner_b));
    }
}

/// 解析结果：物品表与两个特殊图标。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// 键为小写 ID，保持声明顺序。
    items: IndexMap<String, Item>,
    renderables: BTreeMap<RenderableKind, Renderable>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入物品，同 ID（不区分大小写）已存在时替换并返回旧值。
    pub fn insert_item(&mut self, item: Item) -> Option<Item> {
        self.items.insert(item.id.to_lowercase(), item)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(&id.to_lowercase())
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.get_mut(&id.to_lowercase())
    }

    pub fn remove_item(&mut self, id: &str) -> Option<Item> {
        self.items.shift_remove(&id.to_lowercase())
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn set_renderable(&mut self, renderable: Renderable) -> Option<Renderable> {
        self.renderables.insert(renderable.kind, renderable)
    }

    pub fn renderable(&self, kind: RenderableKind) -> Option<&Renderable> {
        self.renderables.get(&kind)
    }

    pub fn renderables(&self) -> impl Iterator<Item = &Renderable> {
        self.renderables.values()
    }
}
