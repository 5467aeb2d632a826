//! 物品定义格式中出现的封闭符号集合。
//!
//! 每个集合是一个普通枚举，外加一张从所有可接受输入（不区分 ASCII 大小写）
//! 到规范成员的静态别名表；`token()` 返回写回文件时使用的规范写法。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Coord;

macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $token:literal $(| $alias:literal)*
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// 所有成员，按声明顺序。
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            const ALIASES: &'static [(&'static str, $name)] = &[
                $(
                    ($token, $name::$variant),
                    $(($alias, $name::$variant),)*
                )+
            ];

            /// 写回文件时使用的规范写法。
            pub fn token(self) -> &'static str {
                match self {
                    $($name::$variant => $token,)+
                }
            }

            /// 按规范写法或别名查找，不区分 ASCII 大小写。
            pub fn from_token(value: &str) -> Option<Self> {
                let value = value.trim();
                Self::ALIASES
                    .iter()
                    .find(|(alias, _)| alias.eq_ignore_ascii_case(value))
                    .map(|&(_, variant)| variant)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.token())
            }
        }
    };
}

vocabulary! {
    /// 编辑器中实例化物品所用的 C++ 类。
    pub enum ItemClass {
        Unclassed => "ItemBase",
        FloorButton => "ItemButtonFloor",
        PedestalButton => "ItemPedestalButton",
        PanelStair => "ItemStairs",
        PanelFlip => "ItemPanelFlip",
        PanelAngled => "ItemAngledPanel",
        PistonPlatform => "ItemPistonPlatform",
        TrackPlatform => "ItemRailPlatform",
        Cube => "ItemCube",
        Gel => "ItemPaintSplat",
        FaithPlate => "ItemCatapult",
        CubeDropper => "ItemCubeDropper",
        GelDropper => "ItemPaintDropper",
        FaithTarget => "ItemCatapultTarget",
        Glass => "ItemBarrier",
        Turret => "ItemTurret",
        LightStrip => "ItemLightStrip",
        Goo => "ItemGoo",
        LaserEmitter => "ItemLaserEmitter",
        Funnel => "ItemTBeam",
        Fizzler => "ItemBarrierHazard",
        LightBridge => "ItemLightBridge",
        HandleFizzler => "ItemBarrierHazardExtent",
        HandleGlass => "ItemBarrierExtent",
        HandlePistonPlatform => "ItemPistonPlatformExtent",
        HandleTrackPlatform => "ItemRailPlatformExtent",
        DoorEntrySp => "ItemEntranceDoor",
        DoorEntryCoop => "ItemCoopEntranceDoor",
        DoorExitSp => "ItemExitDoor",
        DoorExitCoop => "ItemCoopExitDoor",
    }
}

impl ItemClass {
    /// 该类物品最多使用的实例数量。
    pub fn instance_count(self) -> usize {
        match self {
            ItemClass::FloorButton | ItemClass::TrackPlatform => 6,
            ItemClass::Cube | ItemClass::DoorEntryCoop => 5,
            ItemClass::Glass => 9,
            ItemClass::Funnel => 3,
            ItemClass::Fizzler => 2,
            ItemClass::DoorEntrySp => 12,
            ItemClass::DoorExitSp | ItemClass::DoorExitCoop => 6,
            ItemClass::Goo
            | ItemClass::HandleFizzler
            | ItemClass::HandleGlass
            | ItemClass::HandlePistonPlatform
            | ItemClass::HandleTrackPlatform => 0,
            _ => 1,
        }
    }

    /// 每个子类型需要提供的模型数量。
    pub fn models_per_subtype(self) -> usize {
        match self {
            ItemClass::PanelStair
            | ItemClass::Cube
            | ItemClass::Goo
            | ItemClass::DoorExitSp
            | ItemClass::DoorExitCoop => 2,
            ItemClass::PanelAngled => 12,
            ItemClass::PistonPlatform => 7,
            ItemClass::TrackPlatform => 3,
            _ => 1,
        }
    }
}

impl Default for ItemClass {
    fn default() -> Self {
        ItemClass::Unclassed
    }
}

vocabulary! {
    /// 物品的方向控制柄。
    pub enum Handle {
        None => "HANDLE_NONE",
        Quad => "HANDLE_4_DIRECTIONS",
        CenterOffset => "HANDLE_5_POSITIONS",
        DualOffset => "HANDLE_6_POSITIONS",
        QuadOffset => "HANDLE_8_POSITIONS",
        FreeRotation => "HANDLE_36_DIRECTIONS",
        Faith => "HANDLE_CATAPULT",
    }
}

impl Default for Handle {
    fn default() -> Self {
        Handle::None
    }
}

vocabulary! {
    /// `InvalidSurface` 中使用的表面类型。
    pub enum Surface {
        Wall => "WALL" | "WALLS",
        Floor => "FLOOR",
        Ceiling => "CEILING" | "CEIL",
    }
}

vocabulary! {
    /// 物品移动时自动调整的朝向。
    pub enum DesiredFacing {
        Anything => "DESIRES_ANYTHING",
        Up => "DESIRES_UP",
        Down => "DESIRES_DOWN",
        Horizontal => "DESIRES_HORIZONTAL",
    }
}

impl Default for DesiredFacing {
    fn default() -> Self {
        DesiredFacing::Anything
    }
}

vocabulary! {
    /// `EmbedFace` 生成的表面材质网格。
    pub enum FaceType {
        Normal => "Grid_Default",
        HalfVertical => "2x1",
        Full => "1x1",
        Half => "2x2",
        Quarter => "4x4",
        Checkered => "4x4_checkered",
    }
}

impl Default for FaceType {
    fn default() -> Self {
        FaceType::Normal
    }
}

vocabulary! {
    /// 物品之间的碰撞类别。
    pub enum CollisionType {
        Grating => "GRATING" | "GRATE",
        Glass => "GLASS",
        Bridge => "BRIDGE",
        Fizzler => "FIZZLER",
        Physics => "PHYSICS",
        Antlines => "ANTLINES",
        Nothing => "NOTHING",
        Everything => "EVERYTHING",
    }
}

vocabulary! {
    /// 触发音效的事件。
    pub enum Sound {
        Select => "SOUND_SELECTED",
        Deselect => "SOUND_DESELECTED",
        Delete => "SOUND_DELETED",
        Create => "SOUND_CREATED",
        PropsOpen => "SOUND_EDITING_ACTIVATE",
        PropsClose => "SOUND_EDITING_DEACTIVATE",
    }
}

/// 子类型未覆盖时使用的音效表。
pub fn default_sounds() -> BTreeMap<Sound, String> {
    [
        (Sound::Select, ""),
        (Sound::Deselect, ""),
        (Sound::PropsOpen, "P2Editor.ExpandOther"),
        (Sound::PropsClose, "P2Editor.CollapseOther"),
        (Sound::Create, "P2Editor.PlaceOther"),
        (Sound::Delete, "P2Editor.RemoveOther"),
    ]
    .into_iter()
    .map(|(sound, script)| (sound, script.to_string()))
    .collect()
}

vocabulary! {
    /// 编辑器模型的动画事件，对应模型中的序列编号。
    ///
    /// 方块相关的状态较多：flat 指没有掉落器时平放在地面，fall 指挂在掉落器下的悬空姿态。
    pub enum Anim {
        Idle => "ANIM_IDLE",
        EditStart => "ANIM_EDITING_ACTIVATE",
        EditStop => "ANIM_EDITING_DEACTIVATE",
        CubeFall => "ANIM_FALLING_IDLE",
        CubeFallEditStart => "ANIM_FALLING_EDITING_ACTIVATE",
        CubeFallEditStop => "ANIM_FALLING_EDITING_DEACTIVATE",
        CubeFlatToFall => "ANIM_GROUND_TO_FALLING",
        CubeFallToFlat => "ANIM_FALLING_TO_GROUND",
        CubeFlatToFallEdit => "ANIM_GROUND_TO_FALLING_EDITING",
        CubeFallToFlatEdit => "ANIM_FALLING_TO_GROUND_EDITING",
        DropperEnable => "ANIM_REAPPEAR",
        DropperDisable => "ANIM_DISAPPEAR",
        HeartIdle => "ANIM_ICON_HEART_HAPPY_IDLE",
        HeartConnMade => "ANIM_ICON_HEART_SUCCESS",
        HeartConnBroke => "ANIM_ICON_HEART_BREAK",
        BadPlaceIdle => "ANIM_ICON_IDLE",
        BadPlaceShow => "ANIM_ICON_SHOW",
        BadPlaceHide => "ANIM_ICON_HIDE",
    }
}

vocabulary! {
    /// 物品上连接线挂接的侧面。
    pub enum ConnSide {
        Left => "LEFT",
        Right => "RIGHT",
        Up => "UP",
        Down => "DOWN",
    }
}

impl ConnSide {
    /// 写回文件时使用的方向向量。
    pub fn vector(self) -> Coord {
        match self {
            ConnSide::Left => Coord::new(1, 0, 0),
            ConnSide::Right => Coord::new(-1, 0, 0),
            ConnSide::Up => Coord::new(0, 1, 0),
            ConnSide::Down => Coord::new(0, -1, 0),
        }
    }

    /// 分组注释中显示的名称。
    pub fn title(self) -> &'static str {
        match self {
            ConnSide::Left => "Left",
            ConnSide::Right => "Right",
            ConnSide::Up => "Up",
            ConnSide::Down => "Down",
        }
    }

    /// 解析方向名称，或 z 为 0 的单位向量。
    pub fn parse(value: &str) -> Result<Self, DirectionError> {
        if let Some(side) = Self::from_token(value) {
            return Ok(side);
        }
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(DirectionError::WrongCount { count: parts.len() });
        }
        let mut components = [0i32; 3];
        for (slot, part) in components.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| DirectionError::NotInteger {
                value: value.to_string(),
            })?;
        }
        let [x, y, z] = components;
        if z != 0 {
            return Err(DirectionError::NotFlat { z });
        }
        match (x, y) {
            (0, 1) => Ok(ConnSide::Up),
            (0, -1) => Ok(ConnSide::Down),
            (1, 0) => Ok(ConnSide::Left),
            (-1, 0) => Ok(ConnSide::Right),
            _ => Err(DirectionError::Unknown { x, y }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectionError {
    #[error("方向需要 3 个分量，实际为 {count} 个")]
    WrongCount { count: usize },
    #[error("方向 \"{value}\" 不是整数向量")]
    NotInteger { value: String },
    #[error("连接方向必须位于水平面内（z = {z}）")]
    NotFlat { z: i32 },
    #[error("未知的连接方向 ({x}, {y}, 0)")]
    Unknown { x: i32, y: i32 },
}

vocabulary! {
    /// 输入/输出连接类型，多数用于把成对的物品连在一起。
    pub enum ConnType {
        Normal => "CONNECTION_STANDARD",
        Polarity => "CONNECTION_TBEAM_POLARITY",
        CubeDropper => "CONNECTION_BOX_DROPPER",
        GelDropper => "CONNECTION_PAINT_DROPPER",
        Barrier => "CONNECTION_BARRIER_ANCHOR_TO_EXTENT",
        FizzBrush => "CONNECTION_HAZARD_BRUSH",
        FizzModel => "CONNECTION_HAZARD_MODEL",
        Fizz => "CONNECTION_HAZARD",
    }
}

vocabulary! {
    /// `Renderables` 块中的两个特殊图标。
    pub enum RenderableKind {
        Error => "ErrorState",
        Connection => "ConnectionHeartSolid",
    }
}
