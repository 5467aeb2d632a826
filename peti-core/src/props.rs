//! 物品属性类型注册表。
//!
//! 解析器只通过 [`PropertyRegistry::lookup`] 和 [`PropertyType::construct`] 两个入口
//! 使用属性类型，不关心具体取值规则；调用方可以注册自定义类型。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::write_number;

/// 属性的具体取值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    Float(f64),
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(value) => f.write_str(if *value { "1" } else { "0" }),
            PropertyValue::Int(value) => write!(f, "{value}"),
            PropertyValue::Float(value) => write_number(f, *value),
            PropertyValue::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyValueError {
    #[error("\"{value}\" 不是有效的布尔值")]
    NotBool { value: String },
    #[error("\"{value}\" 不是整数")]
    NotInt { value: String },
    #[error("{value} 超出范围 [{min}, {max}]")]
    OutOfRange { value: i32, min: i32, max: i32 },
    #[error("\"{value}\" 不是数值")]
    NotFloat { value: String },
    #[error("\"{value}\" 不在允许的取值中：{allowed}")]
    NotAllowed { value: String, allowed: String },
}

/// 物品上的一个属性实例。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProperty {
    /// 属性类型的规范 ID。
    pub id: String,
    pub value: PropertyValue,
    /// 属性面板中的排序。
    pub index: i32,
    /// 为 `false` 时忽略用户在界面上设置的默认值（`BEE2_Ignore`）。
    pub allow_user_default: bool,
}

impl ItemProperty {
    /// 写回 `DefaultValue` 时使用的文本。
    pub fn export(&self) -> String {
        self.value.to_string()
    }
}

/// 一种属性类型。
pub trait PropertyType: fmt::Debug + Send + Sync {
    fn id(&self) -> &str;

    fn parse_value(&self, raw: &str) -> Result<PropertyValue, PropertyValueError>;

    fn construct(
        &self,
        default: &str,
        index: i32,
        allow_user_default: bool,
    ) -> Result<ItemProperty, PropertyValueError> {
        Ok(ItemProperty {
            id: self.id().to_string(),
            value: self.parse_value(default)?,
            index,
            allow_user_default,
        })
    }
}

/// 布尔值的宽松解析，接受 `1/0`、`true/false`、`yes/no` 及其首字母。
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// 开关类属性，空值视为关闭。
#[derive(Debug, Clone)]
pub struct BoolProperty {
    pub id: &'static str,
}

impl PropertyType for BoolProperty {
    fn id(&self) -> &str {
        self.id
    }

    fn parse_value(&self, raw: &str) -> Result<PropertyValue, PropertyValueError> {
        if raw.trim().is_empty() {
            return Ok(PropertyValue::Bool(false));
        }
        parse_bool(raw)
            .map(PropertyValue::Bool)
            .ok_or_else(|| PropertyValueError::NotBool {
                value: raw.to_string(),
            })
    }
}

/// 有界整数属性，空值取下界。
#[derive(Debug, Clone)]
pub struct IntProperty {
    pub id: &'static str,
    pub min: i32,
    pub max: i32,
}

impl PropertyType for IntProperty {
    fn id(&self) -> &str {
        self.id
    }

    fn parse_value(&self, raw: &str) -> Result<PropertyValue, PropertyValueError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(PropertyValue::Int(self.min));
        }
        let value = trimmed
            .parse::<i32>()
            .map_err(|_| PropertyValueError::NotInt {
                value: raw.to_string(),
            })?;
        if value < self.min || value > self.max {
            return Err(PropertyValueError::OutOfRange {
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(PropertyValue::Int(value))
    }
}

#[derive(Debug, Clone)]
pub struct FloatProperty {
    pub id: &'static str,
}

impl PropertyType for FloatProperty {
    fn id(&self) -> &str {
        self.id
    }

    fn parse_value(&self, raw: &str) -> Result<PropertyValue, PropertyValueError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(PropertyValue::Float(0.0));
        }
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(PropertyValue::Float)
            .ok_or_else(|| PropertyValueError::NotFloat {
                value: raw.to_string(),
            })
    }
}

/// 取值限定在固定列表中的属性，保存为列表中的规范写法；空值取第一项。
#[derive(Debug, Clone)]
pub struct ChoiceProperty {
    pub id: &'static str,
    pub choices: &'static [&'static str],
}

impl PropertyType for ChoiceProperty {
    fn id(&self) -> &str {
        self.id
    }

    fn parse_value(&self, raw: &str) -> Result<PropertyValue, PropertyValueError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            if let Some(first) = self.choices.first() {
                return Ok(PropertyValue::Text((*first).to_string()));
            }
        }
        self.choices
            .iter()
            .find(|choice| choice.eq_ignore_ascii_case(trimmed))
            .map(|choice| PropertyValue::Text((*choice).to_string()))
            .ok_or_else(|| PropertyValueError::NotAllowed {
                value: raw.to_string(),
                allowed: self.choices.join(", "),
            })
    }
}

/// 任意文本属性。
#[derive(Debug, Clone)]
pub struct TextProperty {
    pub id: &'static str,
}

impl PropertyType for TextProperty {
    fn id(&self) -> &str {
        self.id
    }

    fn parse_value(&self, raw: &str) -> Result<PropertyValue, PropertyValueError> {
        Ok(PropertyValue::Text(raw.to_string()))
    }
}

const BOOL_PROPERTIES: &[&str] = &[
    "StartEnabled",
    "StartActive",
    "StartOpen",
    "StartLocked",
    "StartDeployed",
    "StartReversed",
    "DropperEnabled",
    "AutoDrop",
    "AutoRespawn",
    "TimerSound",
    "AllowStreak",
    "VerticalAlignment",
    "Oscillate",
    "IsCoop",
    "ItemFallStraightDown",
];

const INT_PROPERTIES: &[(&str, i32, i32)] = &[
    ("ButtonType", 0, 2),
    ("CubeType", 0, 4),
    ("PaintType", 0, 4),
    ("PaintFlowType", 0, 4),
    ("TimerDelay", 0, 30),
    ("TopLevel", 0, 4),
    ("BottomLevel", 0, 4),
    ("StartingPosition", 0, 4),
    ("TravelDistance", 0, 16),
    ("ConnectionCount", 0, i32::MAX),
    ("ConnectionCountPolarity", 0, i32::MAX),
];

const CHOICE_PROPERTIES: &[(&str, &[&str])] = &[
    (
        "AngledPanelType",
        &["ANGLE_30", "ANGLE_45", "ANGLE_60", "ANGLE_90"],
    ),
    (
        "AngledPanelAnimation",
        &["ANIM_30", "ANIM_45", "ANIM_60", "ANIM_90"],
    ),
    (
        "TravelDirection",
        &[
            "TRAVEL_DIRECTION_EAST",
            "TRAVEL_DIRECTION_WEST",
            "TRAVEL_DIRECTION_NORTH",
            "TRAVEL_DIRECTION_SOUTH",
        ],
    ),
    ("HazardType", &["FIZZLER", "LASERFIELD"]),
    ("BarrierType", &["GLASS", "GRATING"]),
];

const FLOAT_PROPERTIES: &[&str] = &["CatapultSpeed"];

const TEXT_PROPERTIES: &[&str] = &["TargetName", "CatapultTargetPos"];

/// 属性类型表，按不区分大小写的名称查找。
#[derive(Debug, Default, Clone)]
pub struct PropertyRegistry {
    types: HashMap<String, Arc<dyn PropertyType>>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 编辑器自带的属性类型。
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for &id in BOOL_PROPERTIES {
            registry.register(BoolProperty { id });
        }
        for &(id, min, max) in INT_PROPERTIES {
            registry.register(IntProperty { id, min, max });
        }
        for &(id, choices) in CHOICE_PROPERTIES {
            registry.register(ChoiceProperty { id, choices });
        }
        for &id in FLOAT_PROPERTIES {
            registry.register(FloatProperty { id });
        }
        for &id in TEXT_PROPERTIES {
            registry.register(TextProperty { id });
        }
        registry
    }

    /// 注册属性类型，返回被替换的同名类型。
    pub fn register<T>(&mut self, kind: T) -> Option<Arc<dyn PropertyType>>
    where
        T: PropertyType + 'static,
    {
        self.types.insert(kind.id().to_lowercase(), Arc::new(kind))
    }

    pub fn lookup(&self, name: &str) -> Option<&dyn PropertyType> {
        self.types
            .get(&name.trim().to_lowercase())
            .map(|kind| kind.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.types.values().map(|kind| kind.id())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

static BUILTIN_REGISTRY: Lazy<PropertyRegistry> = Lazy::new(PropertyRegistry::builtin);

/// 进程内共享的内置注册表。
pub fn builtin_registry() -> &'static PropertyRegistry {
    &BUILTIN_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = builtin_registry();
        let kind = registry.lookup("startenabled").expect("内置属性应存在");
        assert_eq!(kind.id(), "StartEnabled");
        assert!(registry.lookup("ButtonType").is_some());
        assert!(registry.lookup("NoSuchProperty").is_none());
        assert!(registry.ids().any(|id| id == "TimerDelay"));
    }

    #[test]
    fn construct_normalises_values() {
        let registry = builtin_registry();
        let prop = registry
            .lookup("StartEnabled")
            .unwrap()
            .construct("true", 3, false)
            .expect("布尔属性应能解析");
        assert_eq!(prop.value, PropertyValue::Bool(true));
        assert_eq!(prop.export(), "1");
        assert_eq!(prop.index, 3);
        assert!(!prop.allow_user_default);

        let prop = registry
            .lookup("angledpaneltype")
            .unwrap()
            .construct("angle_45", 0, true)
            .unwrap();
        assert_eq!(prop.export(), "ANGLE_45");

        let prop = registry
            .lookup("CatapultSpeed")
            .unwrap()
            .construct("450", 0, true)
            .unwrap();
        assert_eq!(prop.export(), "450");
    }

    #[test]
    fn construct_rejects_invalid_defaults() {
        let registry = builtin_registry();
        let timer = registry.lookup("TimerDelay").unwrap();
        assert_eq!(
            timer.construct("99", 0, true),
            Err(PropertyValueError::OutOfRange {
                value: 99,
                min: 0,
                max: 30
            })
        );
        assert!(matches!(
            timer.construct("soon", 0, true),
            Err(PropertyValueError::NotInt { .. })
        ));
        assert!(matches!(
            registry.lookup("StartOpen").unwrap().construct("maybe", 0, true),
            Err(PropertyValueError::NotBool { .. })
        ));
        assert!(matches!(
            registry.lookup("HazardType").unwrap().construct("LAVA", 0, true),
            Err(PropertyValueError::NotAllowed { .. })
        ));
    }

    #[test]
    fn empty_defaults_fall_back_to_type_default() {
        let registry = builtin_registry();
        let prop = registry.lookup("CubeType").unwrap().construct("", 0, true).unwrap();
        assert_eq!(prop.value, PropertyValue::Int(0));
        let prop = registry.lookup("StartActive").unwrap().construct("", 0, true).unwrap();
        assert_eq!(prop.value, PropertyValue::Bool(false));
    }

    #[test]
    fn custom_types_can_be_registered() {
        #[derive(Debug)]
        struct Upper;

        impl PropertyType for Upper {
            fn id(&self) -> &str {
                "Shout"
            }

            fn parse_value(&self, raw: &str) -> Result<PropertyValue, PropertyValueError> {
                Ok(PropertyValue::Text(raw.to_uppercase()))
            }
        }

        let mut registry = PropertyRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.register(Upper).is_none());
        let prop = registry.lookup("SHOUT").unwrap().construct("hi", 1, true).unwrap();
        assert_eq!(prop.export(), "HI");
        assert_eq!(registry.len(), 1);
    }
}
