use std::sync::Arc;
use std::thread;

use peti_core::document::InstanceSlot;
use peti_core::geometry::{Coord, CoordCache};
use peti_core::props::{PropertyRegistry, PropertyValue, TextProperty};
use peti_core::vocab::{ConnSide, DesiredFacing, Handle, ItemClass, Surface};
use peti_io::{
    FormatError, ItemDataFacade, ParseErrorKind, ParseWarning, export_item, parse_str,
};

const MINIMAL: &str = r#""ItemData" { "Item" { "Type" "ITEM_TEST" "Editor" { "MovementHandle" "HANDLE_NONE" "OccupiesVoxel" "1" } "Exporting" { } } }"#;

fn item_data(item_body: &str) -> String {
    format!("\"ItemData\"\n{{\n\"Item\"\n{{\n\"Type\" \"ITEM_TEST\"\n{item_body}\n}}\n}}\n")
}

fn unknown_key(err: &FormatError) -> Option<(&str, &str)> {
    match err.parse_kind() {
        Some(ParseErrorKind::UnknownKey { context, key }) => Some((context.as_str(), key.as_str())),
        _ => None,
    }
}

#[test]
fn minimal_item_uses_defaults() {
    let doc = parse_str(MINIMAL, "minimal.txt").expect("解析最小物品失败");
    assert_eq!(doc.len(), 1);
    let item = doc.item("ITEM_TEST").expect("缺少物品");
    assert_eq!(item.id, "ITEM_TEST");
    assert_eq!(item.class, ItemClass::Unclassed);
    assert_eq!(item.handle, Handle::None);
    assert_eq!(item.facing, DesiredFacing::Anything);
    assert!(item.occupies_voxel);
    assert!(item.subtypes.is_empty());
    assert!(item.instances.is_empty());
    assert!(!item.has_antline_points());
    assert_eq!(item.antline_points.len(), ConnSide::ALL.len());
}

#[test]
fn lookup_is_case_insensitive_and_ids_are_uppercased() {
    let text = item_data("").replace("ITEM_TEST", "item_Lower");
    let doc = parse_str(&text, "case.txt").expect("解析失败");
    let item = doc.item("ITEM_LOWER").expect("大写查找失败");
    assert_eq!(item.id, "ITEM_LOWER");
    assert!(doc.item("item_lower").is_some());
}

#[test]
fn invalid_surfaces_are_emitted_sorted() {
    let text = item_data("\"Editor\" { \"InvalidSurface\" \"WALL FLOOR\" }");
    let doc = parse_str(&text, "surf.txt").expect("解析失败");
    let item = doc.item("ITEM_TEST").expect("缺少物品");
    assert!(item.invalid_surfaces.contains(&Surface::Wall));
    assert!(item.invalid_surfaces.contains(&Surface::Floor));
    assert!(export_item(item).contains("\t\t\"InvalidSurface\" \"FLOOR WALL\"\n"));
}

#[test]
fn unknown_surface_is_fatal() {
    let text = item_data("\"Editor\" { \"InvalidSurface\" \"WALL ROOF\" }");
    let err = parse_str(&text, "surf.txt").unwrap_err();
    assert_eq!(
        err.parse_kind(),
        Some(&ParseErrorKind::InvalidValue {
            what: "表面类型",
            value: "ROOF".to_string()
        })
    );
}

#[test]
fn instance_index_pads_with_placeholders() {
    let text = item_data(
        "\"Exporting\" { \"Instances\" { \"3\" \"instances/three.vmf\" \"1\" { \"Name\" \"instances/one.vmf\" \"EntityCount\" \"4\" } } }",
    );
    let doc = parse_str(&text, "inst.txt").expect("解析失败");
    let item = doc.item("ITEM_TEST").expect("缺少物品");
    assert_eq!(item.instances.len(), 4);
    assert!(item.instances[0].is_placeholder());
    assert!(item.instances[2].is_placeholder());
    assert_eq!(
        item.instances[1],
        InstanceSlot {
            file: "instances/one.vmf".to_string(),
            entity_count: 4,
            brush_count: 0,
            brush_side_count: 0,
        }
    );
    assert_eq!(item.instances[3], InstanceSlot::from_file("instances/three.vmf"));
}

#[test]
fn instance_block_without_name_is_fatal() {
    let text = item_data("\"Exporting\" { \"Instances\" { \"0\" { \"EntityCount\" \"1\" } } }");
    let err = parse_str(&text, "inst.txt").unwrap_err();
    assert_eq!(
        err.parse_kind(),
        Some(&ParseErrorKind::MissingField {
            context: "Instance",
            field: "Name"
        })
    );
}

#[test]
fn custom_instance_prefix_is_stripped_or_warned() {
    let text = item_data(
        "\"Exporting\" { \"Instances\" { \"bee2_Frame\" \"a.vmf\" \"other\" { \"Name\" \"b.vmf\" \"BrushCount\" \"3\" } } }",
    );
    let facade = ItemDataFacade::new();
    let parsed = facade.parse_text(&text, "custom.txt").expect("解析失败");
    let item = parsed.document.item("ITEM_TEST").expect("缺少物品");
    assert_eq!(item.custom_instances.get("Frame").map(String::as_str), Some("a.vmf"));
    assert_eq!(item.custom_instances.get("other").map(String::as_str), Some("b.vmf"));
    assert!(item.instances.is_empty());
    assert_eq!(parsed.warnings.len(), 1);
    assert!(matches!(
        &parsed.warnings[0],
        ParseWarning::MissingInstancePrefix { item, name, .. } if item == "ITEM_TEST" && name == "other"
    ));
}

#[test]
fn volume_expands_inclusively() {
    let text = item_data(
        "\"Exporting\" { \"EmbeddedVoxels\" { \"Volume\" { \"Pos1\" \"0 0 0\" \"Pos2\" \"1 1 0\" } } }",
    );
    let doc = parse_str(&text, "vol.txt").expect("解析失败");
    let voxels: Vec<Coord> = doc
        .item("ITEM_TEST")
        .expect("缺少物品")
        .embed_voxels
        .iter()
        .copied()
        .collect();
    assert_eq!(
        voxels,
        vec![
            Coord::new(0, 0, 0),
            Coord::new(0, 1, 0),
            Coord::new(1, 0, 0),
            Coord::new(1, 1, 0),
        ]
    );
}

#[test]
fn volume_missing_corner_is_fatal() {
    let text = item_data("\"Exporting\" { \"EmbeddedVoxels\" { \"Volume\" { \"Pos1\" \"0 0 0\" } } }");
    let err = parse_str(&text, "vol.txt").unwrap_err();
    assert_eq!(
        err.parse_kind(),
        Some(&ParseErrorKind::MissingField {
            context: "Volume",
            field: "Pos2"
        })
    );
}

#[test]
fn duplicate_item_overwrites_with_warning() {
    let text = r#""ItemData"
{
    "Item" { "Type" "ITEM_DUP" "Editor" { "MovementHandle" "HANDLE_NONE" } }
    "Item" { "Type" "item_dup" "Editor" { "MovementHandle" "HANDLE_4_DIRECTIONS" } }
}
"#;
    let parsed = ItemDataFacade::new()
        .parse_text(text, "dup.txt")
        .expect("重复声明不应导致失败");
    assert_eq!(parsed.document.len(), 1);
    assert_eq!(
        parsed.document.item("ITEM_DUP").expect("缺少物品").handle,
        Handle::Quad
    );
    assert_eq!(
        parsed.warnings,
        vec![ParseWarning::DuplicateItem {
            id: "ITEM_DUP".to_string(),
            line: 4
        }]
    );
}

#[test]
fn unknown_top_level_key_is_fatal() {
    let text = "\"ItemData\" { \"Items\" { } }";
    let err = parse_str(text, "top.txt").unwrap_err();
    assert_eq!(unknown_key(&err), Some(("ItemData", "Items")));
}

#[test]
fn unknown_item_key_is_fatal() {
    let err = parse_str(&item_data("\"Palette\" \"x\""), "item.txt").unwrap_err();
    assert_eq!(unknown_key(&err), Some(("Item", "Palette")));
}

#[test]
fn unknown_editor_key_is_fatal() {
    let err = parse_str(&item_data("\"Editor\" { \"Colour\" \"1\" }"), "editor.txt").unwrap_err();
    assert_eq!(unknown_key(&err), Some(("Editor", "Colour")));
}

#[test]
fn unknown_subtype_key_is_fatal() {
    let text = item_data("\"Editor\" { \"Subtype\" { \"Name\" \"a\" \"Skin\" \"1\" } }");
    let err = parse_str(&text, "subtype.txt").unwrap_err();
    assert_eq!(unknown_key(&err), Some(("Subtype", "Skin")));
}

#[test]
fn unknown_exporting_keys_are_skipped() {
    let text = item_data(
        "\"Exporting\" {\n\
         \"OccupiedVoxels\" { \"Voxel\" { \"Pos\" \"0 0 0\" \"Surface\" { \"Normal\" \"0 0 1\" } } }\n\
         \"AutoPlaceAntlines\" \"1\"\n\
         \"Targetname\" \"kept\"\n\
         }",
    );
    let doc = parse_str(&text, "skip.txt").expect("未知导出键应被跳过");
    let item = doc.item("ITEM_TEST").expect("缺少物品");
    assert_eq!(item.targetname, "kept");
    assert!(item.embed_voxels.is_empty());
}

#[test]
fn unknown_point_option_is_fatal() {
    let text = item_data(
        "\"Exporting\" { \"ConnectionPoints\" { \"Point\" { \"Dir\" \"UP\" \"Pos\" \"0 0 0\" \"SignageOffset\" \"0 0 0\" \"Colour\" \"1\" } } }",
    );
    let err = parse_str(&text, "point.txt").unwrap_err();
    assert_eq!(unknown_key(&err), Some(("Point", "Colour")));
}

#[test]
fn connection_points_keep_insertion_order_per_side() {
    let text = item_data(
        "\"Exporting\" { \"ConnectionPoints\" {\n\
         \"Point\" { \"Dir\" \"0 1 0\" \"Pos\" \"1 0 0\" \"SignageOffset\" \"1 1 0\" \"Priority\" \"2\" }\n\
         \"Point\" { \"Dir\" \"up\" \"Pos\" \"0 0 0\" \"SignageOffset\" \"0 1 0\" \"GroupID\" \"7\" }\n\
         } }",
    );
    let doc = parse_str(&text, "points.txt").expect("解析失败");
    let item = doc.item("ITEM_TEST").expect("缺少物品");
    let up = item.antline_points_on(ConnSide::Up);
    assert_eq!(up.len(), 2);
    assert_eq!(up[0].pos, Coord::new(1, 0, 0));
    assert_eq!(up[0].priority, 2);
    assert_eq!(up[0].group, None);
    assert_eq!(up[1].group, Some(7));
    assert!(item.antline_points_on(ConnSide::Left).is_empty());
}

#[test]
fn point_without_signage_offset_is_fatal() {
    let text = item_data(
        "\"Exporting\" { \"ConnectionPoints\" { \"Point\" { \"Dir\" \"DOWN\" \"Pos\" \"0 0 0\" } } }",
    );
    let err = parse_str(&text, "point.txt").unwrap_err();
    assert_eq!(
        err.parse_kind(),
        Some(&ParseErrorKind::MissingField {
            context: "Point",
            field: "SignageOffset"
        })
    );
}

#[test]
fn diagonal_direction_is_fatal() {
    let text = item_data(
        "\"Exporting\" { \"ConnectionPoints\" { \"Point\" { \"Dir\" \"1 1 0\" \"Pos\" \"0 0 0\" \"SignageOffset\" \"0 0 0\" } } }",
    );
    let err = parse_str(&text, "dir.txt").unwrap_err();
    assert!(matches!(
        err.parse_kind(),
        Some(ParseErrorKind::InvalidDirection { .. })
    ));
}

#[test]
fn errors_carry_line_and_source_name() {
    let text = "\"ItemData\"\n{\n\"Item\"\n{\n\"Type\" \"ITEM_LINE\"\n\"Bogus\" \"1\"\n}\n}\n";
    let err = parse_str(text, "lines.txt").unwrap_err();
    assert_eq!(err.source_name(), "lines.txt");
    assert_eq!(err.line(), 6);
    let message = err.to_string();
    assert!(message.starts_with("lines.txt:6:"), "{message}");
    assert!(message.contains("Bogus"), "{message}");
}

#[test]
fn unterminated_string_is_a_tokenizer_error() {
    let text = "\"ItemData\"\n{\n\"Item\"\n{\n\"Type\" \"ITEM_";
    let err = parse_str(text, "eof.txt").unwrap_err();
    assert!(matches!(err, FormatError::Tokenizer(_)));
    assert_eq!(err.line(), 5);
}

#[test]
fn properties_are_validated_against_registry() {
    let text = item_data(
        "\"Properties\" {\n\
         \"TimerDelay\" { \"DefaultValue\" \"3\" \"Index\" \"2\" \"BEE2_Ignore\" \"0\" }\n\
         \"startenabled\" { \"DefaultValue\" \"1\" }\n\
         }",
    );
    let doc = parse_str(&text, "props.txt").expect("解析失败");
    let item = doc.item("ITEM_TEST").expect("缺少物品");
    let delay = item.properties.get("TimerDelay").expect("缺少 TimerDelay");
    assert_eq!(delay.value, PropertyValue::Int(3));
    assert_eq!(delay.index, 2);
    assert!(!delay.allow_user_default);
    let enabled = item.properties.get("StartEnabled").expect("缺少 StartEnabled");
    assert_eq!(enabled.value, PropertyValue::Bool(true));
    assert!(enabled.allow_user_default);

    let err = parse_str(&item_data("\"Properties\" { \"Wobble\" { } }"), "props.txt").unwrap_err();
    assert_eq!(
        err.parse_kind(),
        Some(&ParseErrorKind::InvalidValue {
            what: "属性",
            value: "Wobble".to_string()
        })
    );
}

#[test]
fn custom_registry_can_be_injected() {
    let mut registry = PropertyRegistry::new();
    registry.register(TextProperty { id: "Wobble" });
    let facade = ItemDataFacade::new().with_registry(Arc::new(registry));
    let text = item_data("\"Properties\" { \"Wobble\" { \"DefaultValue\" \"lots\" } }");
    let parsed = facade.parse_text(&text, "custom.txt").expect("解析失败");
    let item = parsed.document.item("ITEM_TEST").expect("缺少物品");
    assert_eq!(
        item.properties.get("Wobble").map(|prop| &prop.value),
        Some(&PropertyValue::Text("lots".to_string()))
    );

    let err = facade
        .parse_text(&item_data("\"Properties\" { \"TimerDelay\" { } }"), "custom.txt")
        .unwrap_err();
    assert!(matches!(
        err.parse_kind(),
        Some(ParseErrorKind::InvalidValue { .. })
    ));
}

#[test]
fn parallel_parses_share_one_cache() {
    let cache = Arc::new(CoordCache::new());
    let text = Arc::new(item_data(
        "\"Exporting\" { \"EmbeddedVoxels\" { \"Volume\" { \"Pos1\" \"0 0 0\" \"Pos2\" \"2 2 2\" } } }",
    ));

    let handles: Vec<_> = (0..4)
        .map(|index| {
            let cache = Arc::clone(&cache);
            let text = Arc::clone(&text);
            thread::spawn(move || {
                ItemDataFacade::new()
                    .with_cache(cache)
                    .parse_text(&text, &format!("thread-{index}.txt"))
                    .expect("并行解析失败")
                    .document
            })
        })
        .collect();

    let documents: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("解析线程崩溃"))
        .collect();
    for document in &documents[1..] {
        assert_eq!(document, &documents[0]);
    }
    assert_eq!(
        documents[0].item("ITEM_TEST").expect("缺少物品").embed_voxels.len(),
        27
    );
    assert_eq!(cache.len(), 2);
}
