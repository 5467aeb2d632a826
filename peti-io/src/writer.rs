//! 把内存中的文档写回 `editoritems` 文本格式。
//!
//! 缩进固定使用制表符：键位于第 n 层时，它的花括号与内容位于第 n + 1 层。

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use peti_core::document::{
    CUSTOM_INSTANCE_PREFIX, Document, ICON_EXPORT_EXTENSION, Item, MODEL_EXPORT_EXTENSION,
    Renderable, SubType, with_extension,
};
use peti_core::geometry::bounding_boxes;
use peti_core::vocab::{Anim, ConnSide, DesiredFacing, ItemClass, Sound};

/// 按分词器的转义规则写出字符串内容，使读回的值与原值一致。
struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ch in self.0.chars() {
            match ch {
                '\\' => f.write_str("\\\\")?,
                '"' => f.write_str("\\\"")?,
                '\n' => f.write_str("\\n")?,
                '\t' => f.write_str("\\t")?,
                ch => f.write_char(ch)?,
            }
        }
        Ok(())
    }
}

/// 写出完整文档：所有物品，以及非空时的 `Renderables` 块。
pub fn write_document<W: Write>(out: &mut W, document: &Document) -> fmt::Result {
    out.write_str("\"ItemData\"\n{\n")?;
    for item in document.items() {
        write_item(out, item)?;
    }
    let mut renderables = document.renderables().peekable();
    if renderables.peek().is_some() {
        out.write_str("\"Renderables\"\n\t{\n")?;
        for renderable in renderables {
            write_renderable(out, renderable)?;
        }
        out.write_str("\t}\n")?;
    }
    out.write_str("}\n")
}

pub fn export_document(document: &Document) -> String {
    let mut out = String::new();
    // 写入 String 不会失败。
    let _ = write_document(&mut out, document);
    out
}

pub fn export_item(item: &Item) -> String {
    let mut out = String::new();
    let _ = write_item(&mut out, item);
    out
}

fn write_renderable<W: Write>(out: &mut W, renderable: &Renderable) -> fmt::Result {
    out.write_str("\t\"Item\"\n\t\t{\n")?;
    writeln!(out, "\t\t\"Type\"  \"{}\"", renderable.kind)?;
    writeln!(out, "\t\t\"Model\" \"{}\"", Escaped(&renderable.model))?;
    write_animations(out, &renderable.animations, 2)?;
    out.write_str("\t\t}\n")
}

/// 按序列编号写出动画块，`level` 为键所在的缩进层级。
fn write_animations<W: Write>(
    out: &mut W,
    animations: &BTreeMap<Anim, i32>,
    level: usize,
) -> fmt::Result {
    if animations.is_empty() {
        return Ok(());
    }
    let key_indent = "\t".repeat(level);
    let indent = "\t".repeat(level + 1);
    let mut sorted: Vec<(&Anim, &i32)> = animations.iter().collect();
    sorted.sort_by_key(|&(_, index)| *index);

    writeln!(out, "{key_indent}\"Animations\"\n{indent}{{")?;
    for (anim, index) in sorted {
        writeln!(out, "{indent}\"{anim}\" \"{index}\"")?;
    }
    writeln!(out, "{indent}}}")
}

pub fn write_item<W: Write>(out: &mut W, item: &Item) -> fmt::Result {
    out.write_str("\"Item\"\n\t{\n")?;
    if item.class != ItemClass::Unclassed {
        writeln!(out, "\t\"Type\"      \"{}\"", Escaped(&item.id))?;
        writeln!(out, "\t\"ItemClass\" \"{}\"", item.class)?;
    } else {
        writeln!(out, "\t\"Type\" \"{}\"", Escaped(&item.id))?;
    }
    write_editor(out, item)?;
    write_properties(out, item)?;
    write_exporting(out, item)?;
    out.write_str("\t}\n")
}

fn write_editor<W: Write>(out: &mut W, item: &Item) -> fmt::Result {
    out.write_str("\t\"Editor\"\n\t\t{\n")?;
    if let Some(prop) = &item.subtype_prop {
        writeln!(out, "\t\t\"SubtypeProperty\" \"{}\"", Escaped(prop))?;
    }
    for subtype in &item.subtypes {
        write_subtype(out, subtype)?;
    }
    write_animations(out, &item.animations, 2)?;
    writeln!(out, "\t\t\"MovementHandle\" \"{}\"", item.handle)?;
    writeln!(
        out,
        "\t\t\"OccupiesVoxel\"  \"{}\"",
        if item.occupies_voxel { "1" } else { "0" }
    )?;
    if item.facing != DesiredFacing::Anything {
        writeln!(out, "\t\t\"DesiredFacing\"  \"{}\"", item.facing)?;
    }
    if !item.invalid_surfaces.is_empty() {
        let mut tokens: Vec<&str> = item.invalid_surfaces.iter().map(|s| s.token()).collect();
        tokens.sort_unstable();
        writeln!(out, "\t\t\"InvalidSurface\" \"{}\"", tokens.join(" "))?;
    }
    if item.anchor_goo {
        out.write_str("\t\t\"CanAnchorOnGoo\"      \"1\"\n")?;
    }
    if item.anchor_barriers {
        out.write_str("\t\t\"CanAnchorOnBarriers\" \"1\"\n")?;
    }
    if !item.copiable {
        out.write_str("\t\t\"Copyable\"  \"0\"\n")?;
    }
    if !item.deletable {
        out.write_str("\t\t\"Deletable\" \"0\"\n")?;
    }
    if item.pseudo_handle {
        out.write_str("\t\t\"PseudoHandle\" \"1\"\n")?;
    }
    out.write_str("\t\t}\n")
}

fn write_subtype<W: Write>(out: &mut W, subtype: &SubType) -> fmt::Result {
    out.write_str("\t\t\"Subtype\"\n\t\t\t{\n")?;
    if !subtype.name.is_empty() {
        writeln!(out, "\t\t\t\"Name\" \"{}\"", Escaped(&subtype.name))?;
    }
    for model in &subtype.models {
        let model = with_extension(model, MODEL_EXPORT_EXTENSION);
        writeln!(out, "\t\t\t\"Model\" {{ \"ModelName\" \"{}\" }}", Escaped(&model))?;
    }
    if let Some(palette) = &subtype.palette {
        out.write_str("\t\t\t\"Palette\"\n\t\t\t\t{\n")?;
        writeln!(out, "\t\t\t\t\"Tooltip\"  \"{}\"", Escaped(&palette.tooltip))?;
        if let Some(icon) = &palette.icon {
            let icon = with_extension(icon, ICON_EXPORT_EXTENSION);
            writeln!(out, "\t\t\t\t\"Image\"    \"{}\"", Escaped(&icon))?;
        }
        let (x, y) = palette.position;
        writeln!(out, "\t\t\t\t\"Position\" \"{x} {y} 0\"")?;
        out.write_str("\t\t\t\t}\n")?;
    }
    if !subtype.has_default_sounds() {
        out.write_str("\t\t\t\"Sounds\"\n\t\t\t\t{\n")?;
        for sound in Sound::ALL {
            if let Some(script) = subtype.sounds.get(sound) {
                writeln!(out, "\t\t\t\t\"{sound}\" \"{}\"", Escaped(script))?;
            }
        }
        out.write_str("\t\t\t\t}\n")?;
    }
    write_animations(out, &subtype.animations, 3)?;
    out.write_str("\t\t\t}\n")
}

fn write_properties<W: Write>(out: &mut W, item: &Item) -> fmt::Result {
    if item.properties.is_empty() {
        return Ok(());
    }
    out.write_str("\t\"Properties\"\n\t\t{\n")?;
    for prop in item.properties.values() {
        writeln!(out, "\t\t\"{}\"\n\t\t\t{{", Escaped(&prop.id))?;
        writeln!(out, "\t\t\t\"DefaultValue\" \"{}\"", Escaped(&prop.export()))?;
        writeln!(out, "\t\t\t\"Index\"        \"{}\"", prop.index)?;
        if !prop.allow_user_default {
            out.write_str("\t\t\t\"BEE2_Ignore\"  \"0\"\n")?;
        }
        out.write_str("\t\t\t}\n")?;
    }
    out.write_str("\t\t}\n")
}

fn write_exporting<W: Write>(out: &mut W, item: &Item) -> fmt::Result {
    out.write_str("\t\"Exporting\"\n\t\t{\n")?;
    if !item.instances.is_empty() || !item.custom_instances.is_empty() {
        out.write_str("\t\t\"Instances\"\n\t\t\t{\n")?;
        for (index, slot) in item.instances.iter().enumerate() {
            writeln!(out, "\t\t\t\"{index}\"\n\t\t\t\t{{")?;
            if slot.is_placeholder() {
                out.write_str("\t\t\t\t\"Name\" \"\"\n")?;
            } else if slot.has_counts() {
                writeln!(out, "\t\t\t\t\"Name\"           \"{}\"", Escaped(&slot.file))?;
                writeln!(out, "\t\t\t\t\"EntityCount\"    \"{}\"", slot.entity_count)?;
                writeln!(out, "\t\t\t\t\"BrushCount\"     \"{}\"", slot.brush_count)?;
                writeln!(out, "\t\t\t\t\"BrushSideCount\" \"{}\"", slot.brush_side_count)?;
            } else {
                writeln!(out, "\t\t\t\t\"Name\" \"{}\"", Escaped(&slot.file))?;
            }
            out.write_str("\t\t\t\t}\n")?;
        }
        for (name, file) in &item.custom_instances {
            writeln!(
                out,
                "\t\t\t\"{CUSTOM_INSTANCE_PREFIX}{}\" \"{}\"",
                Escaped(name),
                Escaped(file)
            )?;
        }
        out.write_str("\t\t\t}\n")?;
    }

    if !item.targetname.is_empty() {
        writeln!(out, "\t\t\"Targetname\" \"{}\"", Escaped(&item.targetname))?;
    }
    writeln!(out, "\t\t\"Offset\"     \"{}\"", item.offset)?;

    if !item.embed_voxels.is_empty() {
        out.write_str("\t\t\"EmbeddedVoxels\"\n\t\t\t{\n")?;
        for (min, max) in bounding_boxes(item.embed_voxels.iter().copied()) {
            if min == max {
                out.write_str("\t\t\t\"Voxel\"\n\t\t\t\t{\n")?;
                writeln!(out, "\t\t\t\t\"Pos\" \"{}\"", min)?;
            } else {
                out.write_str("\t\t\t\"Volume\"\n\t\t\t\t{\n")?;
                writeln!(out, "\t\t\t\t\"Pos1\" \"{}\"", min)?;
                writeln!(out, "\t\t\t\t\"Pos2\" \"{}\"", max)?;
            }
            out.write_str("\t\t\t\t}\n")?;
        }
        out.write_str("\t\t\t}\n")?;
    }

    if !item.embed_faces.is_empty() {
        out.write_str("\t\t\"EmbedFace\"\n\t\t\t{\n")?;
        for face in &item.embed_faces {
            out.write_str("\t\t\t\"Solid\"\n\t\t\t\t{\n")?;
            writeln!(out, "\t\t\t\t\"Center\"     \"{}\"", face.center)?;
            writeln!(out, "\t\t\t\t\"Dimensions\" \"{}\"", face.size)?;
            writeln!(out, "\t\t\t\t\"Grid\"       \"{}\"", face.face_type)?;
            out.write_str("\t\t\t\t}\n")?;
        }
        out.write_str("\t\t\t}\n")?;
    }

    for overlay in &item.overlays {
        out.write_str("\t\t\"Overlay\"\n\t\t\t{\n")?;
        writeln!(out, "\t\t\t\"Material\"   \"{}\"", Escaped(&overlay.material))?;
        writeln!(out, "\t\t\t\"Center\"     \"{}\"", overlay.center)?;
        writeln!(out, "\t\t\t\"Dimensions\" \"{}\"", overlay.size)?;
        writeln!(out, "\t\t\t\"Rotation\"   \"{}\"", overlay.rotation)?;
        out.write_str("\t\t\t}\n")?;
    }

    if item.has_antline_points() {
        write_connection_points(out, item)?;
    }
    out.write_str("\t\t}\n")
}

fn write_connection_points<W: Write>(out: &mut W, item: &Item) -> fmt::Result {
    out.write_str("\t\t\"ConnectionPoints\"\n\t\t\t{\n")?;
    let mut first = true;
    for &side in ConnSide::ALL {
        let points = item.antline_points_on(side);
        if points.is_empty() {
            continue;
        }
        if !first {
            out.write_str("\n")?;
        }
        first = false;
        writeln!(out, "\t\t\t// {}", side.title())?;
        let dir = side.vector();
        for point in points {
            out.write_str("\t\t\t\"Point\"\n\t\t\t\t{\n")?;
            writeln!(out, "\t\t\t\t\"Dir\"           \"{dir}\"")?;
            writeln!(out, "\t\t\t\t\"Pos\"           \"{}\"", point.pos)?;
            writeln!(
                out,
                "\t\t\t\t\"SignageOffset\" \"{}\"",
                point.sign_off
            )?;
            writeln!(out, "\t\t\t\t\"Priority\"      \"{}\"", point.priority)?;
            if let Some(group) = point.group {
                writeln!(out, "\t\t\t\t\"GroupID\"       \"{group}\"")?;
            }
            out.write_str("\t\t\t\t}\n")?;
        }
    }
    out.write_str("\t\t\t}\n")
}
