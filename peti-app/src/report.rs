use std::io::{self, Write};

use peti_core::document::{Document, Item};
use peti_core::vocab::ConnSide;

/// 每个物品一行概要，随后是渲染图标列表。
pub fn write_summary(doc: &Document, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{} 个物品", doc.len())?;
    for item in doc.items() {
        writeln!(out, "{}", item_line(item))?;
    }
    for renderable in doc.renderables() {
        writeln!(
            out,
            "渲染图标 {}：{}（{} 个动画）",
            renderable.kind,
            renderable.model,
            renderable.animations.len()
        )?;
    }
    Ok(())
}

fn item_line(item: &Item) -> String {
    let antlines: usize = ConnSide::ALL
        .iter()
        .map(|side| item.antline_points_on(*side).len())
        .sum();
    format!(
        "{} [{}] 子类型 {}，属性 {}，实例 {}，天线点 {}，嵌入体素 {}",
        item.id,
        item.class,
        item.subtypes.len(),
        item.properties.len(),
        item.instances.len() + item.custom_instances.len(),
        antlines,
        item.embed_voxels.len()
    )
}
