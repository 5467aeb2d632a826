pub mod document;
pub mod props;
pub mod vocab;

pub mod geometry {
    use std::collections::{BTreeSet, HashSet};
    use std::fmt;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use glam::DVec3;
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use crate::vocab::FaceType;

    /// 整数三维坐标，用于嵌入体素与连接点。按 (x, y, z) 字典序排序。
    #[derive(
        Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    )]
    pub struct Coord {
        pub x: i32,
        pub y: i32,
        pub z: i32,
    }

    impl Coord {
        #[inline]
        pub const fn new(x: i32, y: i32, z: i32) -> Self {
            Self { x, y, z }
        }

        /// 解析 `"x y z"` 形式的整数坐标，错误信息会指明出错的分量与原始值。
        pub fn parse(value: &str) -> Result<Self, CoordError> {
            let parts: Vec<&str> = value.split_whitespace().collect();
            if parts.len() != 3 {
                return Err(CoordError::WrongCount { count: parts.len() });
            }
            Ok(Self::new(
                parse_axis('x', parts[0])?,
                parse_axis('y', parts[1])?,
                parse_axis('z', parts[2])?,
            ))
        }

        #[inline]
        pub fn component_min(self, other: Coord) -> Self {
            Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
        }

        #[inline]
        pub fn component_max(self, other: Coord) -> Self {
            Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
        }
    }

    impl fmt::Display for Coord {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} {} {}", self.x, self.y, self.z)
        }
    }

    fn parse_axis(axis: char, raw: &str) -> Result<i32, CoordError> {
        raw.parse::<i32>().map_err(|_| CoordError::InvalidComponent {
            axis,
            value: raw.to_string(),
        })
    }

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum CoordError {
        #[error("坐标需要 3 个分量，实际为 {count} 个")]
        WrongCount { count: usize },
        #[error("坐标分量 {axis} 的值 \"{value}\" 不是整数")]
        InvalidComponent { axis: char, value: String },
    }

    /// 浮点三维向量，内部以 `glam::DVec3` 表示，用于偏移、中心点与尺寸。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vec3(pub DVec3);

    impl Vec3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_dvec3(self) -> DVec3 {
            self.0
        }

        /// 解析 `"x y z"`，允许外层包裹 `()`、`[]` 或 `{}`。
        pub fn parse(value: &str) -> Result<Self, VectorError> {
            let error = || VectorError {
                value: value.to_string(),
            };
            let mut inner = value.trim();
            for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
                if let Some(stripped) = inner
                    .strip_prefix(open)
                    .and_then(|rest| rest.strip_suffix(close))
                {
                    inner = stripped;
                    break;
                }
            }
            let mut components = [0.0; 3];
            let mut count = 0;
            for part in inner.split_whitespace() {
                if count == 3 {
                    return Err(error());
                }
                components[count] = part.parse::<f64>().map_err(|_| error())?;
                count += 1;
            }
            if count != 3 {
                return Err(error());
            }
            Ok(Self::new(components[0], components[1], components[2]))
        }
    }

    impl From<DVec3> for Vec3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    impl fmt::Display for Vec3 {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write_number(f, self.0.x)?;
            f.write_str(" ")?;
            write_number(f, self.0.y)?;
            f.write_str(" ")?;
            write_number(f, self.0.z)
        }
    }

    /// 整数值省略小数部分，其余使用最短可往返表示。
    pub fn write_number(f: &mut impl fmt::Write, value: f64) -> fmt::Result {
        if value.fract() == 0.0 && value.abs() < 1e15 {
            write!(f, "{}", value as i64)
        } else {
            write!(f, "{value}")
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    #[error("无法将 \"{value}\" 解析为三维向量")]
    pub struct VectorError {
        pub value: String,
    }

    /// 连接线（antline）可挂接的位置。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AntlinePoint {
        pub pos: Coord,
        pub sign_off: Coord,
        /// 排序优先级，数值小者在前。
        pub priority: i32,
        /// 相同分组的点是同一连接心形图标的端点。
        pub group: Option<i32>,
    }

    /// 编辑器生成的附加表面。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct EmbedFace {
        pub center: Vec3,
        pub size: Vec3,
        pub face_type: FaceType,
    }

    /// 编辑器自动放置在地面上的贴花。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Overlay {
        pub material: String,
        pub center: Vec3,
        pub size: Vec3,
        pub rotation: i32,
    }

    /// 分量绝对值不超过该值的坐标会被缓存。
    pub const INTERN_LIMIT: i32 = 64;

    /// 小坐标驻留缓存。由调用方持有并注入解析会话，可通过 `Arc` 在线程间共享；
    /// 结果只依赖坐标值，缓存与否不影响正确性。
    #[derive(Debug, Default)]
    pub struct CoordCache {
        entries: RwLock<HashSet<Coord>>,
        hits: AtomicUsize,
    }

    impl CoordCache {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn intern(&self, x: i32, y: i32, z: i32) -> Coord {
            let coord = Coord::new(x, y, z);
            let range = -INTERN_LIMIT..=INTERN_LIMIT;
            if !(range.contains(&x) && range.contains(&y) && range.contains(&z)) {
                return coord;
            }
            if let Ok(entries) = self.entries.read() {
                if let Some(found) = entries.get(&coord) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return *found;
                }
            }
            // 并发插入同一值是幂等的。
            if let Ok(mut entries) = self.entries.write() {
                entries.insert(coord);
            }
            coord
        }

        #[inline]
        pub fn intern_coord(&self, coord: Coord) -> Coord {
            self.intern(coord.x, coord.y, coord.z)
        }

        pub fn len(&self) -> usize {
            self.entries.read().map(|entries| entries.len()).unwrap_or(0)
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// 命中次数，仅用于诊断输出。
        pub fn hits(&self) -> usize {
            self.hits.load(Ordering::Relaxed)
        }
    }

    /// 单次扩展在每个方向上最多探测的距离。
    const BOX_EXTENT: i32 = 50;

    /// 将一组体素分解为若干轴对齐包围盒，写出 `Volume` 时使用。
    ///
    /// 贪心算法：取剩余集合中最小的点，按 X+、X-、Y+、Y-、Z+、Z- 的顺序尽量扩展，
    /// 只有新覆盖的点全部仍在剩余集合中时才接受扩展。结果精确覆盖输入集合，
    /// 但不保证盒子数量最少。
    pub fn bounding_boxes<I>(voxels: I) -> BoundingBoxes
    where
        I: IntoIterator<Item = Coord>,
    {
        BoundingBoxes {
            todo: voxels.into_iter().collect(),
        }
    }

    /// [`bounding_boxes`] 返回的惰性迭代器，产出 `(最小角, 最大角)`。
    #[derive(Debug, Clone)]
    pub struct BoundingBoxes {
        todo: BTreeSet<Coord>,
    }

    impl Iterator for BoundingBoxes {
        type Item = (Coord, Coord);

        fn next(&mut self) -> Option<Self::Item> {
            let start = self.todo.pop_first()?;
            let (mut x1, mut y1, mut z1) = (start.x, start.y, start.z);
            let (mut x2, mut y2, mut z2) = (x1, y1, z1);
            let todo = &self.todo;

            for x in upward(x1) {
                if todo.contains(&Coord::new(x, y1, z1)) {
                    x2 = x;
                } else {
                    break;
                }
            }
            for x in downward(x1) {
                if todo.contains(&Coord::new(x, y1, z1)) {
                    x1 = x;
                } else {
                    break;
                }
            }

            for y in upward(y1) {
                if (x1..=x2).all(|x| todo.contains(&Coord::new(x, y, z1))) {
                    y2 = y;
                } else {
                    break;
                }
            }
            for y in downward(y1) {
                if (x1..=x2).all(|x| todo.contains(&Coord::new(x, y, z1))) {
                    y1 = y;
                } else {
                    break;
                }
            }

            for z in upward(z1) {
                if (x1..=x2).all(|x| (y1..=y2).all(|y| todo.contains(&Coord::new(x, y, z)))) {
                    z2 = z;
                } else {
                    break;
                }
            }
            for z in downward(z1) {
                if (x1..=x2).all(|x| (y1..=y2).all(|y| todo.contains(&Coord::new(x, y, z)))) {
                    z1 = z;
                } else {
                    break;
                }
            }

            for x in x1..=x2 {
                for y in y1..=y2 {
                    for z in z1..=z2 {
                        self.todo.remove(&Coord::new(x, y, z));
                    }
                }
            }
            Some((Coord::new(x1, y1, z1), Coord::new(x2, y2, z2)))
        }
    }

    /// 从 `from` 向正方向探测的坐标，在 `i32` 边界处截止。
    fn upward(from: i32) -> impl Iterator<Item = i32> {
        (1..BOX_EXTENT).map_while(move |step| from.checked_add(step))
    }

    fn downward(from: i32) -> impl Iterator<Item = i32> {
        (1..BOX_EXTENT).map_while(move |step| from.checked_sub(step))
    }

    /// 闭区间包围盒内的格点数量。
    pub fn box_volume(a: Coord, b: Coord) -> u64 {
        let span = |p: i32, q: i32| u64::from(p.abs_diff(q)) + 1;
        span(a.x, b.x)
            .saturating_mul(span(a.y, b.y))
            .saturating_mul(span(a.z, b.z))
    }

    /// 返回闭区间包围盒内的所有格点。
    pub fn box_points(min: Coord, max: Coord) -> impl Iterator<Item = Coord> {
        let lo = min.component_min(max);
        let hi = min.component_max(max);
        (lo.x..=hi.x).flat_map(move |x| {
            (lo.y..=hi.y).flat_map(move |y| (lo.z..=hi.z).map(move |z| Coord::new(x, y, z)))
        })
    }

}
