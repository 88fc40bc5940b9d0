//! 全局类型
//!
//! 地图中使用的 id 与时间戳类型。

use std::fmt::Display;

/// 为地图元素定义一个 64 位 id 类型。`u64::MAX` 保留为无效 id。
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const INVALID: $name = $name(u64::MAX);

            pub fn new(id: u64) -> Self {
                Self(id)
            }

            #[inline]
            pub fn is_valid(&self) -> bool {
                self.0 != u64::MAX
            }

            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }
    };
}

define_id!(
    /// 任务（mission）id
    MissionId
);
define_id!(
    /// 位姿图顶点 id
    VertexId
);
define_id!(
    /// 路标点 id
    LandmarkId
);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub i64);
impl Timestamp {
    pub fn from_nanos(ns: i64) -> Self {
        Self(ns)
    }
    pub fn as_nanos(&self) -> i64 {
        self.0
    }
    pub fn as_sec(&self) -> f64 {
        self.0 as f64 / 1e9
    }
    /// dt
    pub fn duration_since(&self, other: &Timestamp) -> f64 {
        (self.0 - other.0) as f64 / 1e9
    }
}

#[test]
fn test_timestamp() {
    let t1 = Timestamp(1_000_000_000);
    let t2 = Timestamp(2_500_000_000);
    assert_eq!(t2.duration_since(&t1), 1.5);
    assert_eq!(t1.as_sec(), 1.0);
}

#[test]
fn test_invalid_id() {
    let id = LandmarkId::default();
    assert!(!id.is_valid());
    assert!(LandmarkId::new(3).is_valid());
    assert_eq!(format!("{}", VertexId::new(255)), "00000000000000ff");
}
