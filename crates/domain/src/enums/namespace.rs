//! 缓存命名空间
//!
//! 每种实体在设计时固定归属一个命名空间，运行期不变：
//! 静态命名空间（user / settings）缓存到显式失效为止，
//! 动态命名空间（portfolio / transactions / state）总是带 TTL

use std::fmt;

use serde::{Deserialize, Serialize};

/// 失效策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheClass {
    /// 事件驱动失效，不设过期时间
    Static,
    /// 按 TTL 过期
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    User,
    Settings,
    Portfolio,
    Transactions,
    State,
}

impl Namespace {
    pub const ALL: [Namespace; 5] = [
        Namespace::User,
        Namespace::Settings,
        Namespace::Portfolio,
        Namespace::Transactions,
        Namespace::State,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Namespace::User => "user",
            Namespace::Settings => "settings",
            Namespace::Portfolio => "portfolio",
            Namespace::Transactions => "transactions",
            Namespace::State => "state",
        }
    }

    pub const fn class(&self) -> CacheClass {
        match self {
            Namespace::User | Namespace::Settings => CacheClass::Static,
            Namespace::Portfolio | Namespace::Transactions | Namespace::State => {
                CacheClass::Dynamic
            }
        }
    }

    pub const fn is_static(&self) -> bool {
        matches!(self.class(), CacheClass::Static)
    }

    /// 缓存键：`namespace:external_key`
    pub fn key(&self, external_key: impl fmt::Display) -> String {
        format!("{}:{}", self.as_str(), external_key)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_namespaces_never_collide() {
        let names: HashSet<_> = Namespace::ALL.iter().map(|ns| ns.as_str()).collect();
        assert_eq!(names.len(), Namespace::ALL.len());

        // 任何命名空间都不是另一个的前缀，拼出来的键不会串
        for a in Namespace::ALL {
            for b in Namespace::ALL {
                if a != b {
                    assert!(!a.key(42).starts_with(&format!("{}:", b.as_str())));
                }
            }
        }
    }

    #[test]
    fn test_class_assignment() {
        assert_eq!(Namespace::User.class(), CacheClass::Static);
        assert_eq!(Namespace::Settings.class(), CacheClass::Static);
        assert_eq!(Namespace::Portfolio.class(), CacheClass::Dynamic);
        assert_eq!(Namespace::Transactions.class(), CacheClass::Dynamic);
        assert_eq!(Namespace::State.class(), CacheClass::Dynamic);
    }

    #[test]
    fn test_key_format() {
        assert_eq!(Namespace::Settings.key(42), "settings:42");
        assert_eq!(Namespace::Portfolio.key(7), "portfolio:7");
    }
}
