//! 存储驱动抽象
//!
//! 连接池只依赖这里的两个 trait，Postgres 驱动和测试用的假驱动都实现它们

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use quant_bot_common::{AppError, Result as AppResult};

/// 查询参数
///
/// 空值也带类型，绑定 `COALESCE($n, column)` 时数据库能推断参数类型
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    I64(Option<i64>),
    F64(Option<f64>),
    Text(Option<String>),
    Bool(Option<bool>),
    Json(Option<Value>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::I64(v) => v.is_none(),
            SqlValue::F64(v) => v.is_none(),
            SqlValue::Text(v) => v.is_none(),
            SqlValue::Bool(v) => v.is_none(),
            SqlValue::Json(v) => v.is_none(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I64(v) => *v,
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::F64(v) => *v,
            SqlValue::I64(v) => v.map(|v| v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => v.as_deref(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => *v,
            _ => None,
        }
    }

    /// 转成 JSON 值，假驱动用它生成行
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::I64(v) => v.map(Value::from).unwrap_or(Value::Null),
            SqlValue::F64(v) => v.map(Value::from).unwrap_or(Value::Null),
            SqlValue::Text(v) => v.clone().map(Value::from).unwrap_or(Value::Null),
            SqlValue::Bool(v) => v.map(Value::from).unwrap_or(Value::Null),
            SqlValue::Json(v) => v.clone().unwrap_or(Value::Null),
        }
    }
}

macro_rules! impl_from_sql_value {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for SqlValue {
            fn from(v: $ty) -> Self {
                SqlValue::$variant(Some(v.into()))
            }
        }

        impl From<Option<$ty>> for SqlValue {
            fn from(v: Option<$ty>) -> Self {
                SqlValue::$variant(v.map(Into::into))
            }
        }
    };
}

impl_from_sql_value!(i64, I64);
impl_from_sql_value!(i32, I64);
impl_from_sql_value!(f64, F64);
impl_from_sql_value!(bool, Bool);
impl_from_sql_value!(String, Text);
impl_from_sql_value!(&str, Text);
impl_from_sql_value!(Value, Json);

/// 一行结果：列名 → JSON 值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.0.insert(column.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, column: &str, value: Value) {
        self.0.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.0.get(column).and_then(Value::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按列名反序列化为实体
    pub fn decode<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| AppError::Serialization(format!("row decode failed: {}", e)))
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// 一条到存储的物理连接
#[async_trait]
pub trait StoreConnection: Send {
    /// 执行语句并返回所有行（INSERT/UPDATE/DELETE 配合 RETURNING 使用）
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>>;

    /// 执行语句并返回受影响行数
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> AppResult<u64>;

    /// 探活，等价于 `SELECT 1`
    async fn ping(&mut self) -> AppResult<()>;
}

/// 建立新连接
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> AppResult<Box<dyn StoreConnection>>;

    /// 日志里展示的连接目标，不含密码
    fn describe(&self) -> String;
}
