//! 数据库访问：驱动抽象、Postgres 驱动、连接池、查询执行器

pub mod driver;
pub mod executor;
pub mod pool;
pub mod postgres;

// 重新导出
pub use driver::{Connector, Row, SqlValue, StoreConnection};
pub use executor::QueryExecutor;
pub use pool::{ConnectionPool, HealthMonitor, PoolState, PoolStatus, PooledConnection};
pub use postgres::{classify_error, classify_sqlstate, PgConnector};
