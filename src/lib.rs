//! # dashq
//!
//! Declarative dashboard queries compiled to validated, deterministic SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          QuerySpec (select / filter / groupBy / ...)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [access gate]
//! ┌─────────────────────────────────────────────────────────┐
//! │   FilterCompiler + AggregationPlanner (ColumnRegistry)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [CompiledPlan → sql::Query]
//! ┌─────────────────────────────────────────────────────────┐
//! │     QueryExecutor (timeout, row cap, cancellation)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [ResultFormatter]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Vec<ResultRow>                           │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod format;
pub mod planner;
pub mod registry;
pub mod spec;
pub mod sql;
pub mod worker;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::access::{
        AccessDenied, AccessGate, AllowAll, ProjectGrants, QueryContext, ResourceScope, Subject,
        DASHBOARD_READ,
    };
    pub use crate::config::Settings;
    pub use crate::engine::{QueryEngine, QueryState};
    pub use crate::error::{
        BackendError, ExecutionError, FormattingError, QueryError, QueryResult, Stage,
        ValidationError,
    };
    pub use crate::executor::{
        BackendRequest, ExecutorOptions, MemoryBackend, QueryBackend, QueryExecutor, RawRow,
        WorkerBackend,
    };
    pub use crate::format::{CellValue, ResultFormatter, ResultRow};
    pub use crate::planner::{
        output_name, AggregationPlanner, ColumnRewrite, CompiledPlan, FilterCompiler,
    };
    pub use crate::registry::{ColumnDefinition, ColumnRegistry, TableDefinition, ValueType};
    pub use crate::spec::{
        AggregationKind, ColumnRole, FilterArgument, FilterCondition, FilterOperator,
        FilterValue, GroupByItem, OrderByItem, QuerySpec, SelectItem, SortDirection,
    };
    pub use crate::sql::Dialect;
}

pub use engine::QueryEngine;
pub use error::{QueryError, QueryResult};
pub use spec::QuerySpec;
