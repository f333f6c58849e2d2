//! Query planning: descriptor to [`CompiledPlan`].
//!
//! Two passes, both synchronous and side-effect free:
//! 1. [`FilterCompiler`]: caller filters to typed predicates
//! 2. [`AggregationPlanner`]: select/group/order/limit to a plan
//!
//! Every failure is a [`crate::error::ValidationError`] raised before any
//! backend is contacted.

pub mod aggregate;
pub mod filter;
pub mod naming;
pub mod plan;

pub use aggregate::{AggregationPlanner, DEFAULT_MAX_ROWS};
pub use filter::{
    compare_values, ColumnRewrite, CompiledPredicate, Comparison, Condition, FilterCompiler,
    LikeMatch,
};
pub use naming::output_name;
pub use plan::{CompiledOrder, CompiledPlan, OrderTarget, OutputColumn, TenantScope};
