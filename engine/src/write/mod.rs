//! The write pipeline (spec §5): planning, execution, fetching and the
//! fixed before/after orchestration tying in rules, state machines,
//! webhooks and workflow triggers.

pub mod executor;
pub mod fetch;
pub mod pipeline;
pub mod plan;

pub use executor::apply_relation_writes;
pub use fetch::{fetch_list, fetch_one, load_includes, Filter, FilterOp, ListQuery, Page, SortKey};
pub use pipeline::{parse_path_id, CreateRequest, DeleteRequest, UpdateRequest, WritePipeline};
pub use plan::{plan_write, RelationWrite, WritePlan};
