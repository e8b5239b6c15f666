pub mod add;
pub mod common;
pub mod completions;
pub mod delete;
pub mod list;
pub mod reset;
pub mod stats;
pub mod sync;
