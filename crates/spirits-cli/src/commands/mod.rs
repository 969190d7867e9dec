pub mod add;
pub mod approve;
pub mod common;
pub mod completions;
pub mod delete;
pub mod edit;
pub mod export;
pub mod import;
pub mod list;
pub mod log;
pub mod merge;
pub mod site;
