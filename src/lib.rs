pub mod config;
pub mod dataset;
pub mod fetch;
pub mod history;
pub mod pipeline;
pub mod process;
pub mod runner;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;
