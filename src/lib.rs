// Library surface for the binary and the integration tests.
pub mod array;
pub mod cli;
pub mod config;
pub mod driver;
pub mod logging;
pub mod preview;
pub mod run;
pub mod stages;
pub mod storage;
pub mod transforms;
