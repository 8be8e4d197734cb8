pub mod app;
pub mod call;
pub mod complete;
pub mod describe;
pub mod serve;
pub mod state;
