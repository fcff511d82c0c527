pub mod config;
pub mod publish;
pub mod reconcile;
pub mod run;
