pub mod operation;
pub mod trace;
