//! 子命令实现

pub mod clear;
pub mod inspect;
pub mod warmup;
