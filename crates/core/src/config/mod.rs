//! 配置管理
//!
//! 配置按 默认值 → TOML 文件 → `KEEPER_` 环境变量 的顺序叠加，
//! 每个配置段都提供 `validate()`，加载完成后统一校验。

pub mod models;

#[cfg(test)]
mod tests;

pub use models::*;
