//! 基础设施模块 - 与具体后端无关的工具

pub mod image;

pub use image::{normalize, NormalizedImage};
