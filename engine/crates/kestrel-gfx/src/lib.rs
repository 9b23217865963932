//! Vulkan Gfx 抽象层
//!
//! 为 render target 状态机提供最小的 Vulkan 封装：
//! - [`commands`]: image barrier、layout -> stage/access 查表、命令流 trait 及其实现
//! - [`pipelines`]: dynamic rendering 的 attachment 描述
//! - [`foundation`]: 设备能力、格式探测，以及不依赖 GPU 的 headless 实现
//! - [`resources`]: image 及其 view 的创建与销毁（VMA）
//!
//! 命令的录制全部通过 [`commands::command_stream::GfxCommandStream`] 完成，
//! 上层代码不直接持有 `vk::CommandBuffer`，因此可以在没有 GPU 的环境下测试。

pub mod basic;
pub mod commands;
pub mod error;
pub mod foundation;
pub mod pipelines;
pub mod resources;
