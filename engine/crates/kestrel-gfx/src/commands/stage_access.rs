//! image layout -> (pipeline stage, access) 查表
//!
//! 所有 barrier 的 src/dst mask 都由这里推导，调用方不应该手写 stage/access。

use ash::vk;

/// 某个 layout 下合法的 pipeline stage 与 memory access
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxStageAccess {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

// new & 常量定义
impl GfxStageAccess {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Self { stage, access }
    }

    /// 未定义（初始状态或不关心内容）
    pub const UNDEFINED: Self = Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE);

    /// 颜色附件读写（包含 blend）
    pub const COLOR_ATTACHMENT: Self = Self::new(
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw() | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
    );

    /// 深度附件读写，depth-only 与 depth-stencil 共用
    pub const DEPTH_ATTACHMENT: Self = Self::new(
        vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
        ),
    );

    /// 片段着色器采样
    pub const SHADER_READ: Self =
        Self::new(vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::SHADER_SAMPLED_READ);

    /// 深度只读：同时被采样，并作为只读 depth attachment 参与深度测试
    pub const DEPTH_READ_ONLY: Self = Self::new(
        vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::FRAGMENT_SHADER.as_raw()
                | vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::SHADER_SAMPLED_READ.as_raw() | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw(),
        ),
    );

    /// 传输源
    pub const TRANSFER_SRC: Self = Self::new(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ);

    /// 传输目标
    pub const TRANSFER_DST: Self = Self::new(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE);

    /// 呈现，交给 presentation engine，不需要任何 stage
    pub const PRESENT: Self = Self::new(vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE);

    /// 兜底：所有 stage，所有读写。稳态运行时不应该出现
    pub const CATCH_ALL: Self = Self::new(
        vk::PipelineStageFlags2::ALL_COMMANDS,
        vk::AccessFlags2::from_raw(vk::AccessFlags2::MEMORY_READ.as_raw() | vk::AccessFlags2::MEMORY_WRITE.as_raw()),
    );
}
// 辅助方法
impl GfxStageAccess {
    /// 写操作的 access flags
    const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
    );

    /// 是否包含写操作
    #[inline]
    pub fn is_write(&self) -> bool {
        self.access.intersects(Self::WRITE_ACCESS)
    }

    /// 用于 barrier src 的 access：只有写操作需要 make available
    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.access & Self::WRITE_ACCESS
    }
}

/// 查表：layout 对应的 stage 与 access
///
/// 对于未列出的 layout 返回 [`GfxStageAccess::CATCH_ALL`]
pub const fn stage_access_for_layout(layout: vk::ImageLayout) -> GfxStageAccess {
    match layout {
        vk::ImageLayout::UNDEFINED => GfxStageAccess::UNDEFINED,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => GfxStageAccess::COLOR_ATTACHMENT,
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL | vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            GfxStageAccess::DEPTH_ATTACHMENT
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => GfxStageAccess::SHADER_READ,
        vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL | vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => {
            GfxStageAccess::DEPTH_READ_ONLY
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => GfxStageAccess::TRANSFER_SRC,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => GfxStageAccess::TRANSFER_DST,
        vk::ImageLayout::PRESENT_SRC_KHR => GfxStageAccess::PRESENT,
        _ => GfxStageAccess::CATCH_ALL,
    }
}

/// layout 是否落入了兜底分支
pub const fn is_catch_all(layout: vk::ImageLayout) -> bool {
    !matches!(
        layout,
        vk::ImageLayout::UNDEFINED
            | vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            | vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
            | vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            | vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
            | vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
            | vk::ImageLayout::TRANSFER_SRC_OPTIMAL
            | vk::ImageLayout::TRANSFER_DST_OPTIMAL
            | vk::ImageLayout::PRESENT_SRC_KHR
    )
}
