use ash::vk;

/// 当前绑定的 attachment 的格式信息
///
/// 只作为 pipeline cache 的兼容性 key 使用，从不参与绑定逻辑
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentContract {
    pub color_format: vk::Format,
    pub color_attachment_count: u32,
    /// 没有 depth attachment 时为 UNDEFINED
    pub depth_format: vk::Format,
}
impl AttachmentContract {
    #[inline]
    pub fn has_depth(&self) -> bool {
        self.depth_format != vk::Format::UNDEFINED
    }
}
