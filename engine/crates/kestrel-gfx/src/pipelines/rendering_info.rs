use ash::vk;

/// dynamic rendering 的参数：render area 以及各个 attachment
///
/// attachment 不持有任何引用，可以在 pass 期间长期保存
#[derive(Clone, Debug)]
pub struct GfxRenderingInfo {
    render_area: vk::Rect2D,
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    stencil_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
}
// new & init
impl GfxRenderingInfo {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            color_attachments: Vec::new(),
            depth_attachment: None,
            stencil_attachment: None,
        }
    }
}
// builder
impl GfxRenderingInfo {
    /// builder
    pub fn color_attachment(
        mut self,
        view: vk::ImageView,
        layout: vk::ImageLayout,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
        clear_color: glam::Vec4,
    ) -> Self {
        self.color_attachments.push(
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(layout)
                .load_op(load_op)
                .store_op(store_op)
                .clear_value(vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: clear_color.to_array(),
                    },
                }),
        );
        self
    }

    /// builder
    pub fn depth_attachment(
        mut self,
        view: vk::ImageView,
        layout: vk::ImageLayout,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
        clear_depth: f32,
    ) -> Self {
        self.depth_attachment = Some(Self::depth_stencil_info(view, layout, load_op, store_op, clear_depth));
        self
    }

    /// builder
    ///
    /// stencil 与 depth 通常是同一张 image 的同一个 view
    pub fn stencil_attachment(
        mut self,
        view: vk::ImageView,
        layout: vk::ImageLayout,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
    ) -> Self {
        self.stencil_attachment = Some(Self::depth_stencil_info(view, layout, load_op, store_op, 1.0));
        self
    }

    fn depth_stencil_info(
        view: vk::ImageView,
        layout: vk::ImageLayout,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
        clear_depth: f32,
    ) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(view)
            .image_layout(layout)
            .load_op(load_op)
            .store_op(store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: clear_depth,
                    stencil: 0,
                },
            })
    }
}
// getters
impl GfxRenderingInfo {
    /// 生成 `vk::RenderingInfo`，借用 self 中的 attachment
    pub fn rendering_info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .layer_count(1)
            .render_area(self.render_area)
            .color_attachments(&self.color_attachments);
        if let Some(depth_attachment) = &self.depth_attachment {
            info = info.depth_attachment(depth_attachment);
        }
        if let Some(stencil_attachment) = &self.stencil_attachment {
            info = info.stencil_attachment(stencil_attachment);
        }
        info
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    #[inline]
    pub fn color_attachments(&self) -> &[vk::RenderingAttachmentInfo<'static>] {
        &self.color_attachments
    }

    #[inline]
    pub fn depth(&self) -> Option<&vk::RenderingAttachmentInfo<'static>> {
        self.depth_attachment.as_ref()
    }

    #[inline]
    pub fn stencil(&self) -> Option<&vk::RenderingAttachmentInfo<'static>> {
        self.stencil_attachment.as_ref()
    }
}
