use ash::vk::{self, Handle};
use kestrel_gfx::{
    commands::command_stream::GfxCommandStream,
    error::GfxError,
    resources::image::{GfxImage, GfxImageAllocator, GfxImageDesc},
};
use kestrel_render_target::{RenderingSession, SwapchainImages};

const OFFSCREEN_SWAPCHAIN_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// 呈现模块不存在，用假的 handle 代替
pub fn swapchain_images(count: u32, generation: u64, extent: vk::Extent2D) -> SwapchainImages {
    SwapchainImages {
        images: (0..count).map(|i| vk::Image::from_raw(0x5C00_0000 + generation * 16 + i as u64)).collect(),
        views: (0..count).map(|i| vk::ImageView::from_raw(0x5D00_0000 + generation * 16 + i as u64)).collect(),
        format: vk::Format::B8G8R8A8_SRGB,
        extent,
        generation,
    }
}

/// GPU 模式下没有 surface，用普通 image 代替 swapchain image
pub struct OffscreenSwapchain {
    images: Vec<GfxImage>,
    extent: vk::Extent2D,
}
impl OffscreenSwapchain {
    pub fn create(allocator: &dyn GfxImageAllocator, count: u32, extent: vk::Extent2D) -> Result<Self, GfxError> {
        let desc = GfxImageDesc::new_2d(
            extent,
            OFFSCREEN_SWAPCHAIN_FORMAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
        );
        let mut images = Vec::with_capacity(count as usize);
        for index in 0..count {
            match allocator.create_image(&desc, &format!("offscreen-swapchain-{index}")) {
                Ok(image) => images.push(image),
                Err(e) => {
                    images.into_iter().for_each(|image| allocator.destroy_image(image));
                    return Err(e);
                }
            }
        }
        Ok(Self { images, extent })
    }

    pub fn images(&self, generation: u64) -> SwapchainImages {
        SwapchainImages {
            images: self.images.iter().map(GfxImage::handle).collect(),
            views: self.images.iter().map(GfxImage::view).collect(),
            format: OFFSCREEN_SWAPCHAIN_FORMAT,
            extent: self.extent,
            generation,
        }
    }

    pub fn destroy(self, allocator: &dyn GfxImageAllocator) {
        self.images.into_iter().for_each(|image| allocator.destroy_image(image));
    }
}

/// 前向渲染：场景画到 SceneHdr，后处理之后画到 swapchain，并保存一份 swapchain 的颜色
pub fn forward_frame<C: GfxCommandStream + Clone>(session: &mut RenderingSession<C>, cmd: &C, swapchain_index: u32) {
    session.begin_frame(swapchain_index);

    session.set_clear_color(glam::vec4(0.1, 0.1, 0.1, 1.0));
    session.request_scene_hdr_target();
    session.request_clear();
    session.ensure_active(cmd);
    log::debug!("target {} (scene hdr: {})", session.variant_name(), session.target_is_scene_hdr());
    // 中途上传纹理
    session.suspend();
    session.ensure_active(cmd);

    // 座舱使用独立的深度，总是清到最远
    session.use_cockpit_depth();
    session.set_clear_depth(1.0);
    session.request_depth_clear();
    session.ensure_active(cmd);
    session.use_main_depth();
    session.transition_cockpit_depth_to_shader_read(cmd);

    session.copy_scene_hdr_to_effect(cmd);
    session.transition_scene_hdr_to_shader_read(cmd);

    let bloom_mips = session.resources().bloom_mip_levels();
    for mip in 0..bloom_mips {
        session.request_bloom_mip_target((mip % 2) as u8, mip);
        session.ensure_active(cmd);
    }
    session.transition_bloom_to_shader_read(cmd, 0);
    session.transition_bloom_to_shader_read(cmd, 1);

    session.request_post_ldr_target();
    session.ensure_active(cmd);
    session.transition_post_ldr_to_shader_read(cmd);

    session.request_smaa_edges_target();
    session.ensure_active(cmd);
    session.transition_smaa_edges_to_shader_read(cmd);
    session.request_smaa_blend_target();
    session.ensure_active(cmd);
    session.transition_smaa_blend_to_shader_read(cmd);
    session.request_smaa_output_target();
    session.ensure_active(cmd);
    session.transition_smaa_output_to_shader_read(cmd);

    session.request_swapchain_target();
    session.ensure_active(cmd);
    if session.resources().has_scene_color_capture() {
        session.capture_swapchain_color(cmd);
    } else {
        session.suspend();
    }

    session.end_frame(cmd);
}

/// 延迟渲染：G-buffer，decal 读取深度，光照写入 swapchain
pub fn deferred_frame<C: GfxCommandStream + Clone>(session: &mut RenderingSession<C>, cmd: &C, swapchain_index: u32) {
    session.begin_frame(swapchain_index);

    // 天空盒画在 SceneHdr，作为 emissive 保留到光照阶段
    session.request_scene_hdr_target();
    session.request_clear();
    session.ensure_active(cmd);
    session.copy_scene_hdr_to_emissive(cmd);
    session.request_emissive_target();
    session.ensure_active(cmd);

    let mut pass = session.begin_deferred_pass(true, true);
    pass.ensure_active(cmd);
    {
        let mut decals = pass.begin_depth_sampling(cmd);
        decals.set_cull_mode(vk::CullModeFlags::NONE);
        decals.ensure_active();
        decals.end();
    }
    pass.set_cull_mode(vk::CullModeFlags::BACK);
    pass.ensure_active(cmd);
    pass.end_geometry(cmd);

    // 光照
    session.ensure_active(cmd);
    session.suspend();

    session.request_post_luminance_target();
    session.ensure_active(cmd);
    session.transition_post_luminance_to_shader_read(cmd);

    // HUD 画在光照结果之上
    session.request_swapchain_target();
    session.ensure_active(cmd);
    session.suspend();
    session.end_frame(cmd);
}
