//! 帧录制追踪工具
//!
//! 创建所有 render target，依次录制几种典型的帧。默认使用 headless 设备，把每一条命令输出到日志；
//! `--gpu` 时在真实的 Vulkan 设备上录制并提交，配合 validation layer 检查 barrier。
//!
//! 用法：`frame-trace [--gpu] [config.toml]`，日志等级由 `RUST_LOG` 控制

mod scenarios;

use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;
use kestrel_crate_tools::init_log::init_log;
use kestrel_gfx::{
    commands::{command_buffer::GfxCommandBuffer, recording::GfxRecordingCommandStream},
    foundation::{
        device_caps::GfxDeviceCaps,
        headless::{GfxHeadlessDevice, GfxHeadlessImageAllocator},
        offscreen::GfxOffscreenContext,
    },
};
use kestrel_render_target::{DeferredReleaseQueue, RenderTargetConfig, RenderTargetResources, RenderingSession};
use scenarios::OffscreenSwapchain;

const INITIAL_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 1920,
    height: 1080,
};
const SWAPCHAIN_IMAGE_COUNT: u32 = 3;

fn main() -> anyhow::Result<()> {
    init_log();

    let args = std::env::args().skip(1).collect_vec();
    let gpu = args.iter().any(|arg| arg == "--gpu");
    let config = match args.iter().find(|arg| !arg.starts_with("--")) {
        Some(path) => RenderTargetConfig::load(path).with_context(|| format!("加载配置失败: {path}"))?,
        None => RenderTargetConfig::default(),
    };
    log::info!("config: {:?}", config);

    if gpu { trace_on_gpu(&config) } else { trace_headless(&config) }
}

fn trace_headless(config: &RenderTargetConfig) -> anyhow::Result<()> {
    let device = GfxHeadlessDevice::new();
    let allocator = Rc::new(GfxHeadlessImageAllocator::new());
    let caps = GfxDeviceCaps::full();
    let mut queue = DeferredReleaseQueue::new();

    let resources = RenderTargetResources::create(INITIAL_EXTENT, config, &device, &caps, allocator.clone())
        .context("创建 render target 失败")?;
    let mut session = RenderingSession::new(resources, &caps, config);
    session
        .set_swapchain(scenarios::swapchain_images(SWAPCHAIN_IMAGE_COUNT, 1, INITIAL_EXTENT), 0, &mut queue)
        .context("登记 swapchain 失败")?;

    let cmd = GfxRecordingCommandStream::new_echo();
    let mut serial = 0;

    log::info!("==== forward frame ====");
    scenarios::forward_frame(&mut session, &cmd, 0);
    serial += 1;

    log::info!("==== deferred frame with decals ====");
    scenarios::deferred_frame(&mut session, &cmd, 1);
    serial += 1;

    log::info!("==== resize ====");
    let resized = vk::Extent2D {
        width: 1280,
        height: 720,
    };
    session.resize(resized, serial, &mut queue).context("resize 失败")?;
    session
        .set_swapchain(scenarios::swapchain_images(SWAPCHAIN_IMAGE_COUNT, 2, resized), serial, &mut queue)
        .context("重建 swapchain 失败")?;
    log::info!("render targets now {:?}", session.resources().main_extent());
    scenarios::forward_frame(&mut session, &cmd, 2);
    serial += 1;

    log::info!("released {} retired images", queue.collect(serial));

    log::info!(
        "recorded {} commands: {} barriers in {} batches, {} passes",
        cmd.len(),
        cmd.barriers().len(),
        cmd.barrier_batches().len(),
        cmd.begin_rendering_count()
    );

    session.destroy(serial, &mut queue);
    queue.clear();
    log::info!("live images after shutdown: {}", allocator.live_count());
    Ok(())
}

fn trace_on_gpu(config: &RenderTargetConfig) -> anyhow::Result<()> {
    let context = GfxOffscreenContext::new(c"frame-trace").context("创建 Vulkan 环境失败")?;
    let result = record_on_gpu(&context, config);
    context.destroy();
    result
}

fn record_on_gpu(context: &GfxOffscreenContext, config: &RenderTargetConfig) -> anyhow::Result<()> {
    let allocator = Rc::new(context.image_allocator());
    let mut queue = DeferredReleaseQueue::new();

    let swapchain = OffscreenSwapchain::create(allocator.as_ref(), SWAPCHAIN_IMAGE_COUNT, INITIAL_EXTENT)
        .context("创建代替 swapchain 的 image 失败")?;
    let resources = RenderTargetResources::create(
        INITIAL_EXTENT,
        config,
        context.physical_device(),
        context.caps(),
        allocator.clone(),
    )
    .context("创建 render target 失败")?;
    let mut session = RenderingSession::<GfxCommandBuffer>::new(resources, context.caps(), config);
    session.set_swapchain(swapchain.images(1), 0, &mut queue).context("登记 swapchain 失败")?;

    context
        .submit_and_wait(|cmd| scenarios::forward_frame(&mut session, cmd, 0))
        .context("提交 forward frame 失败")?;
    context
        .submit_and_wait(|cmd| scenarios::deferred_frame(&mut session, cmd, 1))
        .context("提交 deferred frame 失败")?;
    log::info!("two frames submitted and completed on queue family {}", context.queue_family_index());

    // submit_and_wait 之后 GPU 已经空闲
    session.destroy(2, &mut queue);
    queue.clear();
    swapchain.destroy(allocator.as_ref());
    Ok(())
}
