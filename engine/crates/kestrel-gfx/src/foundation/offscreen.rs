use std::{ffi::CStr, rc::Rc};

use ash::vk;

use crate::{
    commands::command_buffer::GfxCommandBuffer,
    error::GfxError,
    foundation::{device::GfxDevice, device_caps::GfxDeviceCaps, physical_device::GfxPhysicalDevice},
    resources::image::GfxVmaImageAllocator,
};

/// 不带 surface 的 Vulkan 环境
///
/// 一个 graphics queue 和一个 command pool；命令录制完成后立即提交并等待完成。
/// 用于离线工具，不参与帧循环
pub struct GfxOffscreenContext {
    /// 在 drop 之后会卸载 vulkan 动态库，因此需要确保该字段最后 drop
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: GfxPhysicalDevice,
    caps: GfxDeviceCaps,

    device: GfxDevice,
    queue_family_index: u32,
    queue: vk::Queue,
    command_pool: vk::CommandPool,

    vma: Option<Rc<vk_mem::Allocator>>,
}
// new & init
impl GfxOffscreenContext {
    pub fn new(app_name: &CStr) -> Result<Self, GfxError> {
        let entry = unsafe { ash::Entry::load() }?;

        let instance_exts = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(GfxError::vk("vkEnumerateInstanceExtensionProperties"))?;
        let debug_utils = instance_exts
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == ash::ext::debug_utils::NAME);
        let enabled_exts = if debug_utils { vec![ash::ext::debug_utils::NAME.as_ptr()] } else { vec![] };

        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 版本过低时，有些函数无法正确加载
            .application_name(app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"kestrel")
            .engine_version(vk::make_api_version(0, 1, 0, 0));
        let instance_ci =
            vk::InstanceCreateInfo::default().application_info(&app_info).enabled_extension_names(&enabled_exts);
        let instance =
            unsafe { entry.create_instance(&instance_ci, None) }.map_err(GfxError::vk("vkCreateInstance"))?;

        match Self::create_device(&instance, debug_utils) {
            Ok((physical_device, caps, device, queue_family_index)) => {
                Self::finish(entry, instance, physical_device, caps, device, queue_family_index)
            }
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    /// 第一个支持 1.3 且带 graphics queue 的物理设备
    fn pick_physical_device(instance: &ash::Instance) -> Result<(GfxPhysicalDevice, u32), GfxError> {
        let pdevices = unsafe { instance.enumerate_physical_devices() }
            .map_err(GfxError::vk("vkEnumeratePhysicalDevices"))?;
        pdevices
            .into_iter()
            .find_map(|pdevice| {
                let families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
                let family = families.iter().position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))?;
                let physical_device = GfxPhysicalDevice::new(instance, pdevice);
                (physical_device.api_version() >= vk::API_VERSION_1_3).then_some((physical_device, family as u32))
            })
            .ok_or(GfxError::NoSuitableDevice)
    }

    /// 只开启设备支持的 feature，缺失的必须 feature 由上层通过 caps 报告
    fn create_device(
        instance: &ash::Instance,
        debug_utils: bool,
    ) -> Result<(GfxPhysicalDevice, GfxDeviceCaps, GfxDevice, u32), GfxError> {
        let (physical_device, queue_family_index) = Self::pick_physical_device(instance)?;
        let caps = physical_device.query_caps();

        let mut device_exts = Vec::new();
        // PRESENT_SRC layout 需要 swapchain 扩展
        if physical_device.supports_extension(ash::khr::swapchain::NAME) {
            device_exts.push(ash::khr::swapchain::NAME.as_ptr());
        } else {
            log::warn!("VK_KHR_swapchain is not supported, PRESENT_SRC transitions are invalid on this device");
        }
        if caps.eds3.any() {
            device_exts.push(ash::ext::extended_dynamic_state3::NAME.as_ptr());
        }

        let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
            .synchronization2(caps.synchronization2)
            .dynamic_rendering(caps.dynamic_rendering);
        let mut eds3_features = vk::PhysicalDeviceExtendedDynamicState3FeaturesEXT::default()
            .extended_dynamic_state3_color_blend_enable(caps.eds3.color_blend_enable)
            .extended_dynamic_state3_color_write_mask(caps.eds3.color_write_mask)
            .extended_dynamic_state3_polygon_mode(caps.eds3.polygon_mode)
            .extended_dynamic_state3_rasterization_samples(caps.eds3.rasterization_samples);

        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)];
        let mut device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_exts)
            .push_next(&mut features13);
        if caps.eds3.any() {
            device_ci = device_ci.push_next(&mut eds3_features);
        }

        let device = unsafe { instance.create_device(physical_device.vk_handle(), &device_ci, None) }
            .map_err(GfxError::vk("vkCreateDevice"))?;
        let device = GfxDevice::new(instance, device, &caps, debug_utils);
        Ok((physical_device, caps, device, queue_family_index))
    }

    fn finish(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: GfxPhysicalDevice,
        caps: GfxDeviceCaps,
        device: GfxDevice,
        queue_family_index: u32,
    ) -> Result<Self, GfxError> {
        let ash_device = device.ash_device();
        let queue = unsafe { ash_device.get_device_queue(queue_family_index, 0) };

        let pool_ci = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool = match unsafe { ash_device.create_command_pool(&pool_ci, None) } {
            Ok(pool) => pool,
            Err(result) => {
                unsafe {
                    ash_device.destroy_device(None);
                    instance.destroy_instance(None);
                }
                return Err(GfxError::Vk {
                    call: "vkCreateCommandPool",
                    result,
                });
            }
        };

        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(&instance, ash_device, physical_device.vk_handle());
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let vma = match unsafe { vk_mem::Allocator::new(vma_ci) } {
            Ok(vma) => vma,
            Err(result) => {
                unsafe {
                    ash_device.destroy_command_pool(command_pool, None);
                    ash_device.destroy_device(None);
                    instance.destroy_instance(None);
                }
                return Err(GfxError::Vk {
                    call: "vmaCreateAllocator",
                    result,
                });
            }
        };

        log::info!("offscreen context ready, queue family {}", queue_family_index);
        Ok(Self {
            _entry: entry,
            instance,
            physical_device,
            caps,
            device,
            queue_family_index,
            queue,
            command_pool,
            vma: Some(Rc::new(vma)),
        })
    }

    /// 所有通过 [`Self::image_allocator`] 创建的 image 必须已经销毁
    pub fn destroy(mut self) {
        let ash_device = self.device.ash_device().clone();
        unsafe {
            if let Err(result) = ash_device.device_wait_idle() {
                log::error!("vkDeviceWaitIdle failed during teardown: {:?}", result);
            }
        }

        if let Some(vma) = self.vma.take()
            && Rc::strong_count(&vma) > 1
        {
            log::error!("VMA allocator is still referenced at teardown, leaking it");
            std::mem::forget(vma);
        }

        unsafe {
            ash_device.destroy_command_pool(self.command_pool, None);
            ash_device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        log::info!("offscreen context destroyed");
    }
}
// getters
impl GfxOffscreenContext {
    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.physical_device
    }

    #[inline]
    pub fn caps(&self) -> &GfxDeviceCaps {
        &self.caps
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// 基于本环境 VMA 的 image 分配器
    pub fn image_allocator(&self) -> GfxVmaImageAllocator {
        match &self.vma {
            Some(vma) => GfxVmaImageAllocator::new(&self.device, vma.clone()),
            None => panic!("offscreen context already destroyed"),
        }
    }
}
// tools
impl GfxOffscreenContext {
    /// 分配一个 command buffer，录制、提交并等待 queue 空闲
    pub fn submit_and_wait(&self, record: impl FnOnce(&GfxCommandBuffer)) -> Result<(), GfxError> {
        let ash_device = self.device.ash_device();
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let vk_cmd = unsafe { ash_device.allocate_command_buffers(&alloc_info) }
            .map_err(GfxError::vk("vkAllocateCommandBuffers"))?[0];
        let cmd = GfxCommandBuffer::new(&self.device, vk_cmd);

        let result = (|| {
            let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { ash_device.begin_command_buffer(vk_cmd, &begin_info) }
                .map_err(GfxError::vk("vkBeginCommandBuffer"))?;
            record(&cmd);
            unsafe { ash_device.end_command_buffer(vk_cmd) }.map_err(GfxError::vk("vkEndCommandBuffer"))?;

            let cmd_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(vk_cmd)];
            let submit_info = vk::SubmitInfo2::default().command_buffer_infos(&cmd_infos);
            unsafe { ash_device.queue_submit2(self.queue, std::slice::from_ref(&submit_info), vk::Fence::null()) }
                .map_err(GfxError::vk("vkQueueSubmit2"))?;
            unsafe { ash_device.queue_wait_idle(self.queue) }.map_err(GfxError::vk("vkQueueWaitIdle"))
        })();

        unsafe { ash_device.free_command_buffers(self.command_pool, &[vk_cmd]) };
        result
    }
}
