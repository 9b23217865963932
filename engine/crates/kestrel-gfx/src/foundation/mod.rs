pub mod device;
pub mod device_caps;
pub mod format;
pub mod headless;
pub mod offscreen;
pub mod physical_device;
