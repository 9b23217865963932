pub mod rendering_info;
