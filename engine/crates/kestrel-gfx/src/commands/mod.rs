pub mod barrier;
pub mod command_buffer;
pub mod command_stream;
pub mod recording;
pub mod stage_access;
