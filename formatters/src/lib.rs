pub mod constants;
pub mod fat32;

pub use fat32::format_image;
