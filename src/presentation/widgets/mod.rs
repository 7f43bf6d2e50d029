mod image_view;

pub use image_view::{ImageView, ImageViewStatus};
