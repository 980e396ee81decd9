pub mod mesh;
pub mod pipeline;
pub mod pixel_pass;
pub mod renderer;
pub mod texture;
