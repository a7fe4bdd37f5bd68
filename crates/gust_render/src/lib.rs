pub mod gpu_context;
pub mod projection;
pub mod sprite_pipeline;
pub mod texture;
pub mod vertex;

pub use gpu_context::{ContextRegistry, GpuContext};
pub use projection::{compute_letterbox, ortho_projection, LetterboxLayout, ProjectionUniform};
pub use sprite_pipeline::SpritePipeline;
pub use texture::Texture;
pub use vertex::SpriteVertex;
