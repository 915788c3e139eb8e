pub mod config;
pub mod emotion;
pub mod http;
pub mod pipeline;
pub mod render;
pub mod video;
pub mod voice;
pub mod workspace;

#[cfg(test)]
mod test_support;
