// table-scene: a floor, a wooden table and a floating cube

// Module declarations
mod animation;
mod config;
mod device;
mod error;
mod frame;
mod gpu;
mod math;
mod mesh;
mod renderer;
mod scene;
mod shader;
mod transform_stack;

use anyhow::Context;
use winit::event_loop::EventLoop;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env();
    config::init_logging(&config);

    let event_loop = EventLoop::new().context("failed to create event loop")?;

    let renderer = renderer::Renderer::new(&event_loop, &config).await?;

    renderer.run(event_loop)
}
