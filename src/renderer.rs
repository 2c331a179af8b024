// Window shell for table-scene

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use winit::{
    dpi::LogicalSize,
    event::{ElementState, Event, StartCause, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

use crate::config::Config;
use crate::error::RenderError;
use crate::frame::{FrameDriver, FrameRequest, FrameScheduler};
use crate::gpu::GpuDevice;

/// Schedules frames through window redraw requests.
///
/// A redraw cannot be withdrawn once requested, so cancellation just forgets
/// the request and the redraw event is ignored when it arrives.
struct RedrawScheduler {
    window: Arc<Window>,
    next: u64,
    pending: Option<FrameRequest>,
}

impl RedrawScheduler {
    /// Consumes the pending request, if there is one.
    fn take_due(&mut self) -> bool {
        self.pending.take().is_some()
    }
}

impl FrameScheduler for RedrawScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        self.next += 1;
        let request = FrameRequest(self.next);
        self.pending = Some(request);
        self.window.request_redraw();
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        if self.pending == Some(request) {
            self.pending = None;
        }
    }
}

pub struct Renderer {
    window: Arc<Window>,
    driver: FrameDriver<GpuDevice>,
    scheduler: RedrawScheduler,
    start_time: Instant,
    title: String,
    simulate_context_loss: bool,
    context_lost: bool,
}

impl Renderer {
    pub async fn new(event_loop: &EventLoop<()>, config: &Config) -> anyhow::Result<Self> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(&config.title)
                .with_inner_size(LogicalSize::new(config.width, config.height))
                .build(event_loop)
                .context("failed to create window")?,
        );

        let device = GpuDevice::new(window.clone()).await?;
        let size = window.inner_size();
        let mut driver = FrameDriver::new(device, size.width, size.height);
        driver.init().context("failed to initialize renderer")?;

        if config.simulate_context_loss {
            log::info!("context-loss simulation enabled: click to lose, click again to restore");
        }

        Ok(Self {
            scheduler: RedrawScheduler {
                window: window.clone(),
                next: 0,
                pending: None,
            },
            window,
            driver,
            start_time: Instant::now(),
            title: config.title.clone(),
            simulate_context_loss: config.simulate_context_loss,
            context_lost: false,
        })
    }

    pub fn run(mut self, event_loop: EventLoop<()>) -> anyhow::Result<()> {
        let mut failure: Option<RenderError> = None;
        let failure_slot = &mut failure;

        event_loop
            .run(move |event, target| {
                target.set_control_flow(ControlFlow::Wait);

                let outcome = match event {
                    // The first frame runs straight away, without a timestamp.
                    Event::NewEvents(StartCause::Init) => self.frame(None),
                    Event::WindowEvent { window_id, event } if window_id == self.window.id() => {
                        match event {
                            WindowEvent::CloseRequested => {
                                target.exit();
                                Ok(())
                            }
                            WindowEvent::Resized(size) => {
                                self.driver.resize(size.width, size.height);
                                Ok(())
                            }
                            WindowEvent::RedrawRequested if self.scheduler.take_due() => {
                                let now = self.start_time.elapsed().as_secs_f64() * 1000.0;
                                self.frame(Some(now))
                            }
                            WindowEvent::MouseInput {
                                state: ElementState::Pressed,
                                ..
                            } if self.simulate_context_loss => self.toggle_context(),
                            _ => Ok(()),
                        }
                    }
                    _ => Ok(()),
                };

                if let Err(err) = outcome {
                    log::error!("fatal render error: {err}");
                    *failure_slot = Some(err);
                    target.exit();
                }
            })
            .context("event loop failed")?;

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn frame(&mut self, timestamp: Option<f64>) -> Result<(), RenderError> {
        let report = self.driver.render_frame(timestamp, &mut self.scheduler)?;
        if let Some(fps) = report.fps {
            self.window.set_title(&format!("{} - {fps} fps", self.title));
        }
        Ok(())
    }

    fn toggle_context(&mut self) -> Result<(), RenderError> {
        if self.context_lost {
            self.driver.device_mut().restore_context();
            self.driver.on_context_restored(&mut self.scheduler)?;
            self.context_lost = false;
        } else {
            self.driver.device_mut().lose_context();
            self.driver.on_context_lost(&mut self.scheduler);
            self.context_lost = true;
        }
        Ok(())
    }
}
