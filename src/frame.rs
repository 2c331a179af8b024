// Frame driver for table-scene

use crate::animation::{AnimationState, FpsCounter};
use crate::device::RenderDevice;
use crate::error::RenderError;
use crate::math::{aspect_ratio, Camera};
use crate::mesh::MeshRegistry;
use crate::scene::{compose_frame, CompositionStats};
use crate::shader::{Light, ShaderBindings};
use crate::transform_stack::TransformStack;

/// Identifies a scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest(pub u64);

/// The host facility that calls the frame driver once per display refresh.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameRequest;
    fn cancel_frame(&mut self, request: FrameRequest);
}

/// Everything a frame needs, rebuilt from scratch on every (re)initialization.
#[derive(Debug)]
pub struct RenderContext {
    pub bindings: ShaderBindings,
    pub meshes: MeshRegistry,
    pub stack: TransformStack,
    pub animation: AnimationState,
    pub fps: FpsCounter,
}

impl RenderContext {
    /// Links the shaders, uploads the light and meshes, and resets animation.
    pub fn build<D: RenderDevice>(device: &mut D, light: &Light) -> Result<Self, RenderError> {
        let bindings = ShaderBindings::link(device)?;
        bindings.upload_light(device, light);
        let meshes = MeshRegistry::upload(device)?;

        Ok(Self {
            bindings,
            meshes,
            stack: TransformStack::new(),
            animation: AnimationState::new(),
            fps: FpsCounter::new(),
        })
    }
}

/// Outcome of one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Set when a one-second FPS window closed on this frame.
    pub fps: Option<u32>,
    pub stats: CompositionStats,
    pub cube_position: glam::Vec3,
}

/// Owns the device and the render context; drives the per-frame loop.
pub struct FrameDriver<D> {
    device: D,
    context: Option<RenderContext>,
    pending: Option<FrameRequest>,
    camera: Camera,
    light: Light,
    viewport: (u32, u32),
}

impl<D: RenderDevice> FrameDriver<D> {
    pub fn new(device: D, width: u32, height: u32) -> Self {
        Self {
            device,
            context: None,
            pending: None,
            camera: Camera::default(),
            light: Light::default(),
            viewport: (width, height),
        }
    }

    #[cfg(test)]
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[cfg(test)]
    pub fn context(&self) -> Option<&RenderContext> {
        self.context.as_ref()
    }

    /// Whether a next frame is scheduled.
    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.pending.is_some()
    }

    /// (Re)builds GPU resources and animation state. Safe to call repeatedly.
    pub fn init(&mut self) -> Result<(), RenderError> {
        self.context = None;
        let context = RenderContext::build(&mut self.device, &self.light)?;
        log::info!(
            "render context initialized with {:?} ({}x{})",
            context.bindings.program,
            self.viewport.0,
            self.viewport.1
        );
        self.context = Some(context);
        Ok(())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    /// Renders one frame at `timestamp` (ms) and schedules the next one.
    ///
    /// A missing timestamp counts as 0. On error the pending frame is
    /// cancelled, which stops the loop.
    pub fn render_frame<S: FrameScheduler>(
        &mut self,
        timestamp: Option<f64>,
        scheduler: &mut S,
    ) -> Result<FrameReport, RenderError> {
        if self.context.is_none() {
            return Err(RenderError::NotInitialized);
        }
        self.pending = Some(scheduler.request_frame());

        match self.draw(timestamp.unwrap_or(0.0)) {
            Ok(report) => Ok(report),
            Err(err) => {
                log::error!("halting render loop: {err}");
                self.cancel_pending(scheduler);
                Err(err)
            }
        }
    }

    /// Stops the loop; GPU-side resources are assumed gone.
    pub fn on_context_lost<S: FrameScheduler>(&mut self, scheduler: &mut S) {
        log::info!("rendering context lost");
        self.cancel_pending(scheduler);
        self.context = None;
    }

    /// Rebuilds everything and resubmits the loop.
    pub fn on_context_restored<S: FrameScheduler>(&mut self, scheduler: &mut S) -> Result<(), RenderError> {
        log::info!("rendering context restored");
        self.init()?;
        self.cancel_pending(scheduler);
        self.pending = Some(scheduler.request_frame());
        Ok(())
    }

    fn cancel_pending<S: FrameScheduler>(&mut self, scheduler: &mut S) {
        if let Some(request) = self.pending.take() {
            scheduler.cancel_frame(request);
        }
    }

    fn draw(&mut self, now: f64) -> Result<FrameReport, RenderError> {
        let context = self.context.as_mut().ok_or(RenderError::NotInitialized)?;
        let (width, height) = self.viewport;

        self.device.viewport_resize(width, height);
        self.device.clear_frame();

        let cube_position = context.animation.advance(now);
        let stats = compose_frame(
            context,
            &mut self.device,
            &self.camera,
            aspect_ratio(width, height),
            cube_position,
        )?;
        self.device.finish_frame()?;

        let fps = context.fps.record_frame(now);
        if let Some(fps) = fps {
            log::info!("fps: {fps}");
        }

        Ok(FrameReport {
            fps,
            stats,
            cube_position,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ManualScheduler;
    use super::*;
    use crate::animation::{Phase, ORBIT_RADIUS, RISE_START_Y};
    use crate::device::recording::RecordingDevice;
    use crate::error::{DeviceError, LinkError};
    use approx::assert_relative_eq;

    fn running_driver() -> (FrameDriver<RecordingDevice>, ManualScheduler) {
        let mut driver = FrameDriver::new(RecordingDevice::new(), 800, 600);
        driver.init().expect("init");
        (driver, ManualScheduler::default())
    }

    #[test]
    fn first_frame_treats_missing_timestamp_as_zero() {
        let (mut driver, mut scheduler) = running_driver();
        let report = driver.render_frame(None, &mut scheduler).expect("frame");

        assert_relative_eq!(report.cube_position.y, RISE_START_Y);
        assert_eq!(report.fps, None);
        assert!(driver.is_running());
        assert_eq!(scheduler.pending.len(), 1);
    }

    #[test]
    fn sixty_one_frames_publish_sixty_one() {
        let (mut driver, mut scheduler) = running_driver();
        let mut timestamps = vec![None];
        timestamps.extend((1..=60).map(|i| Some((i as f64 * 1000.0 / 60.0).round())));
        assert_eq!(timestamps[1], Some(17.0));
        assert_eq!(timestamps[60], Some(1000.0));

        let mut published = Vec::new();
        for timestamp in timestamps {
            scheduler.fire();
            let report = driver.render_frame(timestamp, &mut scheduler).expect("frame");
            published.extend(report.fps);
        }

        assert_eq!(published, vec![61]);
        let context = driver.context().expect("context");
        assert_eq!(context.fps.frames(), 0);
        assert_eq!(context.fps.published(), Some(61));
    }

    #[test]
    fn every_frame_balances_the_stack() {
        let (mut driver, mut scheduler) = running_driver();
        for frame in 0..400 {
            let report = driver
                .render_frame(Some(frame as f64 * 16.0), &mut scheduler)
                .expect("frame");
            assert_eq!(report.stats.pushes, report.stats.pops);
            assert_eq!(report.stats.pushes, 7);
            assert_eq!(driver.context().expect("context").stack.depth(), 0);
        }
        let animation = &driver.context().expect("context").animation;
        assert!(matches!(animation.phase(), Phase::Orbiting { .. }));
    }

    #[test]
    fn orbit_is_reached_through_the_loop() {
        let (mut driver, mut scheduler) = running_driver();
        let mut last = None;
        for frame in 0..=250 {
            last = Some(driver.render_frame(Some(frame as f64 * 16.0), &mut scheduler).expect("frame"));
        }
        let position = last.expect("frames rendered").cube_position;
        let radius = (position.x * position.x + position.z * position.z).sqrt();
        assert_relative_eq!(radius, ORBIT_RADIUS, epsilon = 1e-4);
    }

    #[test]
    fn context_loss_cancels_pending_frame() {
        let (mut driver, mut scheduler) = running_driver();
        driver.render_frame(None, &mut scheduler).expect("frame");
        let pending = scheduler.pending[0];

        driver.on_context_lost(&mut scheduler);

        assert!(!driver.is_running());
        assert!(scheduler.pending.is_empty());
        assert_eq!(scheduler.cancelled, vec![pending]);
        assert!(driver.context().is_none());
        assert!(matches!(
            driver.render_frame(Some(16.0), &mut scheduler),
            Err(RenderError::NotInitialized)
        ));
    }

    #[test]
    fn context_restore_rebuilds_everything() {
        let (mut driver, mut scheduler) = running_driver();
        for frame in 0..300 {
            scheduler.fire();
            driver.render_frame(Some(frame as f64 * 16.0), &mut scheduler).expect("frame");
        }
        let uploads_before = driver.device().uploads();

        driver.on_context_lost(&mut scheduler);
        driver.on_context_restored(&mut scheduler).expect("restore");

        assert_eq!(driver.device().uploads(), uploads_before + 2);
        assert!(driver.is_running());
        assert_eq!(scheduler.pending.len(), 1);

        let context = driver.context().expect("context");
        assert_eq!(context.animation.phase(), Phase::Rising);
        assert_eq!(context.fps.frames(), 0);

        // Animation restarts from the first post-restore timestamp.
        scheduler.fire();
        let report = driver.render_frame(Some(9000.0), &mut scheduler).expect("frame");
        assert_relative_eq!(report.cube_position.y, RISE_START_Y);
    }

    #[test]
    fn link_failure_keeps_loop_stopped() {
        let mut driver = FrameDriver::new(RecordingDevice::failing_link(), 640, 480);
        let mut scheduler = ManualScheduler::default();

        assert!(matches!(driver.init(), Err(RenderError::Link(LinkError::Link(_)))));
        assert!(matches!(
            driver.render_frame(None, &mut scheduler),
            Err(RenderError::NotInitialized)
        ));
        assert!(scheduler.pending.is_empty());
    }

    #[test]
    fn device_failure_halts_the_loop() {
        let (mut driver, mut scheduler) = running_driver();
        driver.render_frame(None, &mut scheduler).expect("frame");

        driver.device_mut().fail_finish = true;
        let request = scheduler.fire().expect("frame scheduled");
        assert_eq!(request, FrameRequest(1));

        let result = driver.render_frame(Some(16.0), &mut scheduler);

        assert!(matches!(
            result,
            Err(RenderError::Device(DeviceError::ContextLost))
        ));
        assert!(!driver.is_running());
        assert_eq!(scheduler.cancelled, vec![FrameRequest(2)]);
        assert!(scheduler.pending.is_empty());
        // The context survives; only the loop stops.
        assert!(driver.context().is_some());
    }

    #[test]
    fn resize_feeds_viewport() {
        use crate::device::recording::Call;

        let (mut driver, mut scheduler) = running_driver();
        driver.resize(1024, 512);
        driver.render_frame(None, &mut scheduler).expect("frame");

        assert!(driver.device().calls.contains(&Call::Viewport(1024, 512)));
    }
}
