use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use meander_input::InputFrame;
use meander_render::RenderDevice;
use meander_stream::{StreamStats, StreamTotals};

use crate::KernelError;
use crate::camera::{FlyCamera, PoseBuffer};
use crate::clock::{Clock, RenderTimings};
use crate::config::EngineConfig;
use crate::scheduler::{Job, Role, RoleStats, Scheduler};
use crate::world::World;

/// What the caller should do after a pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    Continue,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStats {
    pub simulation: RoleStats,
    pub presentation: RoleStats,
    pub last_stream: StreamStats,
    pub stream_totals: StreamTotals,
    pub render: RenderTimings,
    pub uptime: Duration,
}

/// The control side of the engine.
///
/// [`pump`](Engine::pump) is called repeatedly from the thread that owns
/// input. It checks the clock, dispatches ticks and frames, and returns
/// without ever waiting on a worker.
pub struct Engine {
    config: EngineConfig,
    clock: Arc<Clock>,
    world: Arc<World>,
    device: Arc<dyn RenderDevice>,
    poses: Arc<PoseBuffer>,
    minimized: Arc<AtomicBool>,
    camera: FlyCamera,
    tick_input: InputFrame,
    frame_input: InputFrame,
    scheduler: Scheduler,
    stopped: bool,
}

impl Engine {
    /// Build the world, then start both workers.
    ///
    /// `display_refresh` is the monitor refresh rate in Hz, if known.
    pub fn start(
        config: EngineConfig,
        device: Arc<dyn RenderDevice>,
        display_refresh: Option<f64>,
    ) -> Result<Self, KernelError> {
        config.validate()?;
        let world = Arc::new(World::new(config.stream.clone())?);

        let mut camera = FlyCamera::default();
        camera.aspect = device.aspect();
        let poses = Arc::new(PoseBuffer::new(camera.pose()));
        let minimized = Arc::new(AtomicBool::new(false));

        let frame_rate = config.frame_rate(display_refresh);
        let clock = Arc::new(Clock::new(config.tick_rate, frame_rate));

        let simulation: Job = {
            let world = Arc::clone(&world);
            let poses = Arc::clone(&poses);
            Box::new(move || {
                world.tick(&poses.latest());
                Ok(())
            })
        };

        let presentation: Job = {
            let world = Arc::clone(&world);
            let poses = Arc::clone(&poses);
            let device = Arc::clone(&device);
            let clock = Arc::clone(&clock);
            let minimized = Arc::clone(&minimized);
            Box::new(move || {
                clock.start_render();
                if minimized.load(Ordering::Acquire) {
                    clock.stop_render();
                    return Ok(());
                }
                device.begin_frame(&poses.latest())?;
                world.render(device.as_ref())?;
                device.end_frame()?;
                clock.stop_render();
                Ok(())
            })
        };

        let scheduler = Scheduler::spawn(Arc::clone(&clock), simulation, presentation)?;
        tracing::info!(
            tick_rate = config.tick_rate,
            frame_rate,
            radius = config.stream.radius,
            device = ?device.kind(),
            "engine started"
        );

        Ok(Self {
            config,
            clock,
            world,
            device,
            poses,
            minimized,
            camera,
            tick_input: InputFrame::default(),
            frame_input: InputFrame::default(),
            scheduler,
            stopped: false,
        })
    }

    /// Fold in new input and dispatch whatever is due.
    pub fn pump(&mut self, input: &InputFrame) -> Result<Pump, KernelError> {
        if let Some(fault) = self.scheduler.fault() {
            return Err(fault);
        }
        self.tick_input.merge(input);
        self.frame_input.merge(input);

        let tick_due = self.clock.tick_due();
        let frame_due = self.clock.frame_due();

        if tick_due {
            if self.tick_input.take().quit {
                tracing::info!("quit requested");
                return Ok(Pump::Quit);
            }
            self.scheduler.request_tick(|| {});
        }

        if frame_due {
            self.scheduler.request_frame(|| {
                let dt = self.clock.mark_frame().as_secs_f32();
                let input = self.frame_input.take();
                if let Some((width, height)) = input.resize {
                    self.device.resize(width, height);
                    self.camera.aspect = self.device.aspect();
                    tracing::debug!(width, height, "viewport resized");
                }
                self.minimized.store(input.minimized, Ordering::Release);
                self.camera.apply(&input, dt);
                self.poses.publish(self.camera.pose());
            });
        }

        if !tick_due && !frame_due {
            std::thread::yield_now();
        }
        Ok(Pump::Continue)
    }

    /// Re-pace presentation after the window moved to another display.
    pub fn set_display_refresh(&self, display_refresh: Option<f64>) {
        self.clock
            .set_frame_rate(self.config.frame_rate(display_refresh));
    }

    /// Stop and join the workers, then wait for the device to go idle.
    /// Reports a worker fault if one ended the run.
    pub fn shutdown(&mut self) -> Result<(), KernelError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        let joined = self.scheduler.shutdown();
        self.device.wait_for_idle();
        tracing::info!(
            uptime_s = self.clock.uptime().as_secs_f64(),
            ticks = self.scheduler.stats(Role::Simulation).completed,
            frames = self.scheduler.stats(Role::Presentation).completed,
            "engine stopped"
        );
        joined?;
        match self.scheduler.fault() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            simulation: self.scheduler.stats(Role::Simulation),
            presentation: self.scheduler.stats(Role::Presentation),
            last_stream: self.world.last_update(),
            stream_totals: self.world.totals(),
            render: self.clock.render_timings(),
            uptime: self.clock.uptime(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn camera(&self) -> &FlyCamera {
        &self.camera
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!(%err, "engine shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meander_common::{CameraPose, ChunkCoord};
    use meander_input::{Action, Control};
    use meander_render::{BufferHandle, BufferKind, DeviceKind, NullDevice, Pipeline, RenderError};
    use meander_stream::StreamConfig;
    use std::sync::atomic::AtomicU64;
    use std::time::Instant;

    fn fast_config() -> EngineConfig {
        EngineConfig {
            tick_rate: 1000.0,
            fallback_frame_rate: 1000.0,
            stream: StreamConfig {
                chunk_size: 4,
                resolution: 1,
                radius: 2,
                ..StreamConfig::default()
            },
        }
    }

    fn pump_until(
        engine: &mut Engine,
        input: &InputFrame,
        mut done: impl FnMut(&Engine) -> bool,
    ) -> Result<Pump, KernelError> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let pump = engine.pump(input)?;
            if pump == Pump::Quit || done(engine) {
                return Ok(pump);
            }
            assert!(Instant::now() < deadline, "engine never reached the condition");
            std::thread::yield_now();
        }
    }

    #[test]
    fn frames_draw_every_resident_chunk() {
        let device = Arc::new(NullDevice::new());
        let mut engine = Engine::start(fast_config(), device.clone(), None).unwrap();

        pump_until(&mut engine, &InputFrame::default(), |e| {
            e.stats().presentation.completed >= 5 && e.stats().simulation.completed >= 5
        })
        .unwrap();
        engine.shutdown().unwrap();

        let stats = device.stats();
        assert!(stats.frames >= 5);
        assert_eq!(stats.draws, stats.frames * 25);
        assert_eq!(engine.stats().presentation.peak_in_flight, 1);
        assert!(engine.stats().render.samples > 0);
    }

    #[test]
    fn flying_forward_streams_new_chunks() {
        let device = Arc::new(NullDevice::new());
        let mut engine = Engine::start(fast_config(), device, None).unwrap();
        let forward = InputFrame::aggregate([Action::Press(Control::MoveForward)]);

        pump_until(&mut engine, &forward, |e| e.world().observer().y >= 1).unwrap();
        engine.shutdown().unwrap();

        assert!(engine.camera().position.y >= 4.0);
        assert!(engine.stats().stream_totals.updates >= 2);
        assert!(engine.world().chunk_at(ChunkCoord::new(0, 3)).is_some());
    }

    #[test]
    fn quit_ends_the_loop() {
        let device = Arc::new(NullDevice::new());
        let mut engine = Engine::start(fast_config(), device, None).unwrap();
        let quit = InputFrame::aggregate([Action::Quit]);
        assert_eq!(pump_until(&mut engine, &quit, |_| false).unwrap(), Pump::Quit);
        engine.shutdown().unwrap();
    }

    #[test]
    fn minimized_window_skips_the_device() {
        let device = Arc::new(NullDevice::new());
        let mut engine = Engine::start(fast_config(), device.clone(), None).unwrap();
        let minimized = InputFrame::aggregate([Action::Minimized(true)]);

        // The first frame publishes the flag; later frames see it.
        pump_until(&mut engine, &minimized, |e| e.stats().presentation.completed >= 10).unwrap();
        engine.shutdown().unwrap();
        assert!(device.stats().frames <= 1);
        // Skipped frames are still timed.
        assert!(engine.stats().render.samples >= 10);
    }

    #[test]
    fn resize_reaches_device_and_camera() {
        let device = Arc::new(NullDevice::new());
        let mut engine = Engine::start(fast_config(), device.clone(), None).unwrap();
        let resized = InputFrame::aggregate([Action::Resize {
            width: 1000,
            height: 500,
        }]);

        pump_until(&mut engine, &resized, |e| e.camera().aspect == 2.0).unwrap();
        engine.shutdown().unwrap();
        assert_eq!(device.aspect(), 2.0);
    }

    /// Device whose frames always fail to start.
    struct LostSurface(NullDevice);

    impl RenderDevice for LostSurface {
        fn kind(&self) -> DeviceKind {
            self.0.kind()
        }

        fn create_buffer(
            &self,
            kind: BufferKind,
            data: &[u8],
            element_size: u32,
            element_count: u32,
        ) -> Result<BufferHandle, RenderError> {
            self.0.create_buffer(kind, data, element_size, element_count)
        }

        fn begin_frame(&self, _pose: &CameraPose) -> Result<(), RenderError> {
            Err(RenderError::Surface("lost".into()))
        }

        fn bind_pipeline(&self, pipeline: Pipeline) -> Result<(), RenderError> {
            self.0.bind_pipeline(pipeline)
        }

        fn draw_with_buffers(
            &self,
            vertex: &BufferHandle,
            index: &BufferHandle,
        ) -> Result<(), RenderError> {
            self.0.draw_with_buffers(vertex, index)
        }

        fn end_frame(&self) -> Result<(), RenderError> {
            self.0.end_frame()
        }

        fn wait_for_idle(&self) {
            self.0.wait_for_idle()
        }

        fn resize(&self, width: u32, height: u32) {
            self.0.resize(width, height)
        }

        fn aspect(&self) -> f32 {
            self.0.aspect()
        }
    }

    /// Device whose frames take a while to finish and which records whether
    /// it was asked to go idle with a frame still open.
    #[derive(Default)]
    struct SlowFrames {
        inner: NullDevice,
        in_frame: AtomicBool,
        idle_calls: AtomicU64,
        idle_during_frame: AtomicBool,
    }

    impl RenderDevice for SlowFrames {
        fn kind(&self) -> DeviceKind {
            self.inner.kind()
        }

        fn create_buffer(
            &self,
            kind: BufferKind,
            data: &[u8],
            element_size: u32,
            element_count: u32,
        ) -> Result<BufferHandle, RenderError> {
            self.inner.create_buffer(kind, data, element_size, element_count)
        }

        fn begin_frame(&self, pose: &CameraPose) -> Result<(), RenderError> {
            self.inner.begin_frame(pose)?;
            self.in_frame.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn bind_pipeline(&self, pipeline: Pipeline) -> Result<(), RenderError> {
            self.inner.bind_pipeline(pipeline)
        }

        fn draw_with_buffers(
            &self,
            vertex: &BufferHandle,
            index: &BufferHandle,
        ) -> Result<(), RenderError> {
            self.inner.draw_with_buffers(vertex, index)
        }

        fn end_frame(&self) -> Result<(), RenderError> {
            std::thread::sleep(Duration::from_millis(30));
            let result = self.inner.end_frame();
            self.in_frame.store(false, Ordering::SeqCst);
            result
        }

        fn wait_for_idle(&self) {
            self.idle_calls.fetch_add(1, Ordering::SeqCst);
            if self.in_frame.load(Ordering::SeqCst) {
                self.idle_during_frame.store(true, Ordering::SeqCst);
            }
            self.inner.wait_for_idle()
        }

        fn resize(&self, width: u32, height: u32) {
            self.inner.resize(width, height)
        }

        fn aspect(&self) -> f32 {
            self.inner.aspect()
        }
    }

    #[test]
    fn shutdown_joins_workers_before_device_idle() {
        let device = Arc::new(SlowFrames::default());
        let mut engine = Engine::start(fast_config(), device.clone(), None).unwrap();

        // Stop while a frame is open on the presentation thread.
        let watched = Arc::clone(&device);
        pump_until(&mut engine, &InputFrame::default(), move |_| {
            watched.in_frame.load(Ordering::SeqCst)
        })
        .unwrap();
        engine.shutdown().unwrap();

        assert_eq!(device.idle_calls.load(Ordering::SeqCst), 1);
        assert!(!device.idle_during_frame.load(Ordering::SeqCst));
        let frames = device.inner.stats().frames;
        assert!(frames >= 1);
        assert_eq!(frames, engine.stats().presentation.completed);

        drop(engine);
        assert_eq!(device.idle_calls.load(Ordering::SeqCst), 1);
        assert_eq!(device.inner.stats().frames, frames);
    }

    #[test]
    fn presentation_failure_surfaces_as_fault() {
        let device = Arc::new(LostSurface(NullDevice::new()));
        let mut engine = Engine::start(fast_config(), device, None).unwrap();

        let err = pump_until(&mut engine, &InputFrame::default(), |_| false).unwrap_err();
        assert!(matches!(
            err,
            KernelError::WorkerFault {
                role: Role::Presentation,
                ..
            }
        ));
        assert!(engine.shutdown().is_err());
    }
}
