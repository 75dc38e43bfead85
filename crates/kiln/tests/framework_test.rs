//! Integration test for the frame driver on the headless backend.
//!
//! Each test runs the real sim/render/message threads to completion; the
//! module ends the run by queueing a shutdown after a fixed number of ticks.

use crossbeam_channel::Sender;
use kiln::{
    AppCallbacks, AppFramework, AppState, BackendCall, BackendOp, BackendProbe, DeviceError,
    EngineApp, FeatureLevel, FrameDriverConfig, HeadlessBackend, Host, HostConfig, Module,
    ModuleFactory, ScreenMode, SwapChainDesc, WindowCloser, WindowIntents, WindowMessage,
};
use kiln_core::settings::CORE_DEFAULTS;
use kiln_core::{Parameters, PreferenceSources};
use parking_lot::Mutex;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn panicking_terminator(code: i32) -> ! {
    panic!("terminated with exit code {code}")
}

// =============================================================================
// ENGINE FIXTURE
// =============================================================================

#[derive(Default)]
struct Probe {
    ticks: AtomicUsize,
    draws: AtomicUsize,
    early_draws: AtomicUsize,
    bad_alpha: AtomicUsize,
    first_draws: AtomicUsize,
    device_resets: AtomicUsize,
    back_buffer_changes: AtomicUsize,
    shut_downs: AtomicUsize,
    panics: AtomicUsize,
}

struct CountingModule {
    probe: Arc<Probe>,
    /// Ticks before the module asks to quit; `None` runs until closed.
    quit_after: Option<usize>,
}

impl Module for CountingModule {
    fn st_update(&self, host: &Host, _elapsed: Duration) -> bool {
        let ticks = self.probe.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        if Some(ticks) == self.quit_after {
            host.queue_shut_down();
        }
        true
    }

    fn st_shut_down(&self, host: &Host) {
        self.probe.shut_downs.fetch_add(1, Ordering::SeqCst);
        host.shut_down();
    }

    fn rt_before_first_draw(&self, _host: &Host) -> bool {
        self.probe.first_draws.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn rt_before_device_reset(&self, _host: &Host) -> bool {
        self.probe.device_resets.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn rt_back_buffer_change(&self, _host: &Host) -> bool {
        self.probe.back_buffer_changes.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn rt_draw(&self, _host: &Host, alpha: f64) -> bool {
        if self.probe.ticks.load(Ordering::SeqCst) == 0 {
            self.probe.early_draws.fetch_add(1, Ordering::SeqCst);
        }
        if !(0.0..1.0).contains(&alpha) {
            self.probe.bad_alpha.fetch_add(1, Ordering::SeqCst);
        }
        self.probe.draws.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn panic(&self) {
        self.probe.panics.fetch_add(1, Ordering::SeqCst);
    }
}

struct CountingFactory {
    probe: Arc<Probe>,
    quit_after: Option<usize>,
}

impl ModuleFactory for CountingFactory {
    fn create_module(&self, _host: &Host) -> Option<Arc<dyn Module>> {
        Some(Arc::new(CountingModule {
            probe: Arc::clone(&self.probe),
            quit_after: self.quit_after,
        }))
    }
}

type Reports = Arc<Mutex<Vec<(String, String)>>>;

struct Engine {
    _dir: TempDir,
    host: Arc<Host>,
    framework: AppFramework<HeadlessBackend>,
    backend: BackendProbe,
    reports: Reports,
}

fn engine(probe: &Arc<Probe>, quit_after: Option<usize>, interpolate: bool) -> Engine {
    let dir = tempfile::tempdir().unwrap();
    let content = dir.path().join("content");
    fs::create_dir_all(&content).unwrap();
    let core = dir.path().join("core.toml");
    fs::write(&core, CORE_DEFAULTS).unwrap();
    let game = dir.path().join("game.toml");
    let flag = if interpolate { "1" } else { "0" };
    fs::write(&game, format!("simFps = \"200\"\ninterpolateFrames = \"{flag}\"\n")).unwrap();

    let config = HostConfig {
        content_dir: content,
        save_dir: dir.path().join("saves"),
        preferences: PreferenceSources {
            core_defaults: core,
            game_defaults: Some(game),
            user: dir.path().join("user.toml"),
        },
        params: Parameters::new(),
        game_uid: "framework-test".to_owned(),
        game_version: "1".to_owned(),
    };
    let factory = CountingFactory {
        probe: Arc::clone(probe),
        quit_after,
    };
    let host = Host::new(config, Box::new(factory))
        .unwrap()
        .with_terminator(panicking_terminator);
    let host = Arc::new(host);

    let reports: Reports = Arc::default();
    let sink = Arc::clone(&reports);
    host.set_fatal_handler(move |sender, message| {
        sink.lock().push((sender.to_owned(), message.to_owned()));
    });

    let app = Arc::new(EngineApp::new(Arc::clone(&host)).unwrap());
    let (backend, backend_probe) = HeadlessBackend::new(&FeatureLevel::ALL);
    let framework = AppFramework::new(backend, app, host.intents(), FrameDriverConfig::default());
    let closer = framework.closer();
    host.set_shutdown_handler(move || closer.close_window());

    Engine {
        _dir: dir,
        host,
        framework,
        backend: backend_probe,
        reports,
    }
}

#[test]
fn test_run_until_module_quits() {
    let probe = Arc::new(Probe::default());
    let engine = engine(&probe, Some(20), false);
    let state = engine.framework.state();
    assert_eq!(state.get(), AppState::WindowCreated);

    engine.framework.run().unwrap();

    assert_eq!(state.get(), AppState::Terminated);
    assert!(probe.ticks.load(Ordering::SeqCst) >= 20);
    assert!(probe.draws.load(Ordering::SeqCst) > 0);
    assert_eq!(probe.early_draws.load(Ordering::SeqCst), 0);
    assert_eq!(probe.first_draws.load(Ordering::SeqCst), 1);
    assert_eq!(probe.shut_downs.load(Ordering::SeqCst), 1);
    assert!(engine.backend.presents() > 0);
    assert_eq!(engine.backend.ops().last(), Some(&BackendOp::Uninit));
    assert!(engine.reports.lock().is_empty());

    let info = engine.host.host_info();
    assert_eq!(info.sim_frames, probe.ticks.load(Ordering::SeqCst) as u64);
}

#[test]
fn test_interpolated_run() {
    let probe = Arc::new(Probe::default());
    let engine = engine(&probe, Some(20), true);
    engine.framework.run().unwrap();

    assert_eq!(probe.early_draws.load(Ordering::SeqCst), 0);
    assert!(probe.draws.load(Ordering::SeqCst) > 0);
    assert_eq!(probe.bad_alpha.load(Ordering::SeqCst), 0);
    assert!(engine.reports.lock().is_empty());
}

#[test]
fn test_device_loss_recovers() {
    let probe = Arc::new(Probe::default());
    let engine = engine(&probe, Some(40), false);
    engine
        .backend
        .inject(BackendCall::Present, DeviceError::Removed);

    engine.framework.run().unwrap();

    assert_eq!(probe.device_resets.load(Ordering::SeqCst), 1);
    assert!(probe.back_buffer_changes.load(Ordering::SeqCst) >= 1);
    let ops = engine.backend.ops();
    let inits = ops
        .iter()
        .filter(|op| matches!(op, BackendOp::Init(_)))
        .count();
    assert_eq!(inits, 2);
    assert!(engine.backend.presents() > 0);
    assert!(engine.reports.lock().is_empty());
}

#[test]
fn test_other_device_failure_is_fatal() {
    let probe = Arc::new(Probe::default());
    let engine = engine(&probe, Some(20), false);
    engine
        .backend
        .inject(BackendCall::Clear, DeviceError::Failed("boom".to_owned()));

    engine.framework.run().unwrap();

    let reports = engine.reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "AppFramework");
    assert!(reports[0].1.contains("boom"));
    assert_eq!(probe.panics.load(Ordering::SeqCst), 1);
    assert_eq!(probe.device_resets.load(Ordering::SeqCst), 0);
}

#[test]
fn test_external_close_goes_through_module() {
    let probe = Arc::new(Probe::default());
    let engine = engine(&probe, None, false);
    let sender = engine.framework.window_sender();

    let poster = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        sender.send(WindowMessage::Close).unwrap();
    });
    engine.framework.run().unwrap();
    poster.join().unwrap();

    assert!(engine.host.is_shut_down_queued());
    assert_eq!(probe.shut_downs.load(Ordering::SeqCst), 1);
}

// =============================================================================
// DEVICE CHANGE ORDERING
// =============================================================================

/// Minimal callbacks that close the window after a few presents.
struct Recorder {
    desc: SwapChainDesc,
    presents: AtomicUsize,
    close_after: usize,
    closer: OnceLock<WindowCloser>,
    resizes: Mutex<Vec<(u32, u32)>>,
    /// Queues a backbuffer change after this many presents.
    change_after: OnceLock<(usize, Arc<WindowIntents>)>,
    /// Queues backend faults after this many presents.
    faults_after: OnceLock<(usize, BackendProbe, Vec<(BackendCall, DeviceError)>)>,
}

impl AppCallbacks for Recorder {
    fn on_sim_tick(&self) {
        thread::sleep(Duration::from_millis(1));
    }

    fn on_draw(&self) {
        thread::sleep(Duration::from_millis(1));
    }

    fn on_after_present(&self) {
        let presents = self.presents.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, intents)) = self.change_after.get() {
            if presents == *after {
                intents.queue_back_buffer_change();
            }
        }
        if let Some((after, backend, faults)) = self.faults_after.get() {
            if presents == *after {
                for (call, error) in faults {
                    backend.inject(*call, error.clone());
                }
            }
        }
        if presents == self.close_after {
            if let Some(closer) = self.closer.get() {
                closer.close_window();
            }
        }
    }

    fn on_resize(&self, width: u32, height: u32) {
        self.resizes.lock().push((width, height));
    }

    fn on_external_close(&self) {}

    fn on_fatal(&self, sender: &str, message: &str) -> ! {
        panic!("{sender}: {message}")
    }

    fn swap_chain_desc(&self) -> SwapChainDesc {
        self.desc
    }
}

fn recorder(close_after: usize) -> Arc<Recorder> {
    Arc::new(Recorder {
        desc: SwapChainDesc {
            width: 800,
            height: 600,
            multisample_level: 1,
        },
        presents: AtomicUsize::new(0),
        close_after,
        closer: OnceLock::new(),
        resizes: Mutex::new(Vec::new()),
        change_after: OnceLock::new(),
        faults_after: OnceLock::new(),
    })
}

fn run_recorder(
    recorder: &Arc<Recorder>,
    intents: Arc<WindowIntents>,
    config: FrameDriverConfig,
    before_run: impl FnOnce(&Sender<WindowMessage>, &BackendProbe),
) -> BackendProbe {
    let (backend, probe) = HeadlessBackend::new(&FeatureLevel::ALL);
    let callbacks: Arc<dyn AppCallbacks> = Arc::clone(recorder) as Arc<dyn AppCallbacks>;
    let framework = AppFramework::new(backend, callbacks, intents, config);
    assert!(recorder.closer.set(framework.closer()).is_ok());
    before_run(&framework.window_sender(), &probe);
    framework.run().unwrap();
    probe
}

fn second_init(ops: &[BackendOp]) -> usize {
    ops.iter()
        .enumerate()
        .filter(|(_, op)| matches!(op, BackendOp::Init(_)))
        .map(|(i, _)| i)
        .nth(1)
        .unwrap()
}

#[test]
fn test_one_device_change_per_frame_in_priority_order() {
    let rec = recorder(5);
    let intents = Arc::new(WindowIntents::new(800, 600, false));
    intents.request_screen_mode(ScreenMode::Fullscreen);
    intents.set_size(640, 480);
    intents.request_resize();
    intents.queue_back_buffer_change();

    let probe = run_recorder(&rec, intents, FrameDriverConfig::default(), |_, _| {});

    let desc = rec.desc;
    let present = BackendOp::Present { vsync: true };
    let expected = vec![
        BackendOp::Init(FeatureLevel::Level12_0),
        BackendOp::ResizeBuffers(800, 600),
        // frame 1: backbuffer change
        BackendOp::RecreateSwapChain(desc),
        BackendOp::ResizeBuffers(800, 600),
        BackendOp::Clear,
        present.clone(),
        // frame 2: resize
        BackendOp::ResizeBuffers(640, 480),
        BackendOp::Clear,
        present.clone(),
        // frame 3: fullscreen
        BackendOp::ResizeTarget(800, 600),
        BackendOp::SetFullscreen(true),
        BackendOp::Clear,
        present,
    ];
    let ops = probe.ops();
    assert_eq!(&ops[..expected.len()], &expected[..]);
    assert_eq!(*rec.resizes.lock(), vec![(640, 480)]);
}

#[test]
fn test_back_buffer_change_preserves_fullscreen() {
    let rec = recorder(4);
    let intents = Arc::new(WindowIntents::new(800, 600, true));
    assert!(rec.change_after.set((1, Arc::clone(&intents))).is_ok());

    let probe = run_recorder(&rec, intents, FrameDriverConfig::default(), |_, _| {});

    // Startup fullscreen is applied on the first frame, the change on the
    // second; it must leave and re-enter fullscreen around the recreation.
    let ops = probe.ops();
    assert_eq!(ops[2], BackendOp::ResizeTarget(800, 600));
    assert_eq!(ops[3], BackendOp::SetFullscreen(true));
    let recreate = ops
        .iter()
        .position(|op| matches!(op, BackendOp::RecreateSwapChain(_)))
        .unwrap();
    assert_eq!(ops[recreate - 1], BackendOp::SetFullscreen(false));
    assert_eq!(ops[recreate + 1], BackendOp::SetFullscreen(true));
    assert_eq!(ops[recreate + 2], BackendOp::ResizeBuffers(800, 600));
}

#[test]
fn test_drag_resize_reaches_render_thread() {
    let rec = recorder(50);
    let intents = Arc::new(WindowIntents::new(800, 600, false));

    run_recorder(&rec, intents, FrameDriverConfig::default(), |sender, _| {
        let size = |width, height| WindowMessage::Size {
            width,
            height,
            kind: kiln::ResizeKind::Restored,
        };
        sender.send(WindowMessage::EnterSizeMove).unwrap();
        sender.send(size(900, 700)).unwrap();
        sender.send(size(1000, 750)).unwrap();
        sender.send(WindowMessage::ExitSizeMove).unwrap();
    });

    assert_eq!(*rec.resizes.lock(), vec![(1000, 750)]);
}

#[test]
fn test_device_loss_restores_fullscreen() {
    let rec = recorder(4);
    let intents = Arc::new(WindowIntents::new(800, 600, true));

    let probe = run_recorder(&rec, Arc::clone(&intents), FrameDriverConfig::default(), |_, backend| {
        backend.inject(BackendCall::Present, DeviceError::Removed);
    });

    // The first present fails after the startup switch to fullscreen; the
    // recreated swapchain starts windowed and must be switched back.
    assert!(intents.is_fullscreen());
    let ops = probe.ops();
    let init = second_init(&ops);
    assert_eq!(ops[init - 1], BackendOp::Uninit);
    assert_eq!(
        &ops[init + 1..init + 4],
        &[
            BackendOp::ResizeBuffers(800, 600),
            BackendOp::ResizeTarget(800, 600),
            BackendOp::SetFullscreen(true),
        ]
    );
}

#[test]
fn test_device_recreation_retries_after_delay() {
    let rec = recorder(4);
    let intents = Arc::new(WindowIntents::new(800, 600, false));
    let config = FrameDriverConfig {
        device_retry_delay: Duration::from_millis(150),
        ..FrameDriverConfig::default()
    };

    let started = Instant::now();
    let probe = run_recorder(&rec, intents, config, |_, backend| {
        let faults = vec![
            (BackendCall::Init, DeviceError::Reset),
            (BackendCall::Present, DeviceError::Removed),
        ];
        assert!(rec.faults_after.set((1, backend.clone(), faults)).is_ok());
    });

    // The second present loses the device and the first reinit finds it
    // still lost; the retry waits.
    assert!(started.elapsed() >= Duration::from_millis(150));
    let ops = probe.ops();
    let init = second_init(&ops);
    assert_eq!(ops[init + 1], BackendOp::ResizeBuffers(800, 600));
    assert!(probe.presents() >= 4);
}
