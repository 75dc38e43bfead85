//! # KILN Headless Host
//!
//! Runs a demo module on the headless backend for a fixed number of
//! simulation frames, then shuts down through the module's own shutdown
//! path and commits a save on the way out.
//!
//! ```bash
//! RUST_LOG=debug kiln_host -gamesDir:./game -userDir:./user -frames:300
//! ```
//!
//! ## Layout
//!
//! ```text
//!   <gamesDir>/core.toml         engine defaults (written if missing)
//!   <gamesDir>/preferences.toml  game defaults (optional)
//!   <gamesDir>/content/          mounted as the VFS root
//!   <userDir>/preferences.toml   user preferences (always rewritten)
//!   <userDir>/saves/             save slots
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kiln::{
    AppFramework, EngineApp, FeatureLevel, FrameDriverConfig, HeadlessBackend, Host, HostConfig,
    HostResult, Module, ModuleFactory,
};
use kiln_core::settings::CORE_DEFAULTS;
use kiln_core::{Parameters, PreferenceSources};
use tracing_subscriber::EnvFilter;

/// Frames simulated when `-frames` is absent.
const DEFAULT_FRAMES: u64 = 120;

/// Counts frames and asks to quit once enough have run.
struct DemoModule {
    frames: u64,
    sim_frames: AtomicU64,
    draws: AtomicU64,
}

impl Module for DemoModule {
    fn st_new(&self, host: &Host) -> bool {
        let entries = host.vfs().root().map_or(0, |root| host.vfs().child_count(root));
        tracing::info!("Demo module started, {entries} content entries");
        true
    }

    fn st_update(&self, host: &Host, _elapsed: Duration) -> bool {
        if self.sim_frames.fetch_add(1, Ordering::Relaxed) + 1 == self.frames {
            host.queue_shut_down();
        }
        true
    }

    fn st_shut_down(&self, host: &Host) {
        let saved = host.saves().begin_save("demo").and_then(|pending| {
            let frames = self.sim_frames.load(Ordering::Relaxed).to_string();
            let path = pending.data_dir().join("frames.txt");
            fs::write(&path, frames).map_err(|e| kiln::SaveError::Io { path, source: e })?;
            host.saves().complete_save(pending.name())
        });
        if let Err(e) = saved {
            tracing::warn!("Demo save failed: {e}");
        }
        host.shut_down();
    }

    fn rt_draw(&self, _host: &Host, _alpha: f64) -> bool {
        self.draws.fetch_add(1, Ordering::Relaxed);
        true
    }
}

struct DemoFactory {
    frames: u64,
}

impl ModuleFactory for DemoFactory {
    fn create_module(&self, _host: &Host) -> Option<Arc<dyn Module>> {
        Some(Arc::new(DemoModule {
            frames: self.frames,
            sim_frames: AtomicU64::new(0),
            draws: AtomicU64::new(0),
        }))
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();

    let mut params = Parameters::new();
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = params.add_parameter_string(&args.join(" ")) {
        tracing::warn!("Ignoring rest of command line: {e}");
    }

    match run(params) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("kiln_host failed ({}): {e}", e.code());
            ExitCode::FAILURE
        }
    }
}

fn run(params: Parameters) -> HostResult<()> {
    let scratch = std::env::temp_dir().join("kiln_host");
    let games_dir = dir_param(&params, "gamesDir", &scratch.join("game"));
    let user_dir = dir_param(&params, "userDir", &scratch.join("user"));
    let frames = params
        .get("frames")
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_FRAMES);

    let config = prepare_dirs(&games_dir, &user_dir, params)?;
    let factory = DemoFactory { frames };
    let host = Arc::new(Host::new(config, Box::new(factory))?);
    let app = Arc::new(EngineApp::new(Arc::clone(&host))?);

    let (backend, probe) = HeadlessBackend::new(&FeatureLevel::ALL);
    let framework = AppFramework::new(backend, app, host.intents(), FrameDriverConfig::default());
    let closer = framework.closer();
    host.set_shutdown_handler(move || closer.close_window());

    framework.run()?;
    host.save_preferences()?;

    tracing::info!("{} ({} presents)", host.host_info(), probe.presents());
    Ok(())
}

fn dir_param(params: &Parameters, key: &str, fallback: &Path) -> PathBuf {
    params
        .get(key)
        .filter(|value| !value.is_empty())
        .map_or_else(|| fallback.to_path_buf(), PathBuf::from)
}

fn prepare_dirs(games_dir: &Path, user_dir: &Path, params: Parameters) -> HostResult<HostConfig> {
    let io = |path: &Path, source| kiln::SaveError::Io {
        path: path.to_path_buf(),
        source,
    };

    let content_dir = games_dir.join("content");
    fs::create_dir_all(&content_dir).map_err(|e| io(&content_dir, e))?;
    fs::create_dir_all(user_dir).map_err(|e| io(user_dir, e))?;

    let core_defaults = games_dir.join("core.toml");
    if !core_defaults.exists() {
        fs::write(&core_defaults, CORE_DEFAULTS).map_err(|e| io(&core_defaults, e))?;
    }

    Ok(HostConfig {
        content_dir,
        save_dir: user_dir.join("saves"),
        preferences: PreferenceSources {
            core_defaults,
            game_defaults: Some(games_dir.join("preferences.toml")),
            user: user_dir.join("preferences.toml"),
        },
        params,
        game_uid: "kiln-demo".to_owned(),
        game_version: env!("CARGO_PKG_VERSION").to_owned(),
    })
}
