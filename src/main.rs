#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = cli::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::env;
    use std::path::PathBuf;
    use std::time::Duration;

    use anyhow::{anyhow, Context, Result};
    use pollster::block_on;

    use viewport_session::app::{run_windowed, WindowInitError};
    use viewport_session::{
        FileLoader, HeadlessRenderer, ManualTime, OffscreenSurface, Session, ViewerConfig,
    };

    const FRAME_STEP: Duration = Duration::from_nanos(16_666_667);
    const USAGE: &str =
        "Usage: viewport-session [MODEL] [--config FILE] [--headless] [--frames N] [--bloom]";

    pub fn run() -> Result<()> {
        let options = CliOptions::parse(env::args().skip(1))?;
        let mut config = match &options.config {
            Some(path) => ViewerConfig::load(path)?,
            None if options.bloom => ViewerConfig::bloom_showcase(),
            None => ViewerConfig::default(),
        };
        if options.model.is_some() {
            config.model = options.model.clone();
        }

        if options.headless {
            return run_headless(&config, options.frames);
        }
        match run_windowed(config.clone()) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --headless mode (set DISPLAY or install a GPU driver to enable rendering)."
                    );
                    run_headless(&config, options.frames)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn run_headless(config: &ViewerConfig, frames: u32) -> Result<()> {
        let time = ManualTime::new();
        let mut session = Session::initialize(
            OffscreenSurface::new(config.width, config.height),
            HeadlessRenderer::new(),
            config,
            Box::new(time.clone()),
        )
        .context("failed to initialize viewport session")?;

        match &config.model {
            Some(url) => {
                let loader = FileLoader::new(".");
                if let Err(err) = block_on(session.request_asset(&loader, url)) {
                    eprintln!("Failed to load {url}: {err}");
                }
            }
            None => session.mark_ready()?,
        }
        println!("Load state: {:?}", session.load_state());

        for _ in 0..frames {
            time.advance(FRAME_STEP);
            session.run_frame().context("frame failed")?;
        }

        let stats = session.renderer().stats();
        println!("Rendered {} frame(s)", stats.frames);
        println!(
            "Draw items: {} ({} visible triangles, {} lights)",
            stats.last_draw_items, stats.last_visible_triangles, stats.last_light_count
        );
        if let Some(effects) = stats.last_effects {
            println!(
                "Post-processing: bloom={} tone mapping={:?} exposure={:.2}",
                effects.bloom.is_some(),
                effects.tone_mapping,
                effects.exposure
            );
        }
        println!("Camera aspect: {:.2}", session.camera().aspect());
        session.teardown();
        Ok(())
    }

    #[derive(Debug, Default)]
    struct CliOptions {
        model: Option<String>,
        config: Option<PathBuf>,
        headless: bool,
        frames: u32,
        bloom: bool,
    }

    impl CliOptions {
        fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
            let mut options = Self {
                frames: 120,
                ..Self::default()
            };
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--headless" => options.headless = true,
                    "--bloom" => options.bloom = true,
                    "--config" => {
                        let path = args
                            .next()
                            .ok_or_else(|| anyhow!("--config needs a file. {USAGE}"))?;
                        options.config = Some(PathBuf::from(path));
                    }
                    "--frames" => {
                        let count = args
                            .next()
                            .ok_or_else(|| anyhow!("--frames needs a count. {USAGE}"))?;
                        options.frames = count
                            .parse()
                            .with_context(|| format!("invalid frame count {count:?}"))?;
                    }
                    other if other.starts_with("--") => {
                        return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                    }
                    _ if options.model.is_none() => options.model = Some(arg.clone()),
                    _ => return Err(anyhow!("Unexpected argument: {arg}. {USAGE}")),
                }
            }
            Ok(options)
        }
    }
}
