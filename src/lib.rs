pub mod app;
pub mod io;
pub mod renderer;
pub mod settings;

use app::App;
use renderer::RenderError;
use settings::RendererSettings;
use winit::event_loop::EventLoop;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

pub fn run() -> Result<(), RenderError> {
    init_logging();

    log::info!("Starting statecore demo");

    let settings = RendererSettings::load();
    let event_loop = EventLoop::new()?;
    let mut app = App::new(settings);

    let result = event_loop.run_app(&mut app);

    if let Err(ref err) = result {
        log::error!("Application error: {}", err);
    }
    result?;

    log::info!("Application shutdown complete");

    match app.take_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
