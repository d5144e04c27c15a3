// Module declarations
mod app;
mod config;
mod constants;
mod home_assistant;
mod jinja;
mod logging;
mod manager;
mod payload;
mod schedule;
mod sign;
mod variable;

use app::cli::Args;
use app::{App, main_loop::AppMainLoop, mqtt};
use clap::Parser;
use config::{Config, Layout};
use manager::MessageManager;
use sign::SignInterface;
use sign::console::ConsoleSign;
use sign::serial::SerialSign;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    // Parse command line arguments
    let args = Args::parse();

    // Determine config path for logging later
    let config_path = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .map(|d| d.join("marquee").join("config.toml"))
            .unwrap_or_default()
    });
    let config_existed = config_path.exists();

    // Load config first for logger initialization
    let mut config = Config::load(args.config.clone())?;

    if let Some(ref device) = args.device {
        config.sign.device = device.clone();
    }

    // Initialize logger first
    if config.logging.enabled {
        logging::ensure_log_directory()?;
        logging::init_logger(&config.logging, args.debug)?;
        logging::log_startup_info();
        // Log config loading now that logger is initialized
        logging::log_config_loading(&config_path, !config_existed);
    }

    // Load and validate the sign layout before touching the device
    let layout = Layout::load(&args.layout)?;
    let manager = MessageManager::new(layout)?;

    let device: Box<dyn SignInterface> = if config.sign.device == "cli" {
        log::info!("using console output instead of a sign");
        Box::new(ConsoleSign::default())
    } else {
        log::info!("using serial sign on {}", config.sign.device);
        Box::new(SerialSign::new(&config.sign.device))
    };

    let mut app = App::new(config, manager, device)?;

    let eventloop = match app.config.mqtt.host {
        Some(_) => {
            let (client, eventloop) = mqtt::connect(&app.config.mqtt)?;
            app.mqtt = Some(client);
            Some(eventloop)
        }
        None => {
            log::warn!("no MQTT broker configured, mqtt variables will never update");
            None
        }
    };

    let result = app.run(eventloop).await;

    logging::log_shutdown_info();

    result
}
