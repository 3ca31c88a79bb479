use anyhow::{bail, Result};
use log::{debug, error, info};
use std::time::Instant;

use skincam::cli;
use skincam::common::logging_setup;
use skincam::config_loader;
use skincam::operations;

const DEFAULT_CONFIG_PATH: &str = "config/skincam.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let main_start_time = Instant::now();
    let matches = cli::build_cli().get_matches();

    // An explicit --config must load; the default path may be absent.
    let explicit_config = matches.get_one::<String>("config").map(|s| s.as_str());
    let config_path = explicit_config.unwrap_or(DEFAULT_CONFIG_PATH);

    let config_load_start_time = Instant::now();
    let loaded = match explicit_config {
        Some(path) => config_loader::load_config(path),
        None => config_loader::load_config_or_default(config_path),
    };
    let master_config = match loaded {
        Ok(cfg) => {
            logging_setup::initialize_logging(Some(&cfg), &matches);
            info!("✅ Configuration ready from '{}' in {:?}", config_path, config_load_start_time.elapsed());
            cfg
        }
        Err(e) => {
            logging_setup::initialize_logging(None, &matches);
            error!("❌ Failed to load configuration from '{}': {:#}. Exiting.", config_path, e);
            return Err(e.context(format!("Failed to load configuration from '{}'", config_path)));
        }
    };

    info!("🚀 SkinCam starting with the {:?} camera backend.", master_config.camera.backend);

    let Some((operation_name, sub_matches)) = matches.subcommand() else {
        info!("🤔 No subcommand provided. Try `skincam capture-image` or `skincam --help`.");
        return Ok(());
    };
    debug!("🎬 Dispatching to subcommand: {}", operation_name);
    let op_start_time = Instant::now();

    let op_result: Result<()> = match operation_name {
        "capture-image" => operations::image_capture_op::handle_capture_image_cli(&master_config, sub_matches).await,
        "list-cameras" => operations::camera_list_op::handle_list_cameras_cli(&master_config).await,
        "test" => operations::diagnostic_op::handle_diagnostic_cli(&master_config, sub_matches).await,
        other => bail!("Subcommand '{}' not implemented.", other),
    };

    if let Err(e) = op_result {
        error!("❌ Operation '{}' failed after {:?}: {:#}", operation_name, op_start_time.elapsed(), e);
        return Err(e);
    }
    info!("✅ Operation '{}' completed successfully in {:?}.", operation_name, op_start_time.elapsed());
    info!("🏁 SkinCam finished in {:?}.", main_start_time.elapsed());
    Ok(())
}
