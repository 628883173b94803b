use radview::config::{init_logging, ViewerConfig};

pub fn main() -> iced::Result {
    let loaded = ViewerConfig::from_env();
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => ViewerConfig::default(),
    };
    init_logging(config.log_level);
    if let Err(err) = loaded {
        log::error!("{err}; falling back to default settings");
    }

    radview::app::run(config)
}
