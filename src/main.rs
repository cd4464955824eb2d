use im_gateway::{
    arguments::{is_help_requested, print_help},
    logger::{self, LogTag},
};

/// Main entry point for the IM gateway
#[tokio::main]
async fn main() {
    logger::init();

    if is_help_requested() {
        print_help();
        std::process::exit(0);
    }

    match im_gateway::run::run_gateway().await {
        Ok(()) => {
            logger::info(LogTag::System, "IM gateway exited cleanly");
        }
        Err(e) => {
            logger::error(LogTag::System, &format!("IM gateway failed: {}", e));
            std::process::exit(1);
        }
    }
}
