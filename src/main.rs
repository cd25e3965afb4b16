mod actions;
mod cli;
mod config;
mod dispatch;
mod filter;
mod gestures;
mod landmarks;
mod logging;
mod pipeline;
mod scroll;
mod source;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
