mod cli;
mod input;
mod logging;
mod pipeline;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
