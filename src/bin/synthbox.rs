use anyhow::Result;

fn main() -> Result<()> {
    synthbox::cli::run()
}
