use anyhow::Result;

fn main() -> Result<()> {
    fuzzbox::cli::run()
}
