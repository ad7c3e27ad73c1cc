fn main() -> anyhow::Result<()> {
    fastamend::init();

    fastamend::cli::run()
}
