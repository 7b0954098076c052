fn main() -> anyhow::Result<()> {
    partint::run()
}
