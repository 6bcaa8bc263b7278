fn main() -> anyhow::Result<()> {
    gesturectl_lib::run()
}
