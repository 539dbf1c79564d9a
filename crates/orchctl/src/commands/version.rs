//! `orchctl version`.

pub fn execute() -> anyhow::Result<()> {
    println!("orchctl {}", orch_core::VERSION);
    Ok(())
}
