//! The `exifpipe stages` command: list registered stage names.

use exifpipe_core::Registry;

fn describe(name: &str) -> &'static str {
    match name {
        "input" => "scan input paths and extract metadata (source)",
        "filter" => "drop records failing filter.expr",
        "output" => "render records as csv, json or keys",
        "dbstore" => "upsert records into the document store",
        "dbquery" => "read stored documents back as records (source)",
        _ => "",
    }
}

/// Execute the stages command.
pub fn execute() -> anyhow::Result<()> {
    let registry = Registry::builtin();
    for name in registry.names() {
        println!("{:<10} {}", name, describe(name));
    }
    Ok(())
}
