use std::path::Path;

use canopy::Value;

use crate::cli::PutArgs;

pub async fn put(file: &Path, args: &PutArgs) -> canopy::Result<()> {
    let (tree, memory) = super::open(file)?;

    // Accept raw JSON, falling back to a plain string so `canopy put a hi`
    // works without quoting gymnastics.
    let value: Value = serde_json::from_str(&args.value)
        .unwrap_or_else(|_| Value::String(args.value.clone()));

    let node = tree.node(&args.path);
    match args.timestamp {
        Some(t) => node.put_at(value, t, None).await?,
        None => node.put(value).await?,
    }

    memory.save_to_file(file)?;
    println!("ok");
    Ok(())
}
