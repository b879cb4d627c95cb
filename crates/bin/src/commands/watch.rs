use std::path::Path;
use std::sync::Arc;

use canopy::SubscribeOptions;

use crate::cli::WatchArgs;

pub async fn watch(file: &Path, args: &WatchArgs) -> canopy::Result<()> {
    let (tree, _memory) = super::open(file)?;

    println!("Watching {} (Ctrl+C to stop)", display_path(&args.path));
    let unsub = tree.node(&args.path).on_with(
        SubscribeOptions {
            deliver_absent: true,
            recursion: args.recursion,
            guard: None,
        },
        Arc::new(|update| {
            match (&update.value, update.updated_at) {
                (Some(value), Some(t)) => println!("[{t}] {value}"),
                _ => println!("(not set)"),
            }
        }),
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(canopy::Error::Io)?;
    unsub.call();
    println!();
    Ok(())
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "(root)" } else { path }
}
