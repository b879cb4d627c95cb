use std::path::Path;
use std::sync::{Arc, Mutex};

use canopy::{SubscribeOptions, Timestamp, Value};

use crate::cli::GetArgs;

pub async fn get(file: &Path, args: &GetArgs) -> canopy::Result<()> {
    let (tree, _memory) = super::open(file)?;

    // Harvest the synchronous notifications; the last one is the complete
    // aggregate when the path is a directory.
    let slot: Arc<Mutex<Option<(Option<Value>, Option<Timestamp>)>>> =
        Arc::new(Mutex::new(None));
    let sink = slot.clone();
    let unsub = tree.node(&args.path).on_with(
        SubscribeOptions {
            deliver_absent: true,
            recursion: args.recursion,
            guard: None,
        },
        Arc::new(move |update| {
            *sink.lock().unwrap() = Some((update.value, update.updated_at));
        }),
    );
    unsub.call();

    match slot.lock().unwrap().take() {
        Some((Some(value), updated_at)) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            if args.verbose && let Some(t) = updated_at {
                println!("updated_at: {t}");
            }
        }
        _ => {
            eprintln!("(not set)");
            std::process::exit(1);
        }
    }
    Ok(())
}
