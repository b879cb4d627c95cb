use std::path::Path;
use std::sync::{Arc, Mutex};

use canopy::{Kind, SubscribeOptions, classify};

use crate::cli::LsArgs;

pub async fn ls(file: &Path, args: &LsArgs) -> canopy::Result<()> {
    let (tree, _memory) = super::open(file)?;

    let entries: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = entries.clone();
    // recursion 0 keeps directory children as bare markers instead of
    // expanding them, which is all a listing needs
    let unsub = tree.node(&args.path).map_with(
        SubscribeOptions::recursive(0),
        Arc::new(move |update| {
            let Some(name) = update.path.name() else {
                return;
            };
            let Some(value) = &update.value else {
                return;
            };
            // trailing slash marks directories, like ls -F
            let suffix = match classify(value) {
                Kind::Directory => "/",
                Kind::Leaf => "",
            };
            sink.lock().unwrap().push(format!("{name}{suffix}"));
        }),
    );
    unsub.call();

    let mut entries = entries.lock().unwrap().clone();
    entries.sort();
    for entry in entries {
        println!("{entry}");
    }
    Ok(())
}
