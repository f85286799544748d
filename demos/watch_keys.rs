//! Keyed watching: a reactive record, nested records, and watch_reactive.

use refract::{reactive, watch_reactive, Record};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Keyed Watching Example ===\n");

    let settings = Record::from([
        ("volume", refract::Value::from(40)),
        ("muted", refract::Value::from(false)),
    ]);
    let state = reactive(Record::from([
        ("title", refract::Value::from("untitled")),
        ("settings", refract::Value::from(settings)),
    ]));

    // Every key, including the nested record's keys, gets a watcher
    let sub = watch_reactive(&state, |key, new, old| {
        println!("{key}: {old} -> {new}");
    });

    state.set("title", "first draft");

    let settings = state.get_untracked("settings");
    let settings = settings.as_reactive().expect("deep wrapping");
    settings.set("volume", 55);
    settings.set("muted", true);

    println!("Disposing all key watchers...");
    sub.dispose();

    settings.set("volume", 0);
    println!("volume is {} (silently)", settings.get("volume"));
}
