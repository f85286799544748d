//! Basic counter example: a ref, a watcher, and a disposer.

use refract::{create_ref, watch_ref};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    println!("=== Counter Example ===\n");

    // Create a ref with an initial value
    let count = create_ref(0);

    // Watch it; the callback receives the new and previous values
    let sub = watch_ref(&count, |new, old| {
        println!("count changed: {old} -> {new}");
    });

    println!("Setting count to 1...");
    count.set(1);

    println!("Setting count to 1 again (no change, no callback)...");
    count.set(1);

    println!("Setting count to 5...");
    count.set(5);

    println!("Disposing the watcher...");
    sub.dispose();

    println!("Setting count to 9 (nobody listens)...");
    count.set(9);

    println!("Final count: {}", count.get());
}
