//! Derived values: lazy computeds, chains, and a writable computed.

use refract::{computed, computed_with_setter, create_ref, watch, Value};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Derived Values Example ===\n");

    let celsius = create_ref(0);

    // A lazy computed: nothing runs until the first read
    let fahrenheit = computed({
        let celsius = celsius.clone();
        move |_prev| {
            let c = celsius.get().as_int().unwrap_or(0);
            Value::from(c * 9 / 5 + 32)
        }
    });

    // A chain: each link recomputes at most once per upstream change
    let description = computed({
        let fahrenheit = fahrenheit.clone();
        move |_prev| {
            let f = fahrenheit.get().as_int().unwrap_or(0);
            Value::from(format!("{f} degrees Fahrenheit"))
        }
    });

    // Registering the effect performs the first evaluation of the whole
    // chain, which is what subscribes the effect to `celsius`.
    let sub = watch({
        let description = description.clone();
        move || println!("observed: {}", description.get())
    });

    println!("Setting celsius to 100...");
    celsius.set(100);

    println!("Setting celsius to 37...");
    celsius.set(37);

    println!("Reading the middle of the chain: {} F", fahrenheit.get());

    // A writable computed: writes run the setter, which updates upstream
    let adjusted = computed_with_setter(
        {
            let celsius = celsius.clone();
            move |_prev| celsius.get()
        },
        {
            let celsius = celsius.clone();
            move |incoming| celsius.set(incoming.as_int().unwrap_or(0).clamp(-40, 60))
        },
    );

    println!("Writing 500 through the clamped setter...");
    adjusted.set(500);
    println!("celsius is now {}", celsius.get());

    sub.dispose();
}
