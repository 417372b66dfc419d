// Subscribes to a topic subtree of a named bus and prints what arrives.
//
//   cargo run --example consumer -- <expected_messages> [topic]
use dmxp_bus::{TransportBuilder, TransportConfig};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> dmxp_bus::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <expected_messages> [topic]", args[0]);
        std::process::exit(1);
    }

    let expected_messages: usize = args[1].parse().expect("Invalid number of messages");
    let topic = args.get(2).cloned().unwrap_or_else(|| "/demo".to_string());

    let builder = TransportBuilder::from_config(TransportConfig::from_env()?);
    let mut subscriber = builder.build_subscriber()?;
    println!("Consumer: Attached to bus '{}'", builder.config().name);

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let _channel = subscriber.subscribe(&topic, true, move |data| {
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        let message = String::from_utf8_lossy(data);
        // Parse "message_number:hash" format
        match message.split_once(':') {
            Some((num_str, hash)) => println!("{:<10} {}", num_str, hash),
            None => println!("Invalid format: {}", message),
        }
        if n % 100 == 0 {
            println!("--- Received {} messages ---", n);
        }
    })?;
    subscriber.start_listening(Duration::from_millis(10))?;

    println!("\n{:<10} Hash", "Msg #");
    println!("{}", "=".repeat(80));

    let start = std::time::Instant::now();
    let mut last_progress = (0, std::time::Instant::now());
    while received.load(Ordering::Relaxed) < expected_messages {
        std::thread::sleep(Duration::from_millis(50));
        let now = received.load(Ordering::Relaxed);
        if now != last_progress.0 {
            last_progress = (now, std::time::Instant::now());
        } else if last_progress.1.elapsed() > Duration::from_secs(5) {
            eprintln!("Timeout waiting for messages");
            break;
        }
    }

    let elapsed = start.elapsed();
    let received = received.load(Ordering::Relaxed);
    println!("\n{}", "=".repeat(80));
    println!("Consumer: Received {} messages in {:.2?}", received, elapsed);
    println!(
        "Average: {:.2} messages/second",
        received as f64 / elapsed.as_secs_f64()
    );
    println!("{}", subscriber.transport().stats());

    if received == expected_messages {
        println!("All messages received successfully");
    }

    Ok(())
}
