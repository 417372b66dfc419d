// Publishes hashed messages on a topic of a named bus.
//
//   cargo run --example producer -- <num_messages> [topic] [--auto-exit]
use dmxp_bus::{TransportBuilder, TransportConfig};
use sha2::{Digest, Sha256};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> dmxp_bus::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <num_messages> [topic] [--auto-exit]", args[0]);
        std::process::exit(1);
    }

    let num_messages: usize = args[1].parse().expect("Invalid number of messages");
    let topic = args
        .get(2)
        .filter(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| "/demo/hashes".to_string());
    let auto_exit = args.iter().any(|a| a == "--auto-exit");

    println!("Producer: Precomputing {} hashes...", num_messages);
    let start_precompute = std::time::Instant::now();
    let hashes: Vec<String> = (0..num_messages)
        .map(|i| {
            let mut hasher = Sha256::new();
            hasher.update(format!("message_{}", i).as_bytes());
            format!("{:x}", hasher.finalize())
        })
        .collect();
    println!(
        "Producer: Precomputed {} hashes in {:.2?}",
        num_messages,
        start_precompute.elapsed()
    );

    let builder = TransportBuilder::from_config(TransportConfig::from_env()?).with_dedicated_writer(true);
    let publisher = builder.build_publisher()?;
    println!(
        "Producer: Attached to bus '{}' (creator: {})",
        builder.config().name,
        publisher.transport().is_creator()
    );

    let keep_alive = Arc::new(AtomicBool::new(true));
    let keep_alive_for_handler = Arc::clone(&keep_alive);
    ctrlc::set_handler(move || {
        keep_alive_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    println!("Producer: Publishing {} hashes on {}...", num_messages, topic);
    let start_send = std::time::Instant::now();
    let mut sent = 0;
    for (i, hash) in hashes.iter().enumerate() {
        if !keep_alive.load(Ordering::SeqCst) {
            break;
        }
        // Format: "message_number:hash"
        let message = format!("{}:{}", i, hash);
        match publisher.publish(&topic, message.as_bytes()) {
            Ok(()) => {
                sent += 1;
                if sent % 100 == 0 {
                    println!("Sent {} messages", sent);
                }
            }
            Err(e) => eprintln!("Failed to send message {}: {}", i, e),
        }
    }
    publisher.flush();

    let send_time = start_send.elapsed();
    println!("Producer: Sent {} messages in {:.2?}", sent, send_time);
    println!(
        "Producer: Throughput: {:.2} messages/sec",
        sent as f64 / send_time.as_secs_f64()
    );
    println!("{}", publisher.transport().stats());

    if auto_exit {
        println!("Producer: Auto-exit mode, waiting 2 seconds for consumer...");
        std::thread::sleep(std::time::Duration::from_secs(2));
    } else {
        println!("Press Ctrl+C to exit...");
        while keep_alive.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }

    println!("Producer: Shutting down");
    if publisher.transport().is_creator() {
        dmxp_bus::Transport::unlink(&builder.config().name)?;
    }
    Ok(())
}
