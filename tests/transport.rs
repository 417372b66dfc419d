// Transport tests over named segments. Run with:
//   cargo test --test transport -- --nocapture

#[cfg(target_os = "linux")]
mod linux_tests {
    use dmxp_bus::Core::{create_or_open_shared_memory, SharedMemoryBackend};
    use dmxp_bus::Core::SharedMemory::DEFAULT_MODE;
    use dmxp_bus::RMP::RingBuffer;
    use dmxp_bus::{BusError, Subscriber, Transport, TransportBuilder, TransportConfig};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing_subscriber::EnvFilter;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn bus_name(tag: &str) -> String {
        init_tracing();
        let name = format!("dmxp_bus_test_{}_{}", std::process::id(), tag);
        let _ = Transport::unlink(&name);
        name
    }

    fn config(name: &str, size_kb: u64) -> TransportConfig {
        TransportConfig {
            name: name.to_string(),
            ring_buffer_size_kb: size_kb,
            max_readers: 4,
            backpressure_sleep_ms: 1,
            open_timeout_ms: 200,
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_second_handle_joins_existing_bus() {
        let name = bus_name("join");
        let owner = Arc::new(Transport::create_or_open(config(&name, 64)).unwrap());
        let joiner = Arc::new(Transport::create_or_open(config(&name, 64)).unwrap());
        assert!(owner.is_creator());
        assert!(!joiner.is_creator());
        assert_eq!(joiner.ring().capacity(), 64 * 1024);

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let subscriber = Subscriber::new(Arc::clone(&joiner), |_| {}).unwrap();
        subscriber
            .subscribe("/cross", false, move |p: &[u8]| sink.lock().push(p.to_vec()))
            .unwrap();
        subscriber.sync();

        // the joiner's slot is visible through the owner's mapping
        let (min, max) = owner.stats().active_range;
        assert!(min < max);

        let publisher = TransportBuilder::from_config(config(&name, 64))
            .publisher_for(Arc::clone(&owner))
            .unwrap();
        for i in 0..10u8 {
            publisher.publish("/cross", &[i]).unwrap();
        }
        subscriber.poll();

        assert_eq!(
            *received.lock(),
            (0..10u8).map(|i| vec![i]).collect::<Vec<_>>()
        );
        assert_eq!(owner.stats().free_pos, joiner.stats().free_pos);
        assert!(joiner.notifier().sequence() >= 1);

        drop(subscriber);
        drop(publisher);
        Transport::unlink(&name).unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_capacity_mismatch_is_reported() {
        let name = bus_name("mismatch");
        let _owner = Transport::create_or_open(config(&name, 64)).unwrap();

        match Transport::create_or_open(config(&name, 32)) {
            Err(BusError::LayoutMismatch {
                expected, found, ..
            }) => {
                assert_eq!(expected, 32 * 1024);
                assert_eq!(found, 64 * 1024);
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("attached with the wrong capacity"),
        }

        Transport::unlink(&name).unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_uninitialized_segment_times_out() {
        let name = bus_name("uninit");
        let mut cfg = config(&name, 64);
        cfg.open_timeout_ms = 50;

        // a creator that never finishes setup
        let stalled = create_or_open_shared_memory(
            &format!("{}-rb", name),
            RingBuffer::required_size(cfg.capacity()),
            DEFAULT_MODE,
        )
        .unwrap();
        assert!(stalled.is_creator());

        match Transport::create_or_open(cfg) {
            Err(BusError::NotInitialized { segment }) => {
                println!("expected error for segment '{}'", segment)
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("attached to an uninitialized ring"),
        }

        let _ = Transport::unlink(&name);
    }

    #[test]
    #[serial_test::serial]
    fn test_unlink_gives_fresh_bus() {
        let name = bus_name("fresh");
        {
            let transport = Transport::create_or_open(config(&name, 64)).unwrap();
            transport.ring().inc_free_pos(100);
            transport.reader_info().advance_generation();
        }
        // segments outlive their handles
        let again = Transport::create_or_open(config(&name, 64)).unwrap();
        assert!(!again.is_creator());
        assert_eq!(again.stats().free_pos, 100);
        assert_eq!(again.stats().reader_generation, 1);
        drop(again);

        Transport::unlink(&name).unwrap();
        let fresh = Transport::create_or_open(config(&name, 64)).unwrap();
        assert!(fresh.is_creator());
        assert_eq!(fresh.stats().free_pos, 0);
        drop(fresh);

        Transport::unlink(&name).unwrap();
        assert!(Transport::unlink(&name).is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_invalid_config_is_rejected() {
        let name = bus_name("invalid");
        let err = Transport::create_or_open(config(&name, 1000)).unwrap_err();
        assert!(matches!(err, BusError::Config(_)));
    }

    #[test]
    fn test_stats_display() {
        let transport = TransportBuilder::new()
            .with_name("stats")
            .with_ring_buffer_size_kb(4)
            .in_process(true)
            .build()
            .unwrap();
        transport.ring().inc_backpressure_count();

        let text = transport.stats().to_string();
        println!("{}", text);
        assert!(text.starts_with("ringbuf.freePos 0\n"));
        assert!(text.contains("ringbuf.capacity 4096\n"));
        assert!(text.contains("ringbuf.backPressureCount 1\n"));
        assert!(text.ends_with("readerInfo.activeRange [8, 0)"));
        println!("{:?}", transport);
    }
}
