use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use micro_bus::*;

// A tick every service hears about
#[derive(Debug)]
struct TickBroadcast(usize);

impl Broadcast for TickBroadcast {}

#[derive(Debug)]
struct TerminatedBroadcast;

impl Broadcast for TerminatedBroadcast {}

// A request to add to the service's counter
#[derive(Debug)]
struct AddEvent(usize);

impl Event for AddEvent {
    type Output = usize;
}

// A request for the current tick
#[derive(Debug)]
struct CurrentTickEvent;

impl Event for CurrentTickEvent {
    type Output = usize;
}

struct TestService {
    counter: usize,
    tick: usize,
    ticks_seen: Arc<AtomicUsize>,
}

impl MicroService for TestService {
    fn initialize(&mut self, ctx: &mut ServiceContext<Self>) -> anyhow::Result<()> {
        ctx.subscribe_event(|service: &mut TestService, msg: Request<AddEvent>, ctx| {
            service.counter += msg.0;
            ctx.complete(&msg, service.counter);
            Ok(())
        })?;
        ctx.subscribe_event(|service: &mut TestService, msg: Request<CurrentTickEvent>, ctx| {
            ctx.complete(&msg, service.tick);
            Ok(())
        })?;
        ctx.subscribe_broadcast(|service: &mut TestService, tick: Arc<TickBroadcast>, _| {
            service.tick = tick.0;
            service.ticks_seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })?;
        ctx.subscribe_broadcast(|_: &mut TestService, _: Arc<TerminatedBroadcast>, ctx| {
            ctx.terminate();
            Ok(())
        })?;
        Ok(())
    }
}

#[test]
fn multi_message() {
    let _ = env_logger::builder().is_test(true).try_init();

    let ticks_seen = Arc::new(AtomicUsize::new(0));
    let system = ServiceSystem::new("test");
    let handle = system
        .spawn("test-service", TestService { counter: 0, tick: 0, ticks_seen: Arc::clone(&ticks_seen) })
        .unwrap();
    handle.wait_ready();
    let bus = system.bus();

    let response_a = bus.send_event(AddEvent(1)).unwrap();
    assert_eq!(response_a.get(), 1);

    let response_b = bus.send_event(AddEvent(10)).unwrap();
    assert_eq!(response_b.get(), 11);

    for tick in 1..=3 {
        assert_eq!(bus.send_broadcast(TickBroadcast(tick)), 1);
    }
    // the inbox is FIFO, so the ticks are handled before this request
    let tick = bus.send_event(CurrentTickEvent).unwrap();
    assert_eq!(tick.get_timeout(Duration::from_secs(5)), Some(3));
    assert_eq!(ticks_seen.load(Ordering::SeqCst), 3);

    bus.send_broadcast(TerminatedBroadcast);
    handle.join().unwrap();
    assert_eq!(bus.send_broadcast(TickBroadcast(4)), 0);
}

#[test]
fn every_subscriber_gets_each_broadcast() {
    let system = ServiceSystem::new("test");
    let ticks_seen = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let service = TestService { counter: 0, tick: 0, ticks_seen: Arc::clone(&ticks_seen) };
            system.spawn(&format!("service-{}", i), service).unwrap()
        })
        .collect();
    for handle in &handles {
        handle.wait_ready();
    }

    assert_eq!(system.bus().send_broadcast(TickBroadcast(1)), 3);
    assert_eq!(system.bus().send_broadcast(TickBroadcast(2)), 3);

    // one request per service, each lands after that service's ticks
    let ticks: Vec<_> = (0..3).map(|_| system.bus().send_event(CurrentTickEvent).unwrap()).collect();
    for tick in ticks {
        assert_eq!(tick.get_timeout(Duration::from_secs(5)), Some(2));
    }
    assert_eq!(ticks_seen.load(Ordering::SeqCst), 6);

    system.bus().send_broadcast(TerminatedBroadcast);
    for handle in handles {
        handle.join().unwrap();
    }
}
