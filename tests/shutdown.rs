use std::sync::Arc;
use std::time::Duration;

use micro_bus::*;

#[derive(Debug)]
struct TickBroadcast(usize);

impl Broadcast for TickBroadcast {}

#[derive(Debug)]
struct TerminatedBroadcast;

impl Broadcast for TerminatedBroadcast {}

#[derive(Debug)]
struct CrashedBroadcast {
    faulty: String,
}

impl Broadcast for CrashedBroadcast {}

#[derive(Debug)]
struct PoseFinishedBroadcast;

impl Broadcast for PoseFinishedBroadcast {}

#[derive(Debug)]
struct PoseEvent {
    tick: usize,
}

impl Event for PoseEvent {
    type Output = bool;
}

/// Drives the run: sends itself ticks until `duration` is reached, then
/// tells everyone to stop.
struct TimeService {
    duration: usize,
    last_tick: Future<usize>,
}

impl MicroService for TimeService {
    fn initialize(&mut self, ctx: &mut ServiceContext<Self>) -> anyhow::Result<()> {
        ctx.subscribe_broadcast(|timer: &mut TimeService, tick: Arc<TickBroadcast>, ctx| {
            if tick.0 < timer.duration {
                ctx.send_broadcast(TickBroadcast(tick.0 + 1));
            } else {
                timer.last_tick.resolve(tick.0);
                ctx.send_broadcast(TerminatedBroadcast);
                ctx.terminate();
            }
            Ok(())
        })?;
        ctx.subscribe_broadcast(|timer: &mut TimeService, crashed: Arc<CrashedBroadcast>, ctx| {
            log::debug!("'{}' crashed, stopping the clock", crashed.faulty);
            timer.last_tick.resolve(0);
            ctx.terminate();
            Ok(())
        })?;
        ctx.send_broadcast(TickBroadcast(1));
        Ok(())
    }
}

/// Turns ticks into pose events.
struct PoseService {
    crash_at: Option<usize>,
}

impl MicroService for PoseService {
    fn initialize(&mut self, ctx: &mut ServiceContext<Self>) -> anyhow::Result<()> {
        ctx.subscribe_broadcast(|pose: &mut PoseService, tick: Arc<TickBroadcast>, ctx| {
            if pose.crash_at == Some(tick.0) {
                ctx.send_broadcast(CrashedBroadcast { faulty: ctx.name().to_string() });
                ctx.terminate();
                return Ok(());
            }
            ctx.send_event(PoseEvent { tick: tick.0 });
            Ok(())
        })?;
        ctx.subscribe_broadcast(|_: &mut PoseService, _: Arc<TerminatedBroadcast>, ctx| {
            // every pose is queued at fusion ahead of this
            ctx.send_broadcast(PoseFinishedBroadcast);
            ctx.terminate();
            Ok(())
        })?;
        ctx.subscribe_broadcast(|_: &mut PoseService, _: Arc<CrashedBroadcast>, ctx| {
            ctx.terminate();
            Ok(())
        })?;
        Ok(())
    }
}

/// Records every pose it is sent.
struct FusionSlamService {
    poses: Vec<usize>,
    recorded: Future<Vec<usize>>,
}

impl MicroService for FusionSlamService {
    fn initialize(&mut self, ctx: &mut ServiceContext<Self>) -> anyhow::Result<()> {
        ctx.subscribe_event(|fusion: &mut FusionSlamService, pose: Request<PoseEvent>, ctx| {
            fusion.poses.push(pose.tick);
            ctx.complete(&pose, true);
            Ok(())
        })?;
        ctx.subscribe_broadcast(|_: &mut FusionSlamService, _: Arc<PoseFinishedBroadcast>, ctx| {
            ctx.terminate();
            Ok(())
        })?;
        ctx.subscribe_broadcast(|_: &mut FusionSlamService, _: Arc<CrashedBroadcast>, ctx| {
            ctx.terminate();
            Ok(())
        })?;
        Ok(())
    }

    fn on_terminate(&mut self, _ctx: &mut ServiceContext<Self>) {
        self.recorded.resolve(self.poses.clone());
    }
}

fn run(duration: usize, crash_at: Option<usize>) -> (usize, Vec<usize>) {
    let system = ServiceSystem::new("gurion-rock");
    let recorded = Future::new();
    let last_tick = Future::new();

    let fusion = system
        .spawn("fusion-slam", FusionSlamService { poses: Vec::new(), recorded: recorded.clone() })
        .unwrap();
    let pose = system.spawn("pose", PoseService { crash_at }).unwrap();
    fusion.wait_ready();
    pose.wait_ready();

    let timer = system
        .spawn("timer", TimeService { duration, last_tick: last_tick.clone() })
        .unwrap();

    for handle in [timer, pose, fusion] {
        handle.join().unwrap();
    }

    let last_tick = last_tick.get_timeout(Duration::from_secs(5)).unwrap();
    let poses = recorded.get_timeout(Duration::from_secs(5)).unwrap();
    (last_tick, poses)
}

#[test]
fn terminated_broadcast_stops_everyone() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (last_tick, poses) = run(5, None);
    assert_eq!(last_tick, 5);
    assert_eq!(poses, vec![1, 2, 3, 4, 5]);
}

#[test]
fn crashed_broadcast_stops_everyone() {
    let _ = env_logger::builder().is_test(true).try_init();

    // the clock never runs out, only the crash can stop it
    let (last_tick, poses) = run(usize::MAX, Some(3));
    assert_eq!(last_tick, 0);
    assert_eq!(poses, vec![1, 2]);
}
