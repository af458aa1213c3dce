//! Three detector services share the detection requests of one camera.
//!
//! Run with `RUST_LOG=debug cargo run --example round_robin`.

use std::sync::Arc;
use std::time::Duration;

use micro_bus::*;

#[derive(Debug)]
struct DetectObjectsEvent {
    frame: usize,
}

impl Event for DetectObjectsEvent {
    type Output = String;
}

#[derive(Debug)]
struct TerminatedBroadcast;

impl Broadcast for TerminatedBroadcast {}

struct Detector {
    frames: Vec<usize>,
}

impl MicroService for Detector {
    fn initialize(&mut self, ctx: &mut ServiceContext<Self>) -> anyhow::Result<()> {
        ctx.subscribe_event(|detector: &mut Detector, request: Request<DetectObjectsEvent>, ctx| {
            detector.frames.push(request.frame);
            ctx.complete(&request, format!("frame {} done by {}", request.frame, ctx.name()));
            Ok(())
        })?;
        ctx.subscribe_broadcast(|_: &mut Detector, _: Arc<TerminatedBroadcast>, ctx| {
            ctx.terminate();
            Ok(())
        })?;
        Ok(())
    }

    fn on_terminate(&mut self, ctx: &mut ServiceContext<Self>) {
        log::info!("'{}' handled frames {:?}", ctx.name(), self.frames);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let system = ServiceSystem::new("camera-rig");
    let detectors = ["left", "center", "right"]
        .iter()
        .map(|name| system.spawn(name, Detector { frames: Vec::new() }))
        .collect::<Result<Vec<_>, _>>()?;
    for detector in &detectors {
        detector.wait_ready();
    }

    let answers: Vec<_> = (0..9)
        .filter_map(|frame| system.bus().send_event(DetectObjectsEvent { frame }))
        .collect();
    for answer in answers {
        match answer.get_timeout(Duration::from_secs(1)) {
            Some(report) => println!("{}", report),
            None => println!("a frame was never answered"),
        }
    }

    system.bus().send_broadcast(TerminatedBroadcast);
    for detector in detectors {
        detector.join()?;
    }
    Ok(())
}
