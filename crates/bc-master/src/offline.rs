//! Faster-than-realtime rendering against an offline device.

use std::sync::Arc;

use bc_audio::{AudioDevice, MidiCallback, MidiRenderer, OfflineDevice};
use bc_engine::{EngineConfig, RingSink};
use bc_ir::{SampleClock, SchedulingContext};

use crate::session::Session;
use crate::RING_CAPACITY;

pub struct OfflineRig {
    pub session: Session<RingSink>,
    pub device: OfflineDevice,
}

/// A session wired to an `OfflineDevice` rendering `block_size` frames at a
/// time. The device starts stopped.
pub fn build_offline(
    context: SchedulingContext,
    config: EngineConfig,
    block_size: u64,
    on_midi: MidiCallback,
) -> OfflineRig {
    let clock = Arc::new(SampleClock::new());
    let (sink, consumer) = RingSink::new(RING_CAPACITY);
    let sample_rate = context.sample_rate().round() as u32;
    let mut session = Session::new(clock.clone(), context, config, sink);
    let device = OfflineDevice::new(MidiRenderer::new(consumer, clock, on_midi), sample_rate, block_size);
    session.set_device_latency(device.output_latency());
    OfflineRig { session, device }
}

/// Render `frames` frames, scanning and ticking the smoothers on the
/// configured schedule measured in rendered samples.
pub fn run_offline(rig: &mut OfflineRig, frames: u64) -> u64 {
    let sample_rate = rig.session.timing().context().sample_rate();
    let config = *rig.session.config();
    let scan_every = frames_per(config.scheduler.scan_interval().as_secs_f64(), sample_rate);
    let tick_every = frames_per(1.0 / config.smoothing.tick_rate_hz, sample_rate);

    let block = rig.device.block_size();
    let mut rendered = 0;
    let mut since_scan = scan_every;
    let mut since_tick = 0;
    while rendered < frames {
        if since_scan >= scan_every {
            rig.session.scan();
            since_scan = 0;
        }
        let done = rig.device.render(block);
        if done == 0 {
            break;
        }
        rendered += done;
        since_scan += done;
        since_tick += done;
        while since_tick >= tick_every {
            rig.session.smoothing_tick();
            since_tick -= tick_every;
        }
    }
    rendered
}

fn frames_per(seconds: f64, sample_rate: f64) -> u64 {
    ((seconds * sample_rate).round() as u64).max(1)
}
