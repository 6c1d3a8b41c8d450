#![no_std]
#![no_main]

mod maps;

use aya_ebpf::{bindings::xdp_action, macros::xdp, programs::XdpContext};
use aya_log_ebpf::debug;
use netevent_ebpf_common::{
    BoundedSink, EventContext, EventHook, NetEventMonitor, HOOK_SUCCESS, MAX_RECORD_LEN,
};

use crate::maps::{FrameSink, PerCpuDrops};

/// Captures every frame seen on the interface. Capture never changes the
/// verdict, so the frame always passes.
#[xdp]
pub fn netevent_monitor(ctx: XdpContext) -> u32 {
    let event = EventContext::new(ctx.data() as *const u8, ctx.data_end() as *const u8);
    let sink = BoundedSink::new(FrameSink::new(&ctx), PerCpuDrops, MAX_RECORD_LEN);
    let monitor = NetEventMonitor::new(&sink);

    // SAFETY: data..data_end is the frame's linear buffer, live for this call
    let rc = unsafe { monitor.on_event(&event) };
    if rc != HOOK_SUCCESS {
        debug!(&ctx, "netevent dropped frame, rc {}", rc);
    }

    xdp_action::XDP_PASS
}

#[cfg_attr(not(test), panic_handler)]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
